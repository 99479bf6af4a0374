mod common;

use common::table_fixture::*;
use dvfs_rust::dvfs_common_rs::edit::FieldKey;
use dvfs_rust::dvfs_common_rs::editor::{CalibrationEditor, MessageSlot, AXIS_NOT_PRESENT_MESSAGE};
use dvfs_rust::dvfs_common_rs::register::core::exceptions::{CatalogError, DvfsError, EditError};
use dvfs_rust::dvfs_common_rs::register::ProfileRegistry;
use dvfs_rust::dvfs_common_rs::table::partition::FieldValue;

fn loaded_editor() -> CalibrationEditor<MessageSlot> {
    let mut editor = CalibrationEditor::new(ProfileRegistry::builtin(), MessageSlot::new());
    editor.load_from_str("orin.txt", &sample_table()).unwrap();
    editor
}

fn field<'a>(
    editor: &'a CalibrationEditor<MessageSlot>,
    frequency: &str,
    register: &str,
    name: &str,
) -> &'a FieldValue {
    let tree = editor.table().unwrap().tree(frequency).unwrap();
    &tree.register(register).unwrap()[name]
}

#[test]
fn test_load_posts_profile() {
    let mut editor = loaded_editor();
    assert_eq!(editor.sink_mut().take().as_deref(), Some("Parsed T234 DVFS Table"));
    assert_eq!(editor.frequencies(), &[FREQ_HIGH.to_string(), FREQ_LOW.to_string()]);
    assert_eq!(editor.bus_widths(), vec!["128", "256"]);
    assert!(editor.axes().contains(&"AutocaloffsetDQTerm"));
    assert!(editor.session().is_none());
}

#[test]
fn test_bypassed_axis_steps_by_eight() {
    let mut editor = loaded_editor();
    editor.select(FREQ_LOW, "OBDQ", "128").unwrap();

    let session = editor.session().unwrap();
    assert_eq!(session.tree_axis(), "OBDQ");
    assert_eq!(session.step(), 8);
    assert_eq!(editor.rows().len(), 4);

    editor.increment().unwrap();
    let pending: Vec<String> = editor.rows().into_iter().map(|r| r.pending).collect();
    assert_eq!(pending, vec!["0x18", "0x28", "0x1a", "0x2a"]);

    assert_eq!(editor.apply().unwrap(), 4);
    assert_eq!(field(&editor, FREQ_LOW, OB_DQ_CH0, "PMACRO_OB_DDLL_LONG_DQ_RANK0_BYTE0").decoded, 0x18);
    assert_eq!(field(&editor, FREQ_LOW, OB_DQ_CH1, "PMACRO_OB_DDLL_LONG_DQ_RANK0_BYTE1").decoded, 0x2a);
    // 他の周波数は変わらない
    assert_eq!(field(&editor, FREQ_HIGH, OB_DQ_CH0, "PMACRO_OB_DDLL_LONG_DQ_RANK0_BYTE0").decoded, 0x10);

    // 確定後は新しい編集が付いている
    let rows = editor.rows();
    assert_eq!(rows[0].value, 0x18);
    assert_eq!(rows[0].pending, "0x18");
}

#[test]
fn test_unbypassed_axis_steps_by_one() {
    let mut editor = loaded_editor();
    editor.select(FREQ_HIGH, "OBDQ", "128").unwrap();
    assert_eq!(editor.session().unwrap().step(), 1);

    editor.decrement().unwrap();
    assert_eq!(editor.rows()[0].pending, "0xf");
}

#[test]
fn test_axis_missing_at_frequency() {
    let mut editor = loaded_editor();
    let err = editor.select(FREQ_LOW, "DQIVREF", "128").unwrap_err();
    assert!(matches!(err, DvfsError::Edit(EditError::AxisNotPresent { .. })));
    assert_eq!(editor.sink().message(), Some(AXIS_NOT_PRESENT_MESSAGE));
    assert!(editor.session().is_none());
}

#[test]
fn test_training_axis_sign_magnitude() {
    let mut editor = loaded_editor();
    editor.select(FREQ_HIGH, "DQIVREF", "128").unwrap();

    let session = editor.session().unwrap();
    assert_eq!(session.tree_axis(), "DQIVREF (training)");
    assert!(session.is_sign_magnitude());
    assert_eq!(session.step(), 1);

    // BYTE0: -2 -> 0、BYTE1: +1 -> +3
    editor.increment().unwrap();
    editor.increment().unwrap();
    assert_eq!(editor.apply().unwrap(), 4);

    assert_eq!(field(&editor, FREQ_HIGH, IB_VREF_BYTE0, "SIGN").decoded, 0);
    assert_eq!(
        field(&editor, FREQ_HIGH, IB_VREF_BYTE0, "SAVE_RESTORE_MOD_IB_BYTE0_VREF_OFF").decoded,
        0
    );
    assert_eq!(field(&editor, FREQ_HIGH, IB_VREF_BYTE1, "SIGN").decoded, 0);
    assert_eq!(
        field(&editor, FREQ_HIGH, IB_VREF_BYTE1, "SAVE_RESTORE_MOD_IB_BYTE1_VREF_OFF").decoded,
        3
    );

    // 0 から減らすと負側へ
    editor.decrement().unwrap();
    editor.apply().unwrap();
    assert_eq!(field(&editor, FREQ_HIGH, IB_VREF_BYTE0, "SIGN").decoded, 1);
    assert_eq!(
        field(&editor, FREQ_HIGH, IB_VREF_BYTE0, "SAVE_RESTORE_MOD_IB_BYTE0_VREF_OFF").decoded,
        1
    );
}

#[test]
fn test_field_selection_and_bounds() {
    let mut editor = loaded_editor();
    editor.select(FREQ_HIGH, "AutocaloffsetCLK", "128").unwrap();

    let fields: Vec<String> = editor.rows().into_iter().map(|r| r.key.field).collect();
    assert_eq!(fields, vec!["AUTO_CAL_CLK_PD_OFFSET", "AUTO_CAL_CLK_PU_OFFSET"]);

    // PU は -1、5ビットの2の補数で -16 まで
    let pu = FieldKey::new("0", AUTOCAL_CLK_CH0, "AUTO_CAL_CLK_PU_OFFSET");
    editor.edit_field(&pu, -16).unwrap();
    assert_eq!(editor.rows()[1].pending, "N/A");
    assert!(!editor.can_apply());

    let err = editor.apply().unwrap_err();
    assert!(matches!(err, DvfsError::Edit(EditError::OutOfBounds { .. })));
    assert_eq!(
        editor.sink().message(),
        Some("ERROR: Out of bounds, 5-bit number for AUTO_CAL_CLK_PU_OFFSET")
    );
    assert_eq!(field(&editor, FREQ_HIGH, AUTOCAL_CLK_CH0, "AUTO_CAL_CLK_PU_OFFSET").decoded, 0x1f);

    editor.edit_field(&pu, 1).unwrap();
    assert_eq!(editor.rows()[1].pending, "0x10");
    assert!(editor.can_apply());
    editor.apply().unwrap();
    assert_eq!(field(&editor, FREQ_HIGH, AUTOCAL_CLK_CH0, "AUTO_CAL_CLK_PU_OFFSET").decoded, 0x10);
    assert_eq!(field(&editor, FREQ_HIGH, AUTOCAL_CLK_CH0, "AUTO_CAL_CLK_PD_OFFSET").decoded, 0x01);
}

#[test]
fn test_alias_axes_select_term_fields() {
    let mut editor = loaded_editor();

    editor.select(FREQ_HIGH, "AutocaloffsetDQTerm", "128").unwrap();
    assert_eq!(editor.session().unwrap().tree_axis(), "AutocaloffsetDQ/STerm");
    let rows = editor.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key.field, "AUTO_CAL_DQ_TERM_PD_OFFSET");
    assert_eq!(rows[0].value, 0x03);

    editor.select(FREQ_HIGH, "AutocaloffsetDQSTerm", "128").unwrap();
    let rows = editor.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key.field, "AUTO_CAL_DQS_TERM_PD_OFFSET");
    assert_eq!(rows[0].value, 0x01);
}

#[test]
fn test_single_field_edit_and_scope() {
    let mut editor = loaded_editor();
    editor.select(FREQ_LOW, "QUSE", "128").unwrap();

    let quse = FieldKey::new("", QUSE, "QUSE");
    editor.edit_field(&quse, 2).unwrap();
    assert_eq!(editor.apply().unwrap(), 1);
    assert_eq!(field(&editor, FREQ_LOW, QUSE, "QUSE").decoded, 5);

    let outside = FieldKey::new("", PUTERM, "PUTERM_EXTRA");
    assert!(matches!(
        editor.edit_field(&outside, 1).unwrap_err(),
        DvfsError::Edit(EditError::FieldNotInScope { .. })
    ));
    assert!(editor.sink().message().unwrap().starts_with("ERROR: "));

    let misspelled = FieldKey::new("", QUSE, "QUSE_DELAY");
    assert_eq!(
        editor.edit_field(&misspelled, 1).unwrap_err(),
        DvfsError::Catalog(CatalogError::UnknownField {
            register: QUSE.to_string(),
            field: "QUSE_DELAY".to_string(),
        })
    );
    assert_eq!(field(&editor, FREQ_LOW, QUSE, "QUSE").decoded, 5);
}

#[test]
fn test_extreme_edit_stays_out_of_bounds() {
    let mut editor = loaded_editor();
    editor.select(FREQ_HIGH, "PutermExtra", "128").unwrap();
    let key = editor.rows()[0].key.clone();

    editor.edit_field(&key, i64::MAX).unwrap();
    assert_eq!(editor.rows()[0].pending, "N/A");
    assert!(!editor.can_apply());

    // 飽和した値から戻しても負のまま
    editor.edit_field(&key, i64::MIN).unwrap();
    editor.edit_field(&key, i64::MIN).unwrap();
    assert_eq!(editor.rows()[0].pending, "N/A");
    assert!(!editor.can_apply());
    assert!(editor.apply().is_err());
    assert_eq!(field(&editor, FREQ_HIGH, PUTERM, &key.field).decoded, 0x10);

    editor.clear().unwrap();
    assert_eq!(editor.rows()[0].pending, "0x10");
    assert!(editor.can_apply());
}

#[test]
fn test_reselect_discards_pending() {
    let mut editor = loaded_editor();
    editor.select(FREQ_LOW, "OBDQ", "128").unwrap();
    editor.increment().unwrap();

    editor.select(FREQ_LOW, "QUSE", "128").unwrap();
    let byte0 = field(&editor, FREQ_LOW, OB_DQ_CH0, "PMACRO_OB_DDLL_LONG_DQ_RANK0_BYTE0");
    assert!(byte0.edit.is_none());
    assert_eq!(byte0.decoded, 0x10);
}

#[test]
fn test_clear_restores_pending() {
    let mut editor = loaded_editor();
    editor.select(FREQ_HIGH, "PutermExtra", "128").unwrap();
    editor.increment().unwrap();
    editor.clear().unwrap();
    assert_eq!(editor.rows()[0].pending, "0x10");
    assert_eq!(editor.apply().unwrap(), 1);
    assert_eq!(field(&editor, FREQ_HIGH, PUTERM, "PUTERM_EXTRA").decoded, 0x10);
}

#[test]
fn test_selection_errors() {
    let mut editor = loaded_editor();
    assert_eq!(
        editor.select("100000", "QUSE", "128").unwrap_err(),
        DvfsError::Edit(EditError::UnknownFrequency("100000".to_string()))
    );
    assert_eq!(
        editor.select(FREQ_HIGH, "QUSE", "64").unwrap_err(),
        DvfsError::Edit(EditError::UnknownBusWidth("64".to_string()))
    );
    assert_eq!(
        editor.select(FREQ_HIGH, "NOPE", "128").unwrap_err(),
        DvfsError::Edit(EditError::UnknownAxis("NOPE".to_string()))
    );
    assert_eq!(editor.increment().unwrap_err(), DvfsError::Edit(EditError::NoSelection));
}
