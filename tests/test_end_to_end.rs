mod common;

use common::table_fixture::*;
use dvfs_rust::dvfs_common_rs::edit::FieldKey;
use dvfs_rust::dvfs_common_rs::editor::{
    CalibrationEditor, ExportRequest, MessageSink, AXIS_NOT_PRESENT_MESSAGE, EXPORT_SUCCESS_MESSAGE,
};
use dvfs_rust::dvfs_common_rs::register::ProfileRegistry;
use dvfs_rust::dvfs_common_rs::utils::config_loader::ConfigLoader;
use dvfs_rust::dvfs_common_rs::utils::log_config::init_logging;
use mockall::predicate::eq;
use mockall::{mock, Sequence};
use std::fs;

mock! {
    pub Sink {}

    impl MessageSink for Sink {
        fn post(&mut self, message: &str);
    }
}

fn expect_in_order(sink: &mut MockSink, seq: &mut Sequence, message: &'static str) {
    sink.expect_post()
        .with(eq(message))
        .times(1)
        .in_sequence(seq)
        .return_const(());
}

#[test]
fn test_edit_and_export_session() {
    let dir = tempfile::tempdir().unwrap();
    let table = write_file(dir.path(), "orin.txt", &sample_table());
    let cfg = write_file(dir.path(), "orin.cfg", &sample_cfg("665.6"));

    let mut sink = MockSink::new();
    let mut seq = Sequence::new();
    expect_in_order(&mut sink, &mut seq, "Parsed T234 DVFS Table");
    expect_in_order(&mut sink, &mut seq, AXIS_NOT_PRESENT_MESSAGE);
    expect_in_order(&mut sink, &mut seq, EXPORT_SUCCESS_MESSAGE);

    let mut editor = CalibrationEditor::new(ProfileRegistry::builtin(), sink);
    editor.load(&table).unwrap();
    assert!(editor.select(FREQ_LOW, "DQIVREF", "128").is_err());

    editor.select(FREQ_LOW, "OBDQ", "256").unwrap();
    editor.decrement().unwrap();
    editor.select(FREQ_HIGH, "PutermExtra", "256").unwrap();
    editor.increment().unwrap();

    let request = ExportRequest {
        secondary: Some(cfg),
        suffix: "_tuned".to_string(),
        ..Default::default()
    };
    let report = editor.export(&request).unwrap();
    assert_eq!(report.published().len(), 2);

    let primary = fs::read_to_string(dir.path().join("orin_tuned.txt")).unwrap();
    // OBDQ の減少は選択を切り替えた時点で捨てられている
    assert!(!primary.contains("0xf8200008"));
    assert!(primary.contains("  0xabc00011, /* EMC_PUTERM_EXTRA_0 */\n"));

    let secondary = fs::read_to_string(dir.path().join("orin_tuned.cfg")).unwrap();
    assert!(secondary.contains("SDRAM[0].EmcPutermExtra = 0xabc00011;"));
}

#[test]
fn test_export_settles_out_of_bounds_edit() {
    let dir = tempfile::tempdir().unwrap();
    let table = write_file(dir.path(), "orin.txt", &sample_table());

    let mut sink = MockSink::new();
    let mut seq = Sequence::new();
    expect_in_order(&mut sink, &mut seq, "Parsed T234 DVFS Table");
    expect_in_order(&mut sink, &mut seq, "ERROR: Out of bounds, 10-bit number for QUSE");
    expect_in_order(&mut sink, &mut seq, EXPORT_SUCCESS_MESSAGE);

    let mut editor = CalibrationEditor::new(ProfileRegistry::builtin(), sink);
    editor.load(&table).unwrap();
    editor.select(FREQ_LOW, "QUSE", "128").unwrap();
    editor.edit_field(&FieldKey::new("", QUSE, "QUSE"), 1021).unwrap();

    let request = ExportRequest {
        suffix: "_new".to_string(),
        ..Default::default()
    };
    assert!(editor.export(&request).unwrap().is_success());
    assert_eq!(fs::read_to_string(dir.path().join("orin_new.txt")).unwrap(), sample_table());
    // 範囲外の編集は捨てられ、選択は付け直される
    assert_eq!(editor.rows()[0].pending, "0x3");
}

#[test]
fn test_configured_reference_frequency() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_file(
        dir.path(),
        "dvfs.config.toml",
        "[export]\nsecondary_reference_khz = \"204000\"\ndefault_suffix = \"_cfg\"\n\n[logging]\nlevel = \"debug\"\n",
    );
    let config = ConfigLoader::with_paths(vec![config_path])
        .with_env_prefix("DVFS_E2E_UNSET_")
        .load()
        .unwrap();
    init_logging(&config.logging).unwrap();
    assert_eq!(config.export.secondary_reference_khz, FREQ_LOW);

    let table = write_file(dir.path(), "orin.txt", &sample_table());
    let cfg = write_file(dir.path(), "orin.cfg", &sample_cfg("204"));

    let mut sink = MockSink::new();
    sink.expect_post().return_const(());
    let mut editor = CalibrationEditor::new(ProfileRegistry::builtin(), sink)
        .with_reference_frequency(&config.export.secondary_reference_khz);
    editor.load(&table).unwrap();
    editor.select(FREQ_LOW, "QUSE", "128").unwrap();
    editor.decrement().unwrap();

    let request = ExportRequest {
        secondary: Some(cfg),
        suffix: config.export.default_suffix.clone().unwrap_or_default(),
        ..Default::default()
    };
    assert!(editor.export(&request).unwrap().is_success());
    let secondary = fs::read_to_string(dir.path().join("orin_cfg.cfg")).unwrap();
    assert!(secondary.contains("SDRAM[0].EmcQUse = 0x00000002;"));
}
