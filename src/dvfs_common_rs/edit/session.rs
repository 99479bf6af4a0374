/// 編集セッション
/// 選択した (周波数, 軸) のフィールドに編集を付け、一括増減・範囲検証・確定・破棄を行う

use crate::dvfs_common_rs::register::axis_table::{training_axis, DisplayLayout, FieldSelection};
use crate::dvfs_common_rs::register::catalog::SIGN_FIELD;
use crate::dvfs_common_rs::register::core::exceptions::{CatalogError, DvfsResult, EditError};
use crate::dvfs_common_rs::table::parser::FrequencyFlags;
use crate::dvfs_common_rs::table::partition::DisplayTree;
use log::debug;

/// バイパス時の刻み幅
pub const BYPASS_STEP: i64 = 8;

/// フィールドの位置（軸はセッションが持つ）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub channel: String,
    pub register: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(channel: &str, register: &str, field: &str) -> Self {
        Self {
            channel: channel.to_string(),
            register: register.to_string(),
            field: field.to_string(),
        }
    }
}

/// 表示軸から決まる、編集対象のツリー軸・刻み幅・フィールド選択
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPlan {
    pub display_axis: String,
    pub tree_axis: String,
    pub step: i64,
    pub selection: FieldSelection,
    pub sign_magnitude: bool,
}

impl SelectionPlan {
    /// 表示軸を解決する
    ///
    /// バイパスなら刻み幅8。トレーニングが必要な周波数ではトレーニング軸に切り替えて刻み幅1に戻す。
    /// それ以外は別名があれば別名のツリー軸と選択を使う
    pub fn resolve(layout: &DisplayLayout, flags: Option<&FrequencyFlags>, axis: &str) -> Result<Self, EditError> {
        if !layout.has_axis(axis) {
            return Err(EditError::UnknownAxis(axis.to_string()));
        }
        let bypassed = flags.map(|f| f.is_bypassed(axis)).unwrap_or(false);
        let training = flags.map(|f| f.needs_training(axis)).unwrap_or(false);

        let mut step = if bypassed { BYPASS_STEP } else { 1 };
        let (tree_axis, selection) = if training {
            step = 1;
            let tree_axis = training_axis(axis);
            let selection = layout.selection_for(&tree_axis);
            (tree_axis, selection)
        } else if let Some(alias) = layout.alias(axis) {
            (alias.target.clone(), alias.selection.clone())
        } else {
            (axis.to_string(), layout.selection_for(axis))
        };

        Ok(Self {
            display_axis: axis.to_string(),
            sign_magnitude: layout.is_sign_magnitude(&tree_axis),
            tree_axis,
            step,
            selection,
        })
    }
}

/// 符号-絶対値表現のフィールド対
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignMagnitudePair {
    sign: FieldKey,
    magnitude: FieldKey,
}

/// 符号-絶対値表現での1単位の増減
///
/// Args:
///     sign_set: 符号ビットが立っているか
///     magnitude: 現在の絶対値
///     increment: 増加なら true
///
/// Returns:
///     (符号フィールドの増減, 絶対値フィールドの増減)
pub fn sign_magnitude_step(sign_set: bool, magnitude: i64, increment: bool) -> (i64, i64) {
    match (increment, sign_set) {
        // 負側から0に近づき、0を越えたら正側へ
        (true, true) if magnitude == 1 => (-1, -1),
        (true, true) if magnitude == 0 => (-1, 1),
        (true, true) => (0, -1),
        (true, false) => (0, 1),
        (false, true) => (0, 1),
        (false, false) if magnitude == 0 => (1, 1),
        (false, false) => (0, -1),
    }
}

/// 編集セッション
#[derive(Debug, Clone)]
pub struct EditSession {
    frequency: String,
    plan: SelectionPlan,
    fields: Vec<FieldKey>,
    pairs: Vec<SignMagnitudePair>,
}

impl EditSession {
    /// セッションを開き、対象フィールドに新しい編集を付ける
    ///
    /// Args:
    ///     tree: 選択した周波数の表示ツリー
    ///     frequency: 周波数
    ///     plan: 解決済みの選択
    ///     channels: 表示するチャンネル（この順で並べる）
    pub fn open(
        tree: &mut DisplayTree,
        frequency: &str,
        plan: SelectionPlan,
        channels: &[String],
    ) -> Result<Self, EditError> {
        let channel_map = tree
            .axis_mut(&plan.tree_axis)
            .ok_or_else(|| EditError::AxisNotPresent {
                frequency: frequency.to_string(),
                axis: plan.tree_axis.clone(),
            })?;

        let mut fields = Vec::new();
        let mut pairs = Vec::new();
        for channel in channels {
            let Some(registers) = channel_map.get_mut(channel) else {
                continue;
            };
            for (register, register_fields) in registers.iter_mut() {
                let mut scoped = Vec::new();
                for (index, (name, value)) in register_fields.iter_mut().enumerate() {
                    if plan.selection.selects(index) {
                        value.attach();
                        scoped.push(FieldKey::new(channel, register, name));
                    }
                }
                if plan.sign_magnitude {
                    if let Some(pair) = Self::pair_of(&scoped) {
                        pairs.push(pair);
                    }
                }
                fields.extend(scoped);
            }
        }

        debug!(
            "Opened edit session {} kHz {} -> {}: {} fields, step {}",
            frequency,
            plan.display_axis,
            plan.tree_axis,
            fields.len(),
            plan.step
        );
        Ok(Self {
            frequency: frequency.to_string(),
            plan,
            fields,
            pairs,
        })
    }

    fn pair_of(scoped: &[FieldKey]) -> Option<SignMagnitudePair> {
        let sign = scoped.iter().find(|k| k.field == SIGN_FIELD)?;
        let mut others = scoped.iter().filter(|k| k.field != SIGN_FIELD);
        let magnitude = others.next()?;
        if others.next().is_some() {
            return None;
        }
        Some(SignMagnitudePair {
            sign: sign.clone(),
            magnitude: magnitude.clone(),
        })
    }

    pub fn frequency(&self) -> &str {
        &self.frequency
    }

    pub fn display_axis(&self) -> &str {
        &self.plan.display_axis
    }

    pub fn tree_axis(&self) -> &str {
        &self.plan.tree_axis
    }

    pub fn step(&self) -> i64 {
        self.plan.step
    }

    pub fn is_sign_magnitude(&self) -> bool {
        self.plan.sign_magnitude
    }

    /// 対象フィールド（表示順）
    pub fn fields(&self) -> &[FieldKey] {
        &self.fields
    }

    pub fn contains(&self, key: &FieldKey) -> bool {
        self.fields.contains(key)
    }

    fn is_paired(&self, key: &FieldKey) -> bool {
        self.pairs.iter().any(|p| &p.sign == key || &p.magnitude == key)
    }

    fn step_key(&self, tree: &mut DisplayTree, key: &FieldKey, delta: i64) {
        if let Some(value) = tree.field_mut(&self.plan.tree_axis, &key.channel, &key.register, &key.field) {
            value.step(delta);
        }
    }

    fn current(&self, tree: &DisplayTree, key: &FieldKey) -> Option<i64> {
        let value = tree.field(&self.plan.tree_axis, &key.channel, &key.register, &key.field)?;
        Some(value.pending_total().unwrap_or_else(|| value.signed_value()))
    }

    /// 全対象を刻み幅だけ増やす
    pub fn increment(&self, tree: &mut DisplayTree) {
        self.step_group(tree, true);
    }

    /// 全対象を刻み幅だけ減らす
    pub fn decrement(&self, tree: &mut DisplayTree) {
        self.step_group(tree, false);
    }

    fn step_group(&self, tree: &mut DisplayTree, increment: bool) {
        let direction = if increment { 1 } else { -1 };
        for pair in &self.pairs {
            for _ in 0..self.plan.step {
                let (Some(sign), Some(magnitude)) =
                    (self.current(tree, &pair.sign), self.current(tree, &pair.magnitude))
                else {
                    break;
                };
                let (sign_delta, magnitude_delta) = sign_magnitude_step(sign != 0, magnitude, increment);
                self.step_key(tree, &pair.sign, sign_delta);
                self.step_key(tree, &pair.magnitude, magnitude_delta);
            }
        }
        for key in self.fields.iter().filter(|k| !self.is_paired(k)) {
            self.step_key(tree, key, direction * self.plan.step);
        }
    }

    /// 1フィールドだけを増減する
    ///
    /// レジスタにないフィールド名は `UnknownField`、選択外のフィールドは `FieldNotInScope`
    pub fn step_field(&self, tree: &mut DisplayTree, key: &FieldKey, delta: i64) -> DvfsResult<()> {
        if tree.register(&key.register).is_some_and(|fields| !fields.contains_key(&key.field)) {
            return Err(CatalogError::UnknownField {
                register: key.register.clone(),
                field: key.field.clone(),
            }
            .into());
        }
        if !self.contains(key) {
            return Err(EditError::FieldNotInScope {
                channel: key.channel.clone(),
                register: key.register.clone(),
                field: key.field.clone(),
            }
            .into());
        }
        self.step_key(tree, key, delta);
        Ok(())
    }

    /// 最初に見つかった範囲外のフィールド
    pub fn first_violation(&self, tree: &DisplayTree) -> Option<EditError> {
        self.fields.iter().find_map(|key| {
            let value = tree.field(&self.plan.tree_axis, &key.channel, &key.register, &key.field)?;
            if value.is_within_bounds() {
                return None;
            }
            Some(EditError::out_of_bounds(
                &key.field,
                value.bits,
                value.pending_total().unwrap_or_default(),
            ))
        })
    }

    /// 全対象が範囲内なら true（値は変更しない）
    pub fn can_apply(&self, tree: &DisplayTree) -> bool {
        self.first_violation(tree).is_none()
    }

    /// 保留中の編集を確定して外す。範囲チェックはしない
    ///
    /// Returns:
    ///     確定したフィールド数
    pub fn apply(&self, tree: &mut DisplayTree) -> usize {
        let mut applied = 0;
        for key in &self.fields {
            if let Some(value) = tree.field_mut(&self.plan.tree_axis, &key.channel, &key.register, &key.field) {
                if value.apply_edit() {
                    applied += 1;
                }
            }
        }
        debug!("Applied {} field edits on {}", applied, self.plan.tree_axis);
        applied
    }

    /// 保留中の編集をすべて外す
    pub fn clear(&self, tree: &mut DisplayTree) {
        for key in &self.fields {
            if let Some(value) = tree.field_mut(&self.plan.tree_axis, &key.channel, &key.register, &key.field) {
                value.detach();
            }
        }
    }

    /// 全対象に新しい編集を付け直す
    pub fn reattach(&self, tree: &mut DisplayTree) {
        for key in &self.fields {
            if let Some(value) = tree.field_mut(&self.plan.tree_axis, &key.channel, &key.register, &key.field) {
                value.attach();
            }
        }
    }
}
