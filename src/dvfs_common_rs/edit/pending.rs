/// 保留中の編集
/// フィールドに付けて増減を積み上げ、確定時に符号表現へ変換して値を書き換える

use crate::dvfs_common_rs::register::core::bit_utils::{encode_field, twos_complement, within_bounds};
use crate::dvfs_common_rs::table::partition::FieldValue;

/// フィールド1つ分の保留中の編集
///
/// `total` は付けた時点の値（2の補数フィールドは符号付き）に増減を足した値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEdit {
    steps: i64,
    total: i64,
}

impl PendingEdit {
    pub fn new(start: i64) -> Self {
        Self { steps: 0, total: start }
    }

    /// 付けてからの増減の合計
    pub fn steps(&self) -> i64 {
        self.steps
    }

    /// 確定した場合の値
    pub fn total(&self) -> i64 {
        self.total
    }

    /// 増減を積み上げる。i64 の端で飽和し、範囲外のまま残る
    pub fn step(&mut self, delta: i64) {
        self.steps = self.steps.saturating_add(delta);
        self.total = self.total.saturating_add(delta);
    }
}

impl FieldValue {
    /// 新しい編集を付ける（既存の編集は捨てる）
    pub fn attach(&mut self) {
        self.edit = Some(PendingEdit::new(self.signed_value()));
    }

    /// 編集を外す
    pub fn detach(&mut self) -> Option<PendingEdit> {
        self.edit.take()
    }

    /// 編集を増減する（付いていなければ付けてから）
    pub fn step(&mut self, delta: i64) {
        let start = self.signed_value();
        self.edit.get_or_insert_with(|| PendingEdit::new(start)).step(delta);
    }

    /// 保留中の値
    pub fn pending_total(&self) -> Option<i64> {
        self.edit.map(|edit| edit.total())
    }

    /// 保留中の値がビット幅に収まるか（編集がなければ常に true）
    pub fn is_within_bounds(&self) -> bool {
        match self.edit {
            Some(edit) => within_bounds(edit.total(), self.bits, self.twos_complement),
            None => true,
        }
    }

    /// 表示用の値。範囲外なら "N/A"
    pub fn display_total(&self) -> String {
        match self.edit {
            None => format!("{:#x}", self.decoded),
            Some(_) if !self.is_within_bounds() => "N/A".to_string(),
            Some(edit) => format!("{:#x}", twos_complement(edit.total(), self.bits)),
        }
    }

    /// 保留中の値を書き込み形式に変換して確定し、編集を外す
    ///
    /// 範囲チェックは行わない。呼び出し前に `is_within_bounds` を確認すること
    pub fn apply_edit(&mut self) -> bool {
        match self.edit.take() {
            Some(edit) => {
                self.decoded = encode_field(edit.total(), self.bits, self.twos_complement);
                true
            }
            None => false,
        }
    }
}
