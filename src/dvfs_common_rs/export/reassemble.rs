/// レジスタ値の再構成
/// 編集後のフィールド値と元の値の保護ビットから書き出すレジスタ値を組み立てる

use crate::dvfs_common_rs::table::partition::{DisplayTree, FieldValue, RegisterMasks};

/// フィールド値と保護ビットからレジスタ値を再構成する
///
/// 保護ビットは常に元の値から取り、フィールドのビット範囲と重なっていても上書きしない
///
/// Args:
///     original: 元のレジスタ値
///     fields: レジスタの全フィールド
///     protect_mask: 変更してはならないビット
///
/// Returns:
///     (original & protect_mask) | (フィールドの合成値 & !protect_mask)
pub fn reencode<'a, I>(original: u32, fields: I, protect_mask: u32) -> u32
where
    I: IntoIterator<Item = &'a FieldValue>,
{
    let editable = fields
        .into_iter()
        .fold(0u32, |acc, field| acc | field.decoded.checked_shl(field.lsb).unwrap_or(0));
    (original & protect_mask) | (editable & !protect_mask)
}

/// ツリー上のレジスタを再構成する。ツリーかマスクにない場合は None
pub fn reencode_register(tree: &DisplayTree, masks: &RegisterMasks, register: &str, original: u32) -> Option<u32> {
    let fields = tree.register(register)?;
    let protect_mask = masks.get(register)?;
    Some(reencode(original, fields.values(), protect_mask))
}
