//! レジスタコア機能
//! ビット操作とエラー型

pub mod bit_utils;
pub mod exceptions;

// 便利な再エクスポート
pub use bit_utils::{
    decode_field, encode_field, extract_bits, field_mask, format_hex_literal, parse_hex_literal,
    set_bits, twos_complement, twos_complement_value, within_bounds,
};
pub use exceptions::{CatalogError, DvfsError, DvfsResult, EditError, ExportError, ParseError};
