//! 書き出し
//! レジスタ値の再構成と、テーブル形式・設定ファイル形式の書き換え

pub mod primary;
pub mod publish;
pub mod reassemble;
pub mod secondary;

pub use primary::{rewrite_table, TableRewrite};
pub use publish::{output_path, publish};
pub use reassemble::{reencode, reencode_register};
pub use secondary::{header_frequency, mhz_to_khz, rewrite_secondary, SecondaryRewrite};
