//! DVFS テーブルの読み込み
//! 行の解析と、表示ツリーへのフィールド分割

pub mod parser;
pub mod partition;

pub use parser::{FrequencyFlags, ParsedTable, TableParser, FREQUENCY_KEY, RECORD_TERMINATOR};
pub use partition::{DisplayTree, FieldPartitioner, FieldValue, PartitionedTable, RegisterLocation};
