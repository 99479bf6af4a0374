//! レジスタ定義
//! カタログ、軸対応表、ハードウェアプロファイル

pub mod axis_table;
pub mod catalog;
pub mod core;
pub mod profile;

pub use axis_table::{AxisMappingTable, AxisRule, DisplayLayout, FieldSelection, RuleMatch};
pub use catalog::{extend, Bank, FieldDefinition, RegisterCatalog, RegisterDefinition};
pub use profile::{Profile, ProfileDefinition, ProfileRegistry};
