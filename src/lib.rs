/// DVFS Calibration Table Editor
/// DRAM DVFS calibration table parsing, field editing and masked re-export

pub mod dvfs_common_rs;

// 便利な再エクスポート
pub mod prelude {
    pub use crate::dvfs_common_rs::edit::{EditSession, FieldKey, SelectionPlan};
    pub use crate::dvfs_common_rs::editor::{
        CalibrationEditor, ExportReport, ExportRequest, FieldRow, MessageSink, MessageSlot,
    };
    pub use crate::dvfs_common_rs::register::core::{DvfsError, DvfsResult};
    pub use crate::dvfs_common_rs::register::{Profile, ProfileRegistry};
    pub use crate::dvfs_common_rs::table::{PartitionedTable, TableParser};
}
