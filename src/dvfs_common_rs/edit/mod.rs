//! フィールド編集
//! 保留中の編集と編集セッション

pub mod pending;
pub mod session;

pub use pending::PendingEdit;
pub use session::{EditSession, FieldKey, SelectionPlan};
