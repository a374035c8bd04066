pub mod change;
pub mod recorder;

pub use recorder::{AuditRecorder, AuditStage};
