#![allow(dead_code)]

pub mod builders;
pub mod env;
pub mod mock_trust;

pub use builders::GroupBuilder;
pub use env::{FlakyStore, RecordingAuditLog, TestEnv};
pub use mock_trust::MockTrust;
