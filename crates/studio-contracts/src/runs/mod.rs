pub mod receipt;

pub use receipt::{now_utc_iso, write_receipt, AttemptRecord, AttemptStatus, TransformReceipt};
