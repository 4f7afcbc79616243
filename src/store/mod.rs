mod storage;
mod types;

pub use storage::{PairingStore, sanitize_name};
pub use types::*;
