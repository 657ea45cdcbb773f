//! Library entry point for the process-wide freezable clock.

pub mod handle;
pub mod source;
pub mod state;

pub use handle::{FreezeHandle, freeze, frozen};
pub use source::{freeze_depth, is_frozen, now, now_local, system_time, unix_timestamp};
pub use state::FreezeError;
