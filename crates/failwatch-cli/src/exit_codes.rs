//! Process exit codes. Part of the CLI contract.

pub const SUCCESS: i32 = 0;
pub const FATAL: i32 = 2; // Store could not be opened/initialized, or config error
