//! Unified exit codes. Part of the public contract; CI branches on these.

pub const SUCCESS: i32 = 0;
pub const TEST_FAILED: i32 = 1; // At least one case failed or errored
pub const CONFIG_ERROR: i32 = 2; // Bad config, missing files, unmatched filters
