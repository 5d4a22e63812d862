// Library module for ossync
// Re-exports modules for use in integration tests and the binary

pub mod config;
pub mod storage;
pub mod sync;
