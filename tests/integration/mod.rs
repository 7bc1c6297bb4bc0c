//! Integration tests for the context stack

mod config_integration;
mod os_threads;
mod save_merge;
mod store_recovery;
mod test_utils;
