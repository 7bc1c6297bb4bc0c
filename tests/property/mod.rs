//! Property-based tests for the context stack

mod thread_lifecycle;
