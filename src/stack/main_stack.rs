//! Process-wide "main stack" slot behind the free [`context_for_current_thread`].
//!
//! This is global state: prefer passing a [`Stack`] explicitly. Tests that use
//! the slot must [`reset_main_stack`] when done and must not run concurrently
//! with other tests touching it.

use crate::context::Context;
use crate::error::StackError;
use crate::stack::Stack;
use parking_lot::{const_rwlock, RwLock};
use std::sync::Arc;
use tracing::debug;

static MAIN_STACK: RwLock<Option<Arc<Stack>>> = const_rwlock(None);

/// Designate `stack` as the main stack. Fails if one is already installed.
pub fn install_main_stack(stack: Arc<Stack>) -> Result<(), StackError> {
    let mut slot = MAIN_STACK.write();
    if slot.is_some() {
        return Err(StackError::MainStackAlreadySet);
    }
    debug!(slot = stack.key().as_u64(), "main stack installed");
    *slot = Some(stack);
    Ok(())
}

pub fn main_stack() -> Option<Arc<Stack>> {
    MAIN_STACK.read().clone()
}

/// Clear the slot, returning the stack that was installed.
pub fn reset_main_stack() -> Option<Arc<Stack>> {
    MAIN_STACK.write().take()
}

/// The calling thread's context on the main stack.
pub fn context_for_current_thread() -> Result<Context, StackError> {
    let stack = main_stack().ok_or_else(|| {
        StackError::Configuration("no main stack has been installed".to_string())
    })?;
    Ok(stack.context_for_current_thread())
}
