//! ctxstack: Thread-Confined Persistence Contexts
//!
//! A [`Stack`] pairs one store coordinator with a primary context, owned by the
//! primary thread, and a lazily created background context per worker thread.
//! Background commits are replayed into the primary context on the primary
//! thread, in the order they happened, so UI-side state catches up without
//! ever being touched from a worker.
//!
//! ```no_run
//! use ctxstack::{OsThreadHost, Stack, StackOptions};
//!
//! let (host, queue) = OsThreadHost::on_current_thread();
//! let stack = Stack::open(StackOptions::new("model.toml", "data/store"), host);
//! let primary = stack.context_for_current_thread();
//! # let _ = (primary, queue);
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod notification;
pub mod stack;
pub mod store;
pub mod thread;

pub use context::{ChangeSet, Context, ContextId, ContextKind, MergePolicy, SaveNotification};
pub use error::{ContextError, ModelError, StackError, StoreError};
pub use stack::{context_for_current_thread, install_main_stack, main_stack, reset_main_stack};
pub use stack::{Stack, StackOptions};
pub use store::{Coordinator, Model, ObjectId, ObjectRecord, Properties, StoreOptions, StoreType};
pub use thread::{MainQueue, OsThreadHost, SimulatedThreads, ThreadHandle, ThreadHost};
