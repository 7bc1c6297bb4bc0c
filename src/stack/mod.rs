//! Context stack
//!
//! A [`Stack`] owns a coordinator, the primary context, and a slot registry
//! of per-thread background contexts. Asking it for "the current thread's
//! context" returns the primary context on the primary thread and a lazily
//! created, thread-confined background context everywhere else. Commits from
//! background contexts are merged into the primary context on the primary
//! thread.

pub mod lifecycle;
pub mod main_stack;
pub mod merge;
pub mod registry;

pub use main_stack::{context_for_current_thread, install_main_stack, main_stack, reset_main_stack};
pub use registry::SlotRegistry;

use crate::context::{Context, ContextKind, MergePolicy};
use crate::error::StackError;
use crate::notification::Subscription;
use crate::store::{erase_store, open_store, Coordinator, Model, StoreOptions, StoreType};
use crate::thread::{SlotKey, ThreadHandle, ThreadHost};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything needed to open a stack from files.
#[derive(Debug, Clone)]
pub struct StackOptions {
    pub model_path: PathBuf,
    pub store_path: Option<PathBuf>,
    pub store_type: StoreType,
    /// Delete and recreate the store once if it fails to open.
    pub erase_on_open_failure: bool,
    pub store: StoreOptions,
}

impl StackOptions {
    pub fn new(model_path: impl Into<PathBuf>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            store_path: Some(store_path.into()),
            store_type: StoreType::default(),
            erase_on_open_failure: false,
            store: StoreOptions::default(),
        }
    }

    pub fn in_memory(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            store_path: None,
            store_type: StoreType::InMemory,
            erase_on_open_failure: false,
            store: StoreOptions::default(),
        }
    }

    pub fn erase_on_open_failure(mut self, erase: bool) -> Self {
        self.erase_on_open_failure = erase;
        self
    }

    pub fn store_options(mut self, store: StoreOptions) -> Self {
        self.store = store;
        self
    }
}

pub struct Stack {
    key: SlotKey,
    coordinator: Coordinator,
    primary: Context,
    host: Arc<dyn ThreadHost>,
    registry: Arc<SlotRegistry>,
    lifecycle: Option<Subscription>,
    merges: Option<Subscription>,
}

impl Stack {
    /// Build a stack over an existing coordinator. The primary context is
    /// created on the primary thread; from any other thread this blocks until
    /// the primary thread has run the creation.
    pub fn new(coordinator: Coordinator, host: Arc<dyn ThreadHost>) -> Result<Self, StackError> {
        let primary = create_primary(&coordinator, host.as_ref())?;
        let key = SlotKey::next();
        let registry = Arc::new(SlotRegistry::new(key));

        let lifecycle = lifecycle::track_thread_exits(host.as_ref(), registry.clone());
        let merges = merge::observe_saves(
            &coordinator.options().notifications,
            primary.clone(),
            host.clone(),
        );

        info!(
            slot = key.as_u64(),
            coordinator = coordinator.id().as_u64(),
            primary = %primary.id(),
            "stack ready"
        );
        Ok(Self {
            key,
            coordinator,
            primary,
            host,
            registry,
            lifecycle: Some(lifecycle),
            merges: Some(merges),
        })
    }

    /// Load the model, open the store, and build the stack. With
    /// `erase_on_open_failure`, a durable store that fails to open is deleted
    /// and opened once more.
    pub fn try_open(options: StackOptions, host: Arc<dyn ThreadHost>) -> Result<Self, StackError> {
        let model = Arc::new(Model::from_path(&options.model_path)?);
        let store_path = options.store_path.as_deref();

        let coordinator = match open_store(
            model.clone(),
            store_path,
            options.store_type,
            options.store.clone(),
        ) {
            Ok(coordinator) => coordinator,
            Err(err) => match store_path {
                Some(path) if options.erase_on_open_failure && options.store_type == StoreType::Sled => {
                    warn!(
                        store = %path.display(),
                        error = %err,
                        "store failed to open; erasing and recreating"
                    );
                    erase_store(path)?;
                    open_store(model, store_path, options.store_type, options.store.clone())?
                }
                _ => return Err(err.into()),
            },
        };

        Self::new(coordinator, host)
    }

    /// [`Stack::try_open`], aborting the process on failure. A stack cannot
    /// run without its store.
    pub fn open(options: StackOptions, host: Arc<dyn ThreadHost>) -> Self {
        match Self::try_open(options, host) {
            Ok(stack) => stack,
            Err(err) => {
                error!(error = %err, "failed to initialize the stack's saved data; aborting");
                eprintln!("Error, aborting: {}", err);
                std::process::abort();
            }
        }
    }

    /// The calling thread's context. Never fails.
    pub fn context_for_current_thread(&self) -> Context {
        if self.host.is_primary() {
            return self.primary.clone();
        }

        let thread = self.host.current();
        if let Some(context) = self.registry.lookup(thread) {
            return context;
        }

        let context =
            self.coordinator
                .new_context(ContextKind::Background, thread, MergePolicy::LocalTrumpsStore);
        self.registry
            .register(thread, self.host.local_storage(), context.clone());
        debug!(
            %thread,
            context = %context.id(),
            slot = self.key.as_u64(),
            "background context created"
        );
        context
    }

    pub fn primary_context(&self) -> &Context {
        &self.primary
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn host(&self) -> &Arc<dyn ThreadHost> {
        &self.host
    }

    /// Identity token this stack files its contexts under.
    pub fn key(&self) -> SlotKey {
        self.key
    }

    /// Threads that currently hold a background context of this stack.
    pub fn registered_threads(&self) -> BTreeSet<ThreadHandle> {
        self.registry.all_registered_handles()
    }

    /// Wait until exits of already terminated threads have been applied to
    /// the registry.
    pub fn settle_thread_exits(&self) {
        self.host.settle_thread_exits();
    }
}

fn create_primary(coordinator: &Coordinator, host: &dyn ThreadHost) -> Result<Context, StackError> {
    let owner = host.primary();
    if host.is_primary() {
        return Ok(coordinator.new_context(ContextKind::Primary, owner, MergePolicy::LocalTrumpsStore));
    }

    let slot = Arc::new(Mutex::new(None));
    let filled = slot.clone();
    let coordinator = coordinator.clone();
    host.run_on_primary_sync(Box::new(move || {
        *filled.lock() = Some(coordinator.new_context(
            ContextKind::Primary,
            owner,
            MergePolicy::LocalTrumpsStore,
        ));
    }));
    let created = slot.lock().take();
    created.ok_or(StackError::PrimaryUnavailable)
}

impl Drop for Stack {
    fn drop(&mut self) {
        // Unsubscribe first so no exit or save event races the purge.
        drop(self.lifecycle.take());
        drop(self.merges.take());
        let purged = self.registry.purge();
        debug!(slot = self.key.as_u64(), purged, "stack torn down");
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("key", &self.key)
            .field("coordinator", &self.coordinator)
            .field("primary", &self.primary)
            .field("threads", &self.registry.len())
            .finish()
    }
}
