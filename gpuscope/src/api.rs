//! Host-side registration surface
//!
//! Child profilers (such as [`crate::XpuProfiler`]) may register before the
//! host profiler exists. Their factories are queued and instantiated once the
//! host comes up. A client hooking profiler init registers here as well and
//! is only ever initialized from the thread that registered it.

use log::{error, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::profiler::ActivityProfiler;

pub type ChildProfiler = Box<dyn ActivityProfiler + Send>;

/// Builds one child profiler
pub type ProfilerFactory = Box<dyn Fn() -> ChildProfiler + Send>;

/// External init hook, assumed not thread-safe
pub trait ClientInterface: Send + Sync {
    fn init(&self);
}

struct RegisteredClient {
    client: Arc<dyn ClientInterface>,
    thread: ThreadId,
}

#[derive(Default)]
pub struct ProfilerApi {
    /// `None` until the host profiler is initialized
    children: Mutex<Option<Vec<ChildProfiler>>>,
    pending: Mutex<Vec<ProfilerFactory>>,
    client: Mutex<Option<RegisteredClient>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProfilerApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the host profiler as ready; queued factories stay queued until
    /// [`init_child_profilers`](Self::init_child_profilers)
    pub fn initialize_host(&self) {
        lock(&self.children).get_or_insert_with(Vec::new);
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.children).is_some()
    }

    /// Instantiate the child now if the host is ready, otherwise queue it
    pub fn register_profiler_factory(&self, factory: ProfilerFactory) {
        let mut children = lock(&self.children);
        match children.as_mut() {
            Some(children) => children.push(factory()),
            None => lock(&self.pending).push(factory),
        }
    }

    /// Drain queued factories into the host; no-op before the host is ready
    pub fn init_child_profilers(&self) {
        let mut children = lock(&self.children);
        let Some(children) = children.as_mut() else {
            return;
        };
        let factories = std::mem::take(&mut *lock(&self.pending));
        if !factories.is_empty() {
            info!("Initializing {} queued child profiler(s)", factories.len());
        }
        children.extend(factories.iter().map(|factory| factory()));
    }

    pub fn pending_factories(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn child_profiler_names(&self) -> Vec<String> {
        lock(&self.children)
            .as_ref()
            .map(|children| children.iter().map(|child| child.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Remember `client` and the calling thread; init right away if the host is ready
    pub fn register_client(&self, client: Arc<dyn ClientInterface>) {
        if self.is_initialized() {
            client.init();
        }
        *lock(&self.client) = Some(RegisteredClient { client, thread: thread::current().id() });
    }

    /// Init the registered client, if any, on its registering thread
    ///
    /// Returns whether the client was initialized. A call from any other
    /// thread is reported and skipped.
    pub fn init_client_if_registered(&self) -> bool {
        let guard = lock(&self.client);
        let Some(registered) = guard.as_ref() else {
            return false;
        };
        let current = thread::current().id();
        if registered.thread != current {
            error!(
                "External init callback must run in same thread as register_client ({current:?} != {:?})",
                registered.thread
            );
            return false;
        }
        registered.client.init();
        true
    }
}

impl std::fmt::Debug for ProfilerApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilerApi")
            .field("children", &self.child_profiler_names())
            .field("pending", &self.pending_factories())
            .finish_non_exhaustive()
    }
}
