//! Closing every live recorder at shutdown.
use crate::dtype::Element;
use crate::error::RecordError;
use crate::recorder::TraceRecorder;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// Something that holds buffered data until it is closed.
pub trait Close {
    /// Write out buffered data and release it. Must be idempotent.
    fn close(&mut self) -> Result<(), RecordError>;
}

impl<O: Element, A: Element> Close for TraceRecorder<O, A> {
    fn close(&mut self) -> Result<(), RecordError> {
        Self::close(self)
    }
}

/// Handle to a registration with a [`Closer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CloseId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: BTreeMap<u64, Weak<Mutex<dyn Close + Send>>>,
}

/// Shutdown coordinator for recorders.
///
/// Holds weak references so that registration does not keep a recorder alive.
/// The process entry point owns the closer and calls [`close_all`](Closer::close_all)
/// once before exiting.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use trace_recording::{Closer, TraceRecorderConfig};
///
/// let dir = std::env::temp_dir().join("closer-doctest");
/// let closer = Closer::new();
/// let recorder = Arc::new(Mutex::new(
///     TraceRecorderConfig::new(&dir).build_recorder::<f64, i64>().unwrap(),
/// ));
/// closer.register(&recorder);
/// // ... record ...
/// assert!(closer.close_all().is_empty());
/// assert!(recorder.lock().unwrap().is_closed());
/// ```
#[derive(Default)]
pub struct Closer {
    registry: Mutex<Registry>,
}

impl Closer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an object to be closed by [`close_all`](Closer::close_all).
    pub fn register<T>(&self, handle: &Arc<Mutex<T>>) -> CloseId
    where
        T: Close + Send + 'static,
    {
        let handle: Arc<Mutex<dyn Close + Send>> = handle.clone();
        let mut registry = self.registry();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.insert(id, Arc::downgrade(&handle));
        CloseId(id)
    }

    /// Remove a registration, for objects that were closed explicitly.
    ///
    /// Returns whether the registration existed.
    pub fn unregister(&self, id: CloseId) -> bool {
        self.registry().entries.remove(&id.0).is_some()
    }

    /// Number of registered objects that are still alive.
    #[must_use]
    pub fn num_live(&self) -> usize {
        self.registry()
            .entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Close every live registered object, in registration order.
    ///
    /// Each object is closed at most once: all registrations are removed,
    /// so a second call does nothing. Objects that were already dropped are skipped.
    /// Returns the objects that failed to close.
    pub fn close_all(&self) -> Vec<(CloseId, RecordError)> {
        let entries = std::mem::take(&mut self.registry().entries);
        let mut failures = Vec::new();
        for (id, weak) in entries {
            let handle = match weak.upgrade() {
                Some(handle) => handle,
                None => continue,
            };
            let mut object = handle.lock().unwrap_or_else(PoisonError::into_inner);
            match object.close() {
                Ok(()) => debug!(id, "closed registered recorder"),
                Err(err) => failures.push((CloseId(id), err)),
            }
        }
        failures
    }
}
