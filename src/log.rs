//! Re-bindable logging sink.
//!
//! The compiled schema keeps a [`SharedLog`] handle rather than owning a
//! logger: the handle is skipped by the schema cache and rebound by the
//! loader, so a profile deserialized from disk logs through whatever sink
//! the caller is currently using.

use std::fmt;
use std::sync::{Arc, RwLock};

/// Four-level logging interface the core reports through.
/// No other side effects are permitted from the core.
pub trait LogSink: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default transport: forwards to the `log` crate macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdLog;

impl LogSink for StdLog {
    fn debug(&self, message: &str) {
        log::debug!("{}", message)
    }
    fn info(&self, message: &str) {
        log::info!("{}", message)
    }
    fn warn(&self, message: &str) {
        log::warn!("{}", message)
    }
    fn error(&self, message: &str) {
        log::error!("{}", message)
    }
}

/// Shared, re-bindable handle to a [`LogSink`].
///
/// Clones share the binding. An unbound handle drops all output, which is
/// the state a schema wakes up in after a cache reload until the loader
/// rebinds it.
#[derive(Clone, Default)]
pub struct SharedLog {
    sink: Arc<RwLock<Option<Arc<dyn LogSink>>>>,
}

impl SharedLog {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink: Arc::new(RwLock::new(Some(sink))),
        }
    }

    /// Handle with no sink bound. Output is dropped until `bind` is called.
    pub fn unbound() -> Self {
        Self::default()
    }

    pub fn bind(&self, sink: Arc<dyn LogSink>) {
        if let Ok(mut guard) = self.sink.write() {
            *guard = Some(sink);
        }
    }

    pub fn unbind(&self) {
        if let Ok(mut guard) = self.sink.write() {
            *guard = None;
        }
    }

    pub fn is_bound(&self) -> bool {
        self.sink.read().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn debug(&self, message: &str) {
        self.with_sink(|sink| sink.debug(message))
    }

    pub fn info(&self, message: &str) {
        self.with_sink(|sink| sink.info(message))
    }

    pub fn warn(&self, message: &str) {
        self.with_sink(|sink| sink.warn(message))
    }

    pub fn error(&self, message: &str) {
        self.with_sink(|sink| sink.error(message))
    }

    fn with_sink(&self, op: impl FnOnce(&dyn LogSink)) {
        if let Ok(guard) = self.sink.read() {
            if let Some(sink) = guard.as_deref() {
                op(sink)
            }
        }
    }
}

impl fmt::Debug for SharedLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bound() {
            write!(f, "SharedLog(bound)")
        } else {
            write!(f, "SharedLog(unbound)")
        }
    }
}
