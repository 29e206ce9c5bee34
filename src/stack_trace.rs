//! Diagnostic log of every transport attempt.

use crate::config::HeaderBag;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One physical transport attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceEntry {
    /// When the attempt started.
    pub start_timestamp: DateTime<Utc>,
    /// When the attempt finished (or failed).
    pub end_timestamp: DateTime<Utc>,
    /// The exact URL requested.
    pub request_url: String,
    /// The HTTP method.
    pub request_method: String,
    /// Headers sent.
    pub request_headers: HeaderBag,
    /// Headers received, empty if no response was obtained.
    pub response_headers: HeaderBag,
    /// Body sent, empty if none.
    pub request_body: String,
    /// Body received, parsed as JSON when possible.
    pub response_body: Value,
    /// Status code received, if a response was obtained.
    pub status_code: Option<u16>,
    /// Transport error, if the attempt failed.
    pub error_message: Option<String>,
    /// The endpoint's resolved stack trace extra parameters.
    pub extra_properties: Map<String, Value>,
}

/// Callback invoked with every new entry.
pub type StackTraceObserver = Arc<dyn Fn(&StackTraceEntry) + Send + Sync>;

/// Append-only, shareable log of [`StackTraceEntry`] values.
///
/// Clones share the same underlying log.
#[derive(Clone, Default)]
pub struct StackTraceLog {
    entries: Arc<Mutex<Vec<StackTraceEntry>>>,
    observer: Option<StackTraceObserver>,
}

impl StackTraceLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty log that also pushes each entry to `observer`.
    pub fn with_observer(observer: StackTraceObserver) -> Self {
        Self {
            entries: Arc::default(),
            observer: Some(observer),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StackTraceEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, entry: StackTraceEntry) {
        if let Some(observer) = &self.observer {
            observer(&entry);
        }
        self.lock().push(entry);
    }

    /// Returns a snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<StackTraceEntry> {
        self.lock().clone()
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl fmt::Debug for StackTraceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTraceLog")
            .field("len", &self.len())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
