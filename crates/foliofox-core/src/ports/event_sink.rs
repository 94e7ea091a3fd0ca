//! Notification sink port.
//!
//! Best-effort delivery of download events to any attached observer (a UI
//! channel, a websocket bridge). Delivery failures are swallowed, never
//! propagated to workers.

use crate::download::DownloadEvent;

/// Port for emitting download events.
///
/// `emit` must not block: implementations buffer or drop. Nothing in the
/// engine ever depends on an event arriving.
pub trait EventSinkPort: Send + Sync {
    /// Emit an event, best-effort.
    fn emit(&self, event: DownloadEvent);
}

/// A no-op sink for tests and headless contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl NoopEventSink {
    /// Create a new no-op sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventSinkPort for NoopEventSink {
    fn emit(&self, _event: DownloadEvent) {
        // Intentionally do nothing
    }
}
