// Change Notifier - post-commit fan-out seam
//
// The transport behind this trait (websocket broadcast, message bus, ...) is
// someone else's problem. The ledger core calls `notify` strictly after a
// successful commit; the call is fire-and-forget and must never block or
// fail the mutation it follows.

use std::sync::Mutex;

/// Outbound change signal consumed by connected clients.
pub trait ChangeNotifier: Send + Sync {
    /// Best-effort delivery of a human-readable change summary.
    /// No return value; the core never retries.
    fn notify(&self, message: &str);
}

/// Notifier that emits change summaries as tracing events.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl ChangeNotifier for TracingNotifier {
    fn notify(&self, message: &str) {
        tracing::info!(target: "clinic_ledger::changes", "{message}");
    }
}

/// Notifier that drops everything.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn notify(&self, _message: &str) {}
}

/// Notifier that records messages in memory. Test support.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify("first");
        notifier.notify("second");

        assert_eq!(notifier.messages(), vec!["first", "second"]);
        assert_eq!(notifier.len(), 2);
    }

    #[test]
    fn test_null_notifier_is_silent() {
        // Nothing observable; just exercise the path
        NullNotifier.notify("dropped");
    }
}
