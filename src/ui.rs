//! User-facing notices and busy indicators
//!
//! The host UI is reached only through [`Notifier`]. Busy indicators are
//! scoped: a [`BusyGuard`] shows the indicator when acquired and hides it
//! when dropped, so every exit path releases it.

use std::sync::{Arc, Mutex};

pub trait Notifier: Send + Sync {
    fn notice(&self, message: &str);
    fn show_busy(&self, label: &str);
    fn hide_busy(&self, label: &str);
}

/// Visible "in progress" indicator for the lifetime of the guard.
#[must_use = "the busy indicator is hidden as soon as the guard is dropped"]
pub struct BusyGuard {
    notifier: Arc<dyn Notifier>,
    label: String,
}

impl BusyGuard {
    pub fn acquire(notifier: Arc<dyn Notifier>, label: impl Into<String>) -> Self {
        let label = label.into();
        notifier.show_busy(&label);
        Self { notifier, label }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.notifier.hide_busy(&self.label);
    }
}

/// Notices on stdout, busy state on stderr.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notice(&self, message: &str) {
        println!("{}", message);
    }

    fn show_busy(&self, label: &str) {
        eprintln!("{}", label);
    }

    fn hide_busy(&self, label: &str) {
        tracing::debug!("Finished: {}", label);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Notice(String),
    BusyShown(String),
    BusyHidden(String),
}

/// Notifier that records what would have been shown.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<UiEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn get_notices(&self) -> Vec<String> {
        self.get_events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::Notice(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Number of busy indicators currently visible.
    pub fn busy_depth(&self) -> usize {
        self.get_events().iter().fold(0, |depth, event| match event {
            UiEvent::BusyShown(_) => depth + 1,
            UiEvent::BusyHidden(_) => depth.saturating_sub(1),
            UiEvent::Notice(_) => depth,
        })
    }
}

impl Notifier for RecordingNotifier {
    fn notice(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(UiEvent::Notice(message.to_string()));
    }

    fn show_busy(&self, label: &str) {
        self.events
            .lock()
            .unwrap()
            .push(UiEvent::BusyShown(label.to_string()));
    }

    fn hide_busy(&self, label: &str) {
        self.events
            .lock()
            .unwrap()
            .push(UiEvent::BusyHidden(label.to_string()));
    }
}
