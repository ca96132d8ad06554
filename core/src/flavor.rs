//! Decorative flavor text attached to an already-committed win.
//!
//! Requests run off the pull path on a worker thread and are polled.
//! A failing or silent source resolves to a fixed fallback line; the
//! engine never waits on it and never retries.

use std::sync::{
    mpsc::{self, Receiver, TryRecvError},
    Arc,
};

/// Shown when the source has nothing to say.
pub const QUIET_WHISPER: &str = "Starlight on the pillow. Good night, sweet dreams.";
/// Shown when the source failed.
pub const FALLBACK_WHISPER: &str =
    "The night is deep and the stars are asleep. Time for you to sleep too.";

/// Anything that can turn an item label into a bedtime line.
pub trait FlavorSource: Send + Sync {
    fn whisper(&self, label: &str) -> anyhow::Result<Option<String>>;
}

/// Offline source: picks a line from a fixed list, keyed by the label.
pub struct CannedWhispers {
    lines: Vec<String>,
}

impl CannedWhispers {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

impl Default for CannedWhispers {
    fn default() -> Self {
        Self::new(
            [
                "Let {label} carry you gently into sleep.",
                "{label} is here, so close your eyes and rest.",
                "Soft as {label}, the night tucks you in.",
                "Dream of {label} until the morning comes.",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }
}

impl FlavorSource for CannedWhispers {
    fn whisper(&self, label: &str) -> anyhow::Result<Option<String>> {
        if self.lines.is_empty() {
            return Ok(None);
        }
        let key = label
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        let line = &self.lines[key % self.lines.len()];
        Ok(Some(line.replace("{label}", label)))
    }
}

/// Hands requests to a `FlavorSource` on a background thread.
#[derive(Clone)]
pub struct FlavorChannel {
    source: Arc<dyn FlavorSource>,
}

impl FlavorChannel {
    pub fn new(source: Arc<dyn FlavorSource>) -> Self {
        Self { source }
    }

    pub fn request(&self, label: &str) -> WhisperTicket {
        let (tx, rx) = mpsc::channel();
        let source = Arc::clone(&self.source);
        let label = label.to_string();
        std::thread::spawn(move || {
            let text = match source.whisper(&label) {
                Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => QUIET_WHISPER.to_string(),
                Err(e) => {
                    log::warn!("flavor text for '{label}' failed: {e}");
                    FALLBACK_WHISPER.to_string()
                }
            };
            // The ticket may have been dropped already.
            let _ = tx.send(text);
        });
        WhisperTicket { rx, resolved: None }
    }
}

/// A pending flavor line.
pub struct WhisperTicket {
    rx: Receiver<String>,
    resolved: Option<String>,
}

impl WhisperTicket {
    /// Non-blocking. Returns the line once it has arrived.
    pub fn poll(&mut self) -> Option<&str> {
        if self.resolved.is_none() {
            match self.rx.try_recv() {
                Ok(text) => self.resolved = Some(text),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.resolved = Some(FALLBACK_WHISPER.to_string());
                }
            }
        }
        self.resolved.as_deref()
    }

    /// Block until the line arrives. Tooling and tests only.
    pub fn wait(mut self) -> String {
        if let Some(text) = self.resolved.take() {
            return text;
        }
        self.rx.recv().unwrap_or_else(|_| FALLBACK_WHISPER.to_string())
    }
}
