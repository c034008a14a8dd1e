//! # Scan Events
//!
//! How the controller talks to the UI.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ScanController ──► dyn ScanEventEmitter                               │
//! │                       │                                                 │
//! │                       ├─ NoOpEmitter       (headless, tests)           │
//! │                       ├─ ChannelEmitter    (mpsc → UI bridge / demo)   │
//! │                       └─ RecordingEmitter  (assertions)                │
//! │                                                                         │
//! │  Events are delivered in completion order:                             │
//! │    status("Requesting camera access...")                               │
//! │    torch_availability / multiple_cameras   (once per start)            │
//! │    status("Camera ready. Starting decoder...")                         │
//! │    status("Point the camera at a barcode.")                            │
//! │    status("Code detected: X") + result                                 │
//! │    status("Scanning stopped.")                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use shelfscan_core::DecodeResult;
use tokio::sync::mpsc;
use ts_rs::TS;

use crate::error::ScanError;

// =============================================================================
// Emitter Trait
// =============================================================================

/// Receives scanner events. Called from controller tasks, so
/// implementations must not block.
pub trait ScanEventEmitter: Send + Sync {
    /// Human-readable progress text.
    fn on_status(&self, text: &str);

    /// A barcode passed the cooldown (or was typed in).
    fn on_result(&self, result: &DecodeResult);

    /// A fatal failure; the controller is back to Idle.
    fn on_error(&self, error: &ScanError);

    /// Whether the active camera has a torch.
    fn on_torch_availability(&self, available: bool);

    /// Whether there is another camera to switch to.
    fn on_multiple_cameras(&self, multiple: bool);
}

/// No-op event emitter for headless use and testing.
pub struct NoOpEmitter;

impl ScanEventEmitter for NoOpEmitter {
    fn on_status(&self, _text: &str) {}
    fn on_result(&self, _result: &DecodeResult) {}
    fn on_error(&self, _error: &ScanError) {}
    fn on_torch_availability(&self, _available: bool) {}
    fn on_multiple_cameras(&self, _multiple: bool) {}
}

// =============================================================================
// Serializable Events
// =============================================================================

/// An emitter call as data, for bridges that forward events to a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ScanEvent {
    Status {
        text: String,
    },
    Result {
        result: DecodeResult,
    },
    Error {
        kind: String,
        message: String,
    },
    TorchAvailability {
        available: bool,
    },
    MultipleCameras {
        multiple: bool,
    },
}

impl ScanEvent {
    pub fn error(error: &ScanError) -> Self {
        ScanEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

// =============================================================================
// Channel Emitter
// =============================================================================

/// Forwards every event on an unbounded channel.
///
/// Unbounded because emitter calls are synchronous and must never drop or
/// reorder events; the consumer is expected to keep up with a handful of
/// events per second.
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelEmitter { tx }, rx)
    }

    fn send(&self, event: ScanEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Scan event receiver dropped");
        }
    }
}

impl ScanEventEmitter for ChannelEmitter {
    fn on_status(&self, text: &str) {
        self.send(ScanEvent::Status {
            text: text.to_string(),
        });
    }

    fn on_result(&self, result: &DecodeResult) {
        self.send(ScanEvent::Result {
            result: result.clone(),
        });
    }

    fn on_error(&self, error: &ScanError) {
        self.send(ScanEvent::error(error));
    }

    fn on_torch_availability(&self, available: bool) {
        self.send(ScanEvent::TorchAvailability { available });
    }

    fn on_multiple_cameras(&self, multiple: bool) {
        self.send(ScanEvent::MultipleCameras { multiple });
    }
}

// =============================================================================
// Recording Emitter
// =============================================================================

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<ScanEvent>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ScanEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    /// All events so far, oldest first.
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::Status { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<DecodeResult> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::Result { result } => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Kinds of every reported error.
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::Error { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl ScanEventEmitter for RecordingEmitter {
    fn on_status(&self, text: &str) {
        self.push(ScanEvent::Status {
            text: text.to_string(),
        });
    }

    fn on_result(&self, result: &DecodeResult) {
        self.push(ScanEvent::Result {
            result: result.clone(),
        });
    }

    fn on_error(&self, error: &ScanError) {
        self.push(ScanEvent::error(error));
    }

    fn on_torch_availability(&self, available: bool) {
        self.push(ScanEvent::TorchAvailability { available });
    }

    fn on_multiple_cameras(&self, multiple: bool) {
        self.push(ScanEvent::MultipleCameras { multiple });
    }
}
