//! # Platform Backends
//!
//! The seams between the scanner and the platform it runs on.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CameraBackend ──open_stream()──► Box<dyn MediaStream>                 │
//! │                                        │                                │
//! │                                        ▼ owned by                       │
//! │                                 CaptureSession                          │
//! │                                   │         │                           │
//! │            tracks() / stop() ◄────┘         └──► VideoHandle (clone)    │
//! │            torch constraints                     │         │            │
//! │                                                  ▼         ▼            │
//! │                                              VideoSink  DecodeStrategy  │
//! │                                              (display)  (read frames)   │
//! │                                                                         │
//! │  Only the session can stop tracks or touch the torch. Everyone else    │
//! │  gets a VideoHandle, which exposes frames and nothing more.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations must be cancel-safe: the session wraps `open_stream`
//! and `apply_torch` in timeouts, and a dropped future must not leave a
//! device handle open.

use std::sync::Arc;

use async_trait::async_trait;
use shelfscan_core::{CaptureDevice, GrayFrame, StreamConstraints};

use crate::error::{ScanError, ScanResult};

// =============================================================================
// Camera Backend
// =============================================================================

/// Platform camera API.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Lists video input devices. Fails with `PermissionDenied` when the
    /// platform blocks enumeration.
    async fn enumerate_devices(&self) -> ScanResult<Vec<CaptureDevice>>;

    /// Opens a video-only stream for one constraint set.
    ///
    /// Constraint and device errors (`Constraint`, `DeviceNotFound`,
    /// `DeviceBusy`) let the caller try looser constraints; anything else
    /// is final.
    async fn open_stream(&self, constraints: &StreamConstraints) -> ScanResult<Box<dyn MediaStream>>;
}

/// An open camera stream.
#[async_trait]
pub trait MediaStream: Send + Sync {
    /// Id of the device the platform actually opened.
    fn device_id(&self) -> &str;

    /// The stream's tracks.
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    /// Waits for the next delivered frame. Fails once the stream has ended.
    async fn next_frame(&self) -> ScanResult<GrayFrame>;

    /// The frame currently on display, if any.
    fn latest_frame(&self) -> Option<GrayFrame>;
}

/// Kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A single track of a stream.
#[async_trait]
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    /// True if the track advertises a torch capability.
    fn supports_torch(&self) -> bool;

    /// Applies the torch constraint.
    async fn apply_torch(&self, on: bool) -> ScanResult<()>;

    /// Stops the track, releasing the device once every track is stopped.
    /// Idempotent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// The UI's video element.
pub trait VideoSink: Send + Sync {
    /// Starts displaying the stream behind `video`.
    fn attach(&self, video: VideoHandle);

    /// Drops the displayed stream. Idempotent.
    fn clear(&self);
}

// =============================================================================
// Video Handle
// =============================================================================

/// Read-only view of a live stream, handed to the sink and decoders.
#[derive(Clone)]
pub struct VideoHandle {
    stream: Arc<dyn MediaStream>,
}

impl VideoHandle {
    pub(crate) fn new(stream: Arc<dyn MediaStream>) -> Self {
        VideoHandle { stream }
    }

    pub fn device_id(&self) -> &str {
        self.stream.device_id()
    }

    /// Waits for the next frame.
    pub async fn next_frame(&self) -> ScanResult<GrayFrame> {
        self.stream.next_frame().await
    }

    /// The frame currently on display.
    pub fn latest_frame(&self) -> Option<GrayFrame> {
        self.stream.latest_frame()
    }

    /// True while at least one video track is live.
    pub fn is_live(&self) -> bool {
        self.stream
            .tracks()
            .iter()
            .any(|t| t.kind() == TrackKind::Video && t.is_live())
    }

    /// Like [`next_frame`](Self::next_frame) but fails fast on a stopped
    /// stream.
    pub async fn next_live_frame(&self) -> ScanResult<GrayFrame> {
        if !self.is_live() {
            return Err(ScanError::Stream("stream has ended".into()));
        }
        self.next_frame().await
    }
}

impl std::fmt::Debug for VideoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoHandle")
            .field("device_id", &self.device_id())
            .field("live", &self.is_live())
            .finish()
    }
}
