//! # Capture Session
//!
//! Sole owner of the open camera stream.
//!
//! ## Acquisition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  acquire(preferred, quality)                                            │
//! │                                                                         │
//! │  release()  ── previous stream, if any                                  │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  ConstraintPlan ─► [exact id @res] ─► [rear @res] ─► [rear, any res]   │
//! │                         │ Constraint/Device error, timeout: try next    │
//! │                         │ PermissionDenied / other: fail now            │
//! │                         ▼ opened                                        │
//! │  sink.attach(video) ─► await first frame ("playing")                   │
//! │                         │ error/timeout: release, fail                  │
//! │                         ▼                                               │
//! │                    VideoHandle                                          │
//! │                                                                         │
//! │  Plan exhausted ─► CameraUnavailable { attempts, last_error }          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dropping a session releases it.

use std::sync::Arc;
use std::time::Duration;

use shelfscan_core::{devices, CaptureDevice, ConstraintPlan, Resolution};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{CameraBackend, MediaStream, MediaTrack, TrackKind, VideoHandle, VideoSink};
use crate::config::ScannerConfig;
use crate::error::{ScanError, ScanResult};

// =============================================================================
// Settings
// =============================================================================

/// Timeouts and constraint options for a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub strict_rear_facing: bool,
    pub open_timeout: Duration,
    pub first_frame_timeout: Duration,
    pub torch_timeout: Duration,
}

impl From<&ScannerConfig> for SessionSettings {
    fn from(config: &ScannerConfig) -> Self {
        SessionSettings {
            strict_rear_facing: config.camera.strict_rear_facing,
            open_timeout: config.acquire_timeout(),
            first_frame_timeout: config.first_frame_timeout(),
            torch_timeout: config.torch_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings::from(&ScannerConfig::default())
    }
}

/// Outcome of a torch toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorchToggle {
    /// No torch-capable track; the torch stays off.
    Unsupported,
    /// The constraint was applied; the new state.
    Applied(bool),
    /// The platform refused; `state` is unchanged.
    Rejected { state: bool, reason: String },
}

impl TorchToggle {
    /// Torch state after the toggle.
    pub fn state(&self) -> bool {
        match self {
            TorchToggle::Unsupported => false,
            TorchToggle::Applied(on) => *on,
            TorchToggle::Rejected { state, .. } => *state,
        }
    }
}

// =============================================================================
// Capture Session
// =============================================================================

/// Owns at most one open stream and everything tied to it.
pub struct CaptureSession {
    backend: Arc<dyn CameraBackend>,
    sink: Arc<dyn VideoSink>,
    settings: SessionSettings,
    id: Option<Uuid>,
    stream: Option<Arc<dyn MediaStream>>,
    active_device_id: Option<String>,
    torch_track: Option<Arc<dyn MediaTrack>>,
    torch_on: bool,
    quality: Resolution,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CameraBackend>, sink: Arc<dyn VideoSink>, settings: SessionSettings) -> Self {
        CaptureSession {
            backend,
            sink,
            settings,
            id: None,
            stream: None,
            active_device_id: None,
            torch_track: None,
            torch_on: false,
            quality: Resolution::default(),
        }
    }

    /// True while a stream is held.
    pub fn is_alive(&self) -> bool {
        self.stream.is_some()
    }

    pub fn active_device_id(&self) -> Option<&str> {
        self.active_device_id.as_deref()
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    /// A handle to the open stream, if any.
    pub fn video(&self) -> Option<VideoHandle> {
        self.stream.clone().map(VideoHandle::new)
    }

    // =========================================================================
    // Acquire / Release
    // =========================================================================

    /// Opens a stream, walking the constraint plan, and waits until it is
    /// playing.
    pub async fn acquire(&mut self, preferred_device_id: Option<&str>, quality: Resolution) -> ScanResult<VideoHandle> {
        self.release();
        self.quality = quality;

        let plan = ConstraintPlan::build(preferred_device_id, quality, self.settings.strict_rear_facing);
        let mut last_error: Option<ScanError> = None;
        let mut attempts = 0;

        for constraints in plan.iter() {
            attempts += 1;
            debug!(attempt = attempts, %constraints, "Opening camera stream");

            let opened = tokio::time::timeout(self.settings.open_timeout, self.backend.open_stream(constraints))
                .await
                .unwrap_or_else(|_| {
                    Err(ScanError::Timeout {
                        operation: "Camera open".into(),
                        millis: self.settings.open_timeout.as_millis() as u64,
                    })
                });

            match opened {
                Ok(stream) => return self.start_playing(Arc::from(stream)).await,
                Err(e) if e.falls_through() || matches!(e, ScanError::Timeout { .. }) => {
                    warn!(attempt = attempts, %constraints, error = %e, "Constraint set failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ScanError::CameraUnavailable {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no constraint sets".into()),
        })
    }

    async fn start_playing(&mut self, stream: Arc<dyn MediaStream>) -> ScanResult<VideoHandle> {
        let id = Uuid::new_v4();
        let device_id = stream.device_id().to_string();
        self.id = Some(id);
        self.active_device_id = Some(device_id.clone());
        self.stream = Some(stream.clone());

        let video = VideoHandle::new(stream);
        self.sink.attach(video.clone());

        let first = tokio::time::timeout(self.settings.first_frame_timeout, video.next_frame()).await;
        match first {
            Ok(Ok(_)) => {
                info!(session_id = %id, device_id = %device_id, "Camera stream playing");
                Ok(video)
            }
            Ok(Err(e)) => {
                self.release();
                Err(e)
            }
            Err(_) => {
                self.release();
                Err(ScanError::Timeout {
                    operation: "First camera frame".into(),
                    millis: self.settings.first_frame_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Stops every track and clears the sink. Idempotent.
    pub fn release(&mut self) {
        self.torch_track = None;
        self.torch_on = false;

        if let Some(stream) = self.stream.take() {
            for track in stream.tracks() {
                track.stop();
            }
            info!(
                session_id = ?self.id,
                device_id = ?self.active_device_id,
                "Camera stream released"
            );
        }

        self.id = None;
        self.active_device_id = None;
        self.sink.clear();
    }

    // =========================================================================
    // Torch
    // =========================================================================

    /// Finds and caches a torch-capable video track.
    pub fn probe_torch(&mut self) -> bool {
        self.torch_track = self.stream.as_ref().and_then(|stream| {
            stream
                .tracks()
                .into_iter()
                .find(|t| t.kind() == TrackKind::Video && t.supports_torch())
        });
        self.torch_on = false;

        let available = self.torch_track.is_some();
        debug!(
            available,
            track = ?self.torch_track.as_ref().map(|t| t.label().to_string()),
            "Torch probed"
        );
        available
    }

    /// Flips the torch.
    pub async fn toggle_torch(&mut self) -> TorchToggle {
        let Some(track) = self.torch_track.clone() else {
            return TorchToggle::Unsupported;
        };

        let desired = !self.torch_on;
        let applied = tokio::time::timeout(self.settings.torch_timeout, track.apply_torch(desired)).await;

        match applied {
            Ok(Ok(())) => {
                self.torch_on = desired;
                debug!(torch_on = desired, "Torch applied");
                TorchToggle::Applied(desired)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Torch constraint rejected");
                TorchToggle::Rejected {
                    state: self.torch_on,
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!("Torch constraint timed out");
                TorchToggle::Rejected {
                    state: self.torch_on,
                    reason: "timed out".into(),
                }
            }
        }
    }

    // =========================================================================
    // Camera Switching
    // =========================================================================

    /// Moves to the next camera in `devices`. `None` with fewer than two
    /// devices, in which case nothing changes.
    pub async fn switch_camera(&mut self, devices: &[CaptureDevice]) -> ScanResult<Option<VideoHandle>> {
        let Some(next) = devices::next_after(devices, self.active_device_id.as_deref()) else {
            return Ok(None);
        };
        let next_id = next.id.clone();

        info!(from = ?self.active_device_id, to = %next_id, "Switching camera");
        let video = self.acquire(Some(&next_id), self.quality).await?;
        Ok(Some(video))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}
