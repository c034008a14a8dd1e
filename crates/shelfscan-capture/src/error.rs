//! # Scan Error Types
//!
//! Error types for capture and decode operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Scan Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Camera (fatal) │  │  Constraint     │  │     Decoder             │ │
//! │  │                 │  │  (falls through)│  │                         │ │
//! │  │  PermissionDen. │  │  Constraint     │  │  DecoderInit            │ │
//! │  │  CameraUnavail. │  │  DeviceNotFound │  │  (native → fallback     │ │
//! │  │  Stream/Timeout │  │  DeviceBusy     │  │   once, then fatal)     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Lifecycle     │  │  Warnings (non-fatal)   │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Cancelled      │  │  TorchUnsupported       │ │
//! │  │  ConfigLoad/Save│  │  NotActive      │  │  TorchApplyFailed       │ │
//! │  └─────────────────┘  └─────────────────┘  │  PerFrameMiss           │ │
//! │                                            └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only two failures are ever retried automatically: a constraint error
//! moves acquisition on to the next constraint set, and a native decoder
//! init failure downgrades once to the software engine. Everything else
//! is reported through `on_error` and the controller returns to Idle.

use shelfscan_core::{CoreError, DecoderKind, ValidationError};
use thiserror::Error;

/// Result type alias for capture operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Scan error type covering every failure the capture layer reports.
#[derive(Debug, Error)]
pub enum ScanError {
    // =========================================================================
    // Camera Errors
    // =========================================================================
    /// The user or the platform refused camera access.
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    /// Every constraint set in the acquisition plan failed.
    #[error("No camera available after {attempts} attempt(s): {last_error}")]
    CameraUnavailable { attempts: usize, last_error: String },

    /// The platform could not satisfy a constraint set.
    #[error("Camera constraints not satisfiable ({constraints}): {reason}")]
    Constraint { constraints: String, reason: String },

    /// The requested device does not exist (unplugged, stale id).
    #[error("Camera device not found: {0}")]
    DeviceNotFound(String),

    /// The device exists but another application holds it.
    #[error("Camera device busy: {0}")]
    DeviceBusy(String),

    /// An opened stream failed or ended.
    #[error("Camera stream error: {0}")]
    Stream(String),

    /// A suspension point exceeded its configured bound.
    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: String, millis: u64 },

    // =========================================================================
    // Decoder Errors
    // =========================================================================
    /// A decoding strategy could not be initialised or attached.
    #[error("{decoder} decoder failed to initialise: {reason}")]
    DecoderInit { decoder: DecoderKind, reason: String },

    /// A single detection call failed.
    #[error("Detection failed: {0}")]
    Detection(String),

    /// The platform rejected a torch constraint.
    #[error("Torch constraint rejected: {0}")]
    TorchApply(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid scanner configuration.
    #[error("Invalid scanner configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The start sequence was cancelled by `stop()`.
    #[error("Scan start cancelled")]
    Cancelled,

    /// The operation needs an active scanner.
    #[error("Scanner is not active")]
    NotActive,

    /// Internal channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Error from the core crate (symbology, frame or input validation).
    #[error(transparent)]
    Core(#[from] CoreError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for ScanError {
    fn from(err: ValidationError) -> Self {
        ScanError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(err: toml::de::Error) -> Self {
        ScanError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ScanError {
    fn from(err: toml::ser::Error) -> Self {
        ScanError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl ScanError {
    /// Returns true if this error ends the scan session.
    ///
    /// ## Fatal Errors
    /// - Permission denial (never retried)
    /// - Camera exhaustion after the whole constraint plan
    /// - Decoder init once the fallback has also failed
    /// - Stream failures and timeouts while acquiring
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::PermissionDenied(_)
                | ScanError::CameraUnavailable { .. }
                | ScanError::DecoderInit { .. }
                | ScanError::Stream(_)
                | ScanError::Timeout { .. }
        )
    }

    /// Returns true if acquisition should move on to the next constraint
    /// set instead of failing.
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            ScanError::Constraint { .. } | ScanError::DeviceNotFound(_) | ScanError::DeviceBusy(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidConfig(_)
                | ScanError::ConfigLoadFailed(_)
                | ScanError::ConfigSaveFailed(_)
        )
    }

    /// Stable snake_case tag sent to the UI alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::PermissionDenied(_) => "permission_denied",
            ScanError::CameraUnavailable { .. } => "camera_unavailable",
            ScanError::Constraint { .. } => "constraint",
            ScanError::DeviceNotFound(_) => "device_not_found",
            ScanError::DeviceBusy(_) => "device_busy",
            ScanError::Stream(_) => "stream",
            ScanError::Timeout { .. } => "timeout",
            ScanError::DecoderInit { .. } => "decoder_init",
            ScanError::Detection(_) => "detection",
            ScanError::TorchApply(_) => "torch_apply",
            ScanError::InvalidConfig(_) => "invalid_config",
            ScanError::ConfigLoadFailed(_) => "config_load_failed",
            ScanError::ConfigSaveFailed(_) => "config_save_failed",
            ScanError::Cancelled => "cancelled",
            ScanError::NotActive => "not_active",
            ScanError::ChannelError(_) => "channel",
            ScanError::Core(CoreError::Validation(_)) => "validation",
            ScanError::Core(_) => "core",
        }
    }

    /// Wraps any failure as a `DecoderInit` for the given strategy,
    /// keeping an existing `DecoderInit` untouched.
    pub fn into_decoder_init(self, decoder: DecoderKind) -> ScanError {
        match self {
            err @ ScanError::DecoderInit { .. } => err,
            other => ScanError::DecoderInit {
                decoder,
                reason: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Warnings
// =============================================================================

/// Non-fatal conditions reported as status text and logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanWarning {
    /// The active camera exposes no torch-capable track.
    #[error("Torch is not supported on this camera.")]
    TorchUnsupported,

    /// The platform rejected the torch constraint; state unchanged.
    #[error("Could not change the torch: {0}")]
    TorchApplyFailed(String),

    /// A frame yielded no barcode. Never shown to the user.
    #[error("No barcode in frame")]
    PerFrameMiss,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_and_fall_through_are_disjoint() {
        let constraint = ScanError::Constraint {
            constraints: "device=cam-1 640x480".into(),
            reason: "overconstrained".into(),
        };
        assert!(constraint.falls_through());
        assert!(!constraint.is_fatal());

        let denied = ScanError::PermissionDenied("blocked".into());
        assert!(denied.is_fatal());
        assert!(!denied.falls_through());

        assert!(ScanError::DeviceNotFound("cam-9".into()).falls_through());
        assert!(!ScanError::Cancelled.is_fatal());
    }

    #[test]
    fn test_into_decoder_init() {
        let err = ScanError::Timeout {
            operation: "native reader init".into(),
            millis: 5000,
        }
        .into_decoder_init(DecoderKind::Native);
        assert!(matches!(
            err,
            ScanError::DecoderInit {
                decoder: DecoderKind::Native,
                ..
            }
        ));

        let kept = ScanError::DecoderInit {
            decoder: DecoderKind::Fallback,
            reason: "no symbologies".into(),
        }
        .into_decoder_init(DecoderKind::Native);
        assert!(matches!(
            kept,
            ScanError::DecoderInit {
                decoder: DecoderKind::Fallback,
                ..
            }
        ));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(ScanError::PermissionDenied("x".into()).kind(), "permission_denied");
        assert_eq!(
            ScanError::from(ValidationError::Required {
                field: "barcode".into()
            })
            .kind(),
            "validation"
        );
        assert!(ScanError::InvalidConfig("x".into()).is_config_error());
    }

    #[test]
    fn test_warning_text() {
        assert_eq!(
            ScanWarning::TorchUnsupported.to_string(),
            "Torch is not supported on this camera."
        );
    }
}
