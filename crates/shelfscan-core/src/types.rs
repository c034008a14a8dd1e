//! # Domain Types
//!
//! Core domain types shared by the capture layer and the UI bindings.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ CaptureDevice   │   │  DecodeResult   │   │   ScanState     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (opaque)    │   │  raw_value      │   │  Idle           │       │
//! │  │  label          │   │  symbology      │   │  Acquiring      │       │
//! │  │  is_rear_facing │   │  timestamp      │   │  Active         │       │
//! │  └─────────────────┘   └─────────────────┘   │  Stopping       │       │
//! │                                              └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │ AfterDetection  │   │  DecoderKind    │                             │
//! │  │  Continue       │   │  Native         │                             │
//! │  │  Stop           │   │  Fallback       │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::devices::looks_rear_facing;
use crate::error::CoreError;
use crate::symbology::Symbology;

// =============================================================================
// Capture Device
// =============================================================================

/// A camera endpoint reported by device enumeration.
///
/// Immutable snapshot: a fresh list is taken on every `start()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CaptureDevice {
    /// Opaque platform identifier.
    pub id: String,

    /// Human-readable label ("Back Camera", "FaceTime HD", ...).
    pub label: String,

    /// Inferred from the label, never reported by the platform.
    pub is_rear_facing: bool,
}

impl CaptureDevice {
    /// Creates a device snapshot, inferring `is_rear_facing` from the label.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        CaptureDevice {
            id: id.into(),
            is_rear_facing: looks_rear_facing(&label),
            label,
        }
    }
}

// =============================================================================
// Decode Result
// =============================================================================

/// One barcode read, produced by a decode strategy or by manual entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DecodeResult {
    /// Decoded payload exactly as read.
    pub raw_value: String,

    /// Symbology, when the decoder reports one.
    pub symbology: Option<Symbology>,

    /// When the code was read.
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

impl DecodeResult {
    pub fn new(
        raw_value: impl Into<String>,
        symbology: Option<Symbology>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        DecodeResult {
            raw_value: raw_value.into(),
            symbology,
            timestamp,
        }
    }
}

// =============================================================================
// Scan State
// =============================================================================

/// Lifecycle state of a scan controller.
///
/// ```text
///   Idle ──start()──► Acquiring ──ready──► Active
///    ▲                    │                  │
///    │   failure/cancel   │                  │ stop()
///    └────────────────────┴──── Stopping ◄───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ScanState {
    #[default]
    Idle,
    Acquiring,
    Active,
    Stopping,
}

impl ScanState {
    /// True while a device handle may be held.
    pub fn is_busy(&self) -> bool {
        !matches!(self, ScanState::Idle)
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::Acquiring => write!(f, "acquiring"),
            ScanState::Active => write!(f, "active"),
            ScanState::Stopping => write!(f, "stopping"),
        }
    }
}

// =============================================================================
// After-Detection Mode
// =============================================================================

/// What the controller does after emitting a result.
///
/// `Continue` keeps the session open (continuous scanning, the cooldown
/// gates repeats). `Stop` tears the session down after the first result,
/// which suits a "scan to search" overlay that closes on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AfterDetection {
    #[default]
    Continue,
    Stop,
}

impl std::fmt::Display for AfterDetection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AfterDetection::Continue => write!(f, "continue"),
            AfterDetection::Stop => write!(f, "stop"),
        }
    }
}

impl std::str::FromStr for AfterDetection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" | "continuous" => Ok(AfterDetection::Continue),
            "stop" | "once" | "auto_stop" => Ok(AfterDetection::Stop),
            other => Err(CoreError::Validation(
                crate::error::ValidationError::InvalidFormat {
                    field: "after_detection".to_string(),
                    reason: format!("unknown mode '{}', expected continue or stop", other),
                },
            )),
        }
    }
}

// =============================================================================
// Decoder Kind
// =============================================================================

/// Which decode strategy variant is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DecoderKind {
    /// Platform-provided, hardware-accelerated reader.
    Native,
    /// Software decoding engine.
    Fallback,
}

impl std::fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderKind::Native => write!(f, "native"),
            DecoderKind::Fallback => write!(f, "fallback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_device_infers_facing() {
        assert!(CaptureDevice::new("a", "Back Camera").is_rear_facing);
        assert!(CaptureDevice::new("b", "camera2 0, facing back").is_rear_facing);
        assert!(!CaptureDevice::new("c", "FaceTime HD Camera").is_rear_facing);
    }

    #[test]
    fn test_scan_state_busy() {
        assert!(!ScanState::Idle.is_busy());
        assert!(ScanState::Acquiring.is_busy());
        assert!(ScanState::Active.is_busy());
        assert!(ScanState::Stopping.is_busy());
        assert_eq!(ScanState::Active.to_string(), "active");
    }

    #[test]
    fn test_after_detection_parsing() {
        assert_eq!(
            "continue".parse::<AfterDetection>().unwrap(),
            AfterDetection::Continue
        );
        assert_eq!("STOP".parse::<AfterDetection>().unwrap(), AfterDetection::Stop);
        assert!("sometimes".parse::<AfterDetection>().is_err());
    }

    #[test]
    fn test_decode_result_serializes_snake_case_symbology() {
        let result = DecodeResult::new("5901234123457", Some(Symbology::Ean13), Utc::now());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["raw_value"], "5901234123457");
        assert_eq!(json["symbology"], "ean_13");
    }
}
