//! # shelfscan-core: Pure Scanning Logic
//!
//! This crate holds everything about barcode scanning that can be decided
//! without touching a camera: the domain types, the device-selection rules,
//! the constraint fallback plan, the detection cooldown, manual-entry
//! validation, and the software symbology decoder.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        shelfscan Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Dashboard UI (excluded)                        │   │
//! │  │     scan button ──► video overlay ──► search filter            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ ScanEvent stream                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             shelfscan-capture (async runtime layer)             │   │
//! │  │   ScanController, CaptureSession, DecodeStrategy, config        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ shelfscan-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ devices   │  │ cooldown  │  │ symbology │  │   │
//! │  │   │ Device    │  │ pick/next │  │ lockout   │  │ EAN / UPC │  │   │
//! │  │   │ Result    │  │ plan      │  │ window    │  │ decoder   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO CAMERA • NO RUNTIME • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CaptureDevice, DecodeResult, ScanState, ...)
//! - [`devices`] - Preferred-device selection and cyclic switching
//! - [`constraints`] - Ordered stream-constraint fallback plan
//! - [`cooldown`] - Timed lockout that suppresses repeated detections
//! - [`frame`] - Grayscale frames handed to decoders
//! - [`symbology`] - EAN-13 / UPC-A / EAN-8 / UPC-E encode + decode
//! - [`validation`] - Manual barcode entry validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use shelfscan_core::symbology::{self, Symbology};
//! use shelfscan_core::frame::GrayFrame;
//!
//! let row = symbology::render_row("5901234123457", Symbology::Ean13, 2).unwrap();
//! let frame = GrayFrame::from_row(&row, 8);
//! let found = symbology::decode_frame(&frame, Symbology::ALL);
//! assert_eq!(found[0].text, "5901234123457");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod constraints;
pub mod cooldown;
pub mod devices;
pub mod error;
pub mod frame;
pub mod symbology;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use constraints::{ConstraintPlan, DeviceRequest, FacingMode, Resolution, StreamConstraints};
pub use cooldown::Cooldown;
pub use error::{CoreError, CoreResult, ValidationError};
pub use frame::GrayFrame;
pub use symbology::Symbology;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default quiet window after an emitted detection, in milliseconds.
pub const DEFAULT_COOLDOWN_MS: u64 = 1200;

/// Default ideal capture width requested from the camera.
pub const DEFAULT_IDEAL_WIDTH: u32 = 640;

/// Default ideal capture height requested from the camera.
pub const DEFAULT_IDEAL_HEIGHT: u32 = 480;

/// Maximum length accepted for a manually typed code.
pub const MAX_MANUAL_CODE_LEN: usize = 64;
