//! # shelfscan-capture: Camera Capture & Decode Runtime
//!
//! Everything in shelfscan that touches a camera or runs over time: stream
//! acquisition with constraint fallback, decode strategy selection, the
//! scan state machine and the events it sends to the UI.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Scan Controller Architecture                     │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 ScanController (state machine)                   │  │
//! │  │                                                                  │  │
//! │  │  Idle → Acquiring → Active → Stopping → Idle                     │  │
//! │  │  Owns the cooldown, the strategy slot and the operation lock     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ DeviceCatalog  │  │ CaptureSession │  │  DecodeStrategy        │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Enumerates     │  │ Owns the one   │  │ Native: frame tick,    │    │
//! │  │ cameras, picks │  │ open stream,   │  │ one detect in flight   │    │
//! │  │ rear-facing    │  │ torch, switch  │  │ Fallback: software     │    │
//! │  │ first          │  │ 3-step plan    │  │ engine, own cadence    │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  PLATFORM SEAMS (backend.rs, decoder.rs):                              │
//! │  • CameraBackend / MediaStream / MediaTrack - camera API               │
//! │  • VideoSink - the UI's video element                                  │
//! │  • NativeReaderFactory / NativeReader - platform barcode reader        │
//! │  • DecodeEngine - software engine (SoftwareEngine built in)            │
//! │                                                                         │
//! │  EVENTS (ScanEventEmitter):                                            │
//! │  • on_status / on_result / on_error                                    │
//! │  • on_torch_availability / on_multiple_cameras (once per start)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`backend`] - Camera, stream, track and sink traits; `VideoHandle`
//! - [`catalog`] - `DeviceCatalog`
//! - [`config`] - Scanner configuration (TOML + environment)
//! - [`controller`] - `ScanController` and its builder
//! - [`decoder`] - `DecodeStrategy`, native reader and engine traits
//! - [`engine`] - Built-in `SoftwareEngine`
//! - [`error`] - Scan error types
//! - [`events`] - Emitter trait, serializable events, channel emitter
//! - [`session`] - `CaptureSession`
//! - [`sim`] - Simulated camera, native reader and sink
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use shelfscan_capture::sim::{RecordingSink, SimulatedCamera};
//! use shelfscan_capture::{ChannelEmitter, ScanController, ScannerConfig};
//!
//! # async fn run() -> shelfscan_capture::ScanResult<()> {
//! let camera = SimulatedCamera::builder()
//!     .device("cam-back", "Back Camera", true)
//!     .build();
//! let (emitter, mut events) = ChannelEmitter::new();
//!
//! let scanner = ScanController::builder(ScannerConfig::load_or_default(None))
//!     .with_backend(Arc::new(camera))
//!     .with_sink(Arc::new(RecordingSink::new()))
//!     .with_emitter(Arc::new(emitter))
//!     .build()?;
//!
//! scanner.start().await;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! scanner.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod events;
pub mod session;
pub mod sim;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{CameraBackend, MediaStream, MediaTrack, TrackKind, VideoHandle, VideoSink};
pub use catalog::DeviceCatalog;
pub use config::{CameraSettings, DecoderSettings, ScanSettings, ScannerConfig};
pub use controller::{status, ScanController, ScanControllerBuilder};
pub use decoder::{
    DecodeEngine, DecodeStrategy, FallbackDecoder, NativeDecoder, NativeReader,
    NativeReaderFactory,
};
pub use engine::SoftwareEngine;
pub use error::{ScanError, ScanResult, ScanWarning};
pub use events::{ChannelEmitter, NoOpEmitter, RecordingEmitter, ScanEvent, ScanEventEmitter};
pub use session::{CaptureSession, SessionSettings, TorchToggle};
