//! # Simulated Camera
//!
//! In-process stand-ins for the platform: a camera backend that "films" a
//! rendered barcode, a native reader built on the software decoder, and a
//! headless video sink. The demo app runs on these, and so do the tests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SimulatedCamera                                                        │
//! │   • devices (id, label, torch)         • scene: show_code / show_blank │
//! │   • deny_permission / fail_* / hang    • stall_frames (no first frame) │
//! │   • live_handles(): open device count  • attempts(): constraints tried │
//! │                                                                         │
//! │  SimulatedNativeReaderFactory          RecordingSink                    │
//! │   • fail_init knob                      • attach/clear counters        │
//! │   • detect delay, max in-flight         • currently attached handle    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use shelfscan_core::symbology::{decode_frame, render_row, Barcode};
use shelfscan_core::{
    CaptureDevice, CoreResult, DecoderKind, DeviceRequest, FacingMode, GrayFrame,
    StreamConstraints, Symbology,
};
use tracing::debug;

use crate::backend::{CameraBackend, MediaStream, MediaTrack, TrackKind, VideoHandle, VideoSink};
use crate::decoder::{NativeReader, NativeReaderFactory};
use crate::error::{ScanError, ScanResult};

const SCENE_HEIGHT: u32 = 48;
const MODULE_PX: usize = 3;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Simulated Camera
// =============================================================================

#[derive(Debug, Clone)]
struct SimDevice {
    info: CaptureDevice,
    torch: bool,
}

struct SimState {
    devices: Vec<SimDevice>,
    frame_interval: Duration,
    open_delay: Duration,
    scene: Mutex<GrayFrame>,
    attempts: Mutex<Vec<StreamConstraints>>,
    deny_permission: AtomicBool,
    fail_exact_id: AtomicBool,
    hang_exact_id: AtomicBool,
    fail_resolution: AtomicBool,
    fail_all: AtomicBool,
    reject_torch: AtomicBool,
    stall_frames: AtomicBool,
    torch_lit: AtomicBool,
    live_handles: AtomicUsize,
    open_count: AtomicUsize,
}

/// Builder for [`SimulatedCamera`].
pub struct SimulatedCameraBuilder {
    devices: Vec<SimDevice>,
    frame_interval: Duration,
    open_delay: Duration,
}

impl SimulatedCameraBuilder {
    /// Adds a device. Facing is inferred from the label, as on a real
    /// platform.
    pub fn device(mut self, id: &str, label: &str, torch: bool) -> Self {
        self.devices.push(SimDevice {
            info: CaptureDevice::new(id, label),
            torch,
        });
        self
    }

    /// Delay between delivered frames (default ~30 fps).
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// How long each `open_stream` takes, e.g. a permission prompt.
    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn build(self) -> SimulatedCamera {
        SimulatedCamera {
            state: Arc::new(SimState {
                devices: self.devices,
                frame_interval: self.frame_interval,
                open_delay: self.open_delay,
                scene: Mutex::new(blank_scene()),
                attempts: Mutex::new(Vec::new()),
                deny_permission: AtomicBool::new(false),
                fail_exact_id: AtomicBool::new(false),
                hang_exact_id: AtomicBool::new(false),
                fail_resolution: AtomicBool::new(false),
                fail_all: AtomicBool::new(false),
                reject_torch: AtomicBool::new(false),
                stall_frames: AtomicBool::new(false),
                torch_lit: AtomicBool::new(false),
                live_handles: AtomicUsize::new(0),
                open_count: AtomicUsize::new(0),
            }),
        }
    }
}

fn blank_scene() -> GrayFrame {
    GrayFrame::blank(320, SCENE_HEIGHT, 200)
}

/// A camera backend that films whatever scene it is told to show.
#[derive(Clone)]
pub struct SimulatedCamera {
    state: Arc<SimState>,
}

impl SimulatedCamera {
    pub fn builder() -> SimulatedCameraBuilder {
        SimulatedCameraBuilder {
            devices: Vec::new(),
            frame_interval: Duration::from_millis(33),
            open_delay: Duration::ZERO,
        }
    }

    // =========================================================================
    // Scene
    // =========================================================================

    /// Puts a barcode in front of every camera.
    pub fn show_code(&self, payload: &str, symbology: Symbology) -> CoreResult<()> {
        let row = render_row(payload, symbology, MODULE_PX)?;
        *lock(&self.state.scene) = GrayFrame::from_row(&row, SCENE_HEIGHT);
        Ok(())
    }

    /// Points every camera at an empty shelf.
    pub fn show_blank(&self) {
        *lock(&self.state.scene) = blank_scene();
    }

    // =========================================================================
    // Failure Knobs
    // =========================================================================

    /// Refuse enumeration and every stream open with `PermissionDenied`.
    pub fn deny_permission(&self, deny: bool) {
        self.state.deny_permission.store(deny, Ordering::SeqCst);
    }

    /// Reject exact-device constraints.
    pub fn fail_exact_id(&self, fail: bool) {
        self.state.fail_exact_id.store(fail, Ordering::SeqCst);
    }

    /// Exact-device opens never complete.
    pub fn hang_exact_id(&self, hang: bool) {
        self.state.hang_exact_id.store(hang, Ordering::SeqCst);
    }

    /// Reject any constraint set carrying a resolution hint.
    pub fn fail_resolution(&self, fail: bool) {
        self.state.fail_resolution.store(fail, Ordering::SeqCst);
    }

    /// Reject every constraint set.
    pub fn fail_all(&self, fail: bool) {
        self.state.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Torch-capable tracks refuse the torch constraint.
    pub fn reject_torch(&self, reject: bool) {
        self.state.reject_torch.store(reject, Ordering::SeqCst);
    }

    /// Opened streams never deliver a frame.
    pub fn stall_frames(&self, stall: bool) {
        self.state.stall_frames.store(stall, Ordering::SeqCst);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Streams opened and not yet fully stopped.
    pub fn live_handles(&self) -> usize {
        self.state.live_handles.load(Ordering::SeqCst)
    }

    /// Streams successfully opened so far.
    pub fn open_count(&self) -> usize {
        self.state.open_count.load(Ordering::SeqCst)
    }

    /// Every constraint set passed to `open_stream`, in order.
    pub fn attempts(&self) -> Vec<StreamConstraints> {
        lock(&self.state.attempts).clone()
    }

    pub fn torch_lit(&self) -> bool {
        self.state.torch_lit.load(Ordering::SeqCst)
    }

    fn resolve(&self, constraints: &StreamConstraints) -> ScanResult<SimDevice> {
        let state = &self.state;
        let rejected = |reason: &str| ScanError::Constraint {
            constraints: constraints.to_string(),
            reason: reason.to_string(),
        };

        if state.fail_all.load(Ordering::SeqCst) {
            return Err(rejected("no device satisfies the constraints"));
        }
        if constraints.resolution.is_some() && state.fail_resolution.load(Ordering::SeqCst) {
            return Err(rejected("resolution not supported"));
        }

        let found = match &constraints.device {
            DeviceRequest::ExactId(id) => {
                if state.fail_exact_id.load(Ordering::SeqCst) {
                    return Err(rejected("device id rejected"));
                }
                state
                    .devices
                    .iter()
                    .find(|d| &d.info.id == id)
                    .ok_or_else(|| ScanError::DeviceNotFound(id.clone()))?
            }
            DeviceRequest::RearFacing(FacingMode::Exact) => state
                .devices
                .iter()
                .find(|d| d.info.is_rear_facing)
                .ok_or_else(|| rejected("no rear-facing camera"))?,
            DeviceRequest::RearFacing(FacingMode::Ideal) => state
                .devices
                .iter()
                .find(|d| d.info.is_rear_facing)
                .or_else(|| state.devices.first())
                .ok_or_else(|| ScanError::DeviceNotFound("no camera connected".into()))?,
        };
        Ok(found.clone())
    }
}

#[async_trait]
impl CameraBackend for SimulatedCamera {
    async fn enumerate_devices(&self) -> ScanResult<Vec<CaptureDevice>> {
        if self.state.deny_permission.load(Ordering::SeqCst) {
            return Err(ScanError::PermissionDenied(
                "camera access denied by user".into(),
            ));
        }
        Ok(self.state.devices.iter().map(|d| d.info.clone()).collect())
    }

    async fn open_stream(&self, constraints: &StreamConstraints) -> ScanResult<Box<dyn MediaStream>> {
        lock(&self.state.attempts).push(constraints.clone());

        if !self.state.open_delay.is_zero() {
            tokio::time::sleep(self.state.open_delay).await;
        }

        if self.state.deny_permission.load(Ordering::SeqCst) {
            return Err(ScanError::PermissionDenied(
                "camera access denied by user".into(),
            ));
        }

        if matches!(constraints.device, DeviceRequest::ExactId(_))
            && self.state.hang_exact_id.load(Ordering::SeqCst)
        {
            std::future::pending::<()>().await;
        }

        let device = self.resolve(constraints)?;

        // Nothing below awaits, so a dropped open never leaks a handle.
        self.state.live_handles.fetch_add(1, Ordering::SeqCst);
        self.state.open_count.fetch_add(1, Ordering::SeqCst);
        debug!(device_id = %device.info.id, %constraints, "Simulated stream opened");

        Ok(Box::new(SimStream::new(self.state.clone(), device)))
    }
}

// =============================================================================
// Simulated Stream
// =============================================================================

struct SimStream {
    device_id: String,
    video: Arc<SimTrack>,
    state: Arc<SimState>,
}

impl SimStream {
    fn new(state: Arc<SimState>, device: SimDevice) -> Self {
        let handle = Arc::new(SimHandle {
            state: state.clone(),
            live_tracks: AtomicUsize::new(1),
        });
        SimStream {
            device_id: device.info.id,
            video: Arc::new(SimTrack {
                label: device.info.label,
                torch_capable: device.torch,
                live: AtomicBool::new(true),
                handle,
            }),
            state,
        }
    }

    fn is_live(&self) -> bool {
        self.video.live.load(Ordering::SeqCst)
    }

    fn is_stalled(&self) -> bool {
        self.state.stall_frames.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaStream for SimStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        vec![self.video.clone() as Arc<dyn MediaTrack>]
    }

    async fn next_frame(&self) -> ScanResult<GrayFrame> {
        loop {
            if !self.is_live() {
                return Err(ScanError::Stream("stream has ended".into()));
            }
            tokio::time::sleep(self.state.frame_interval).await;
            if !self.is_live() {
                return Err(ScanError::Stream("stream has ended".into()));
            }
            if !self.is_stalled() {
                return Ok(lock(&self.state.scene).clone());
            }
        }
    }

    fn latest_frame(&self) -> Option<GrayFrame> {
        if self.is_live() && !self.is_stalled() {
            Some(lock(&self.state.scene).clone())
        } else {
            None
        }
    }
}

/// Device handle shared by a stream's tracks.
struct SimHandle {
    state: Arc<SimState>,
    live_tracks: AtomicUsize,
}

struct SimTrack {
    label: String,
    torch_capable: bool,
    live: AtomicBool,
    handle: Arc<SimHandle>,
}

#[async_trait]
impl MediaTrack for SimTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn supports_torch(&self) -> bool {
        self.torch_capable
    }

    async fn apply_torch(&self, on: bool) -> ScanResult<()> {
        let state = &self.handle.state;
        if !self.torch_capable {
            return Err(ScanError::TorchApply("torch not supported".into()));
        }
        if state.reject_torch.load(Ordering::SeqCst) {
            return Err(ScanError::TorchApply(
                "constraint rejected by device".into(),
            ));
        }
        state.torch_lit.store(on, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst)
            && self.handle.live_tracks.fetch_sub(1, Ordering::SeqCst) == 1
        {
            let state = &self.handle.state;
            state.torch_lit.store(false, Ordering::SeqCst);
            state.live_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Simulated Native Reader
// =============================================================================

#[derive(Default)]
struct ReaderCounters {
    init_calls: AtomicUsize,
    detect_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A platform barcode reader backed by the software decoder.
#[derive(Clone, Default)]
pub struct SimulatedNativeReaderFactory {
    fail_init: Arc<AtomicBool>,
    detect_delay: Duration,
    counters: Arc<ReaderCounters>,
}

impl SimulatedNativeReaderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each detect call takes this long.
    pub fn with_detect_delay(mut self, delay: Duration) -> Self {
        self.detect_delay = delay;
        self
    }

    /// Make `create` fail as if the platform lacked a reader.
    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn init_calls(&self) -> usize {
        self.counters.init_calls.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.counters.detect_calls.load(Ordering::SeqCst)
    }

    /// Highest number of detect calls ever outstanding at once.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NativeReaderFactory for SimulatedNativeReaderFactory {
    async fn create(&self, symbologies: &[Symbology]) -> ScanResult<Arc<dyn NativeReader>> {
        self.counters.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(ScanError::DecoderInit {
                decoder: DecoderKind::Native,
                reason: "barcode detector not supported".into(),
            });
        }
        Ok(Arc::new(SimulatedNativeReader {
            symbologies: symbologies.to_vec(),
            detect_delay: self.detect_delay,
            counters: self.counters.clone(),
        }))
    }
}

struct SimulatedNativeReader {
    symbologies: Vec<Symbology>,
    detect_delay: Duration,
    counters: Arc<ReaderCounters>,
}

/// Decrements the in-flight count even if the detect future is dropped.
struct InFlight<'a>(&'a ReaderCounters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a ReaderCounters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NativeReader for SimulatedNativeReader {
    async fn detect(&self, frame: &GrayFrame) -> ScanResult<Vec<Barcode>> {
        self.counters.detect_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.counters);
        if !self.detect_delay.is_zero() {
            tokio::time::sleep(self.detect_delay).await;
        }
        Ok(decode_frame(frame, &self.symbologies))
    }
}

// =============================================================================
// Recording Sink
// =============================================================================

/// A headless video element that remembers what it was shown.
#[derive(Default)]
pub struct RecordingSink {
    current: Mutex<Option<VideoHandle>>,
    attaches: AtomicUsize,
    clears: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device id of the stream on display.
    pub fn attached_device(&self) -> Option<String> {
        lock(&self.current)
            .as_ref()
            .map(|video| video.device_id().to_string())
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl VideoSink for RecordingSink {
    fn attach(&self, video: VideoHandle) {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        *lock(&self.current) = Some(video);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        lock(&self.current).take();
    }
}
