//! # Scan Controller
//!
//! The state machine the UI drives.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Idle ──start()──► Acquiring ─────────────────────► Active            │
//! │    ▲                  │  enumerate                     │               │
//! │    │                  │  acquire (constraint plan)     │ results ──►   │
//! │    │                  │  probe torch, capabilities     │ cooldown ──►  │
//! │    │                  │  native? → fallback (once)     │ on_result     │
//! │    │                  │                                │               │
//! │    │     failure:     │            stop() / Stop mode  │               │
//! │    │  unwind, on_error│                                ▼               │
//! │    └──────────────────┴─────────────────────────── Stopping            │
//! │                                                 detach strategy        │
//! │                                                 release session        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! - The state lives behind a short synchronous lock, so `start()` decides
//!   "am I Idle?" and moves to Acquiring in one step. A second `start()`
//!   is a no-op.
//! - The session, the strategy slot and the result pump live behind an
//!   async operation lock, held for the whole start sequence and for every
//!   other operation that touches the camera.
//! - `stop()` cancels the running start's token before queueing on the
//!   operation lock. The start sequence checks the token after every
//!   suspension and unwinds, so when `stop()` returns no device is open.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use shelfscan_core::validation::validate_manual_code;
use shelfscan_core::{
    AfterDetection, CaptureDevice, Cooldown, DecodeResult, DecoderKind, GrayFrame, ScanState,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{CameraBackend, VideoHandle, VideoSink};
use crate::catalog::DeviceCatalog;
use crate::config::ScannerConfig;
use crate::decoder::{
    DecodeEngine, DecodeStrategy, FallbackDecoder, LoopRun, NativeDecoder, NativeReaderFactory,
};
use crate::engine::SoftwareEngine;
use crate::error::{ScanError, ScanResult, ScanWarning};
use crate::events::{NoOpEmitter, ScanEventEmitter};
use crate::session::{CaptureSession, SessionSettings, TorchToggle};

/// Buffered results between a strategy and the pump.
const RESULT_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// Status Text
// =============================================================================

/// Status lines sent through `on_status`.
pub mod status {
    pub const REQUESTING_CAMERA: &str = "Requesting camera access...";
    pub const STARTING_DECODER: &str = "Camera ready. Starting decoder...";
    pub const READY: &str = "Point the camera at a barcode.";
    pub const STOPPED: &str = "Scanning stopped.";
    pub const NOT_ACTIVE: &str = "Scanner is not active.";
    pub const SWITCHING_CAMERA: &str = "Switching camera...";
    pub const USING_SOFTWARE_DECODER: &str = "Native barcode reader unavailable, using software decoder.";
    pub const TORCH_ON: &str = "Torch on.";
    pub const TORCH_OFF: &str = "Torch off.";

    /// Status for an emitted code.
    pub fn detected(code: &str) -> String {
        format!("Code detected: {}", code)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn checkpoint(token: &CancellationToken) -> ScanResult<()> {
    if token.is_cancelled() {
        Err(ScanError::Cancelled)
    } else {
        Ok(())
    }
}

/// Runs `fut` unless `token` fires first.
async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = ScanResult<T>>,
) -> ScanResult<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ScanError::Cancelled),
        result = fut => result,
    }
}

// =============================================================================
// Internal State
// =============================================================================

struct Control {
    state: ScanState,
    start_token: CancellationToken,
}

/// Everything guarded by the operation lock.
struct Resources {
    session: CaptureSession,
    strategy: Option<DecodeStrategy>,
    devices: Vec<CaptureDevice>,
    results_tx: Option<mpsc::Sender<DecodeResult>>,
    pump: Option<LoopRun>,
}

impl Resources {
    /// Pump, then strategy, then session. Idempotent.
    async fn teardown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.shutdown().await;
        }
        if let Some(mut strategy) = self.strategy.take() {
            strategy.detach_and_stop().await;
        }
        self.results_tx = None;
        self.session.release();
        self.devices.clear();
    }
}

enum StopPlan {
    AlreadyIdle,
    JoinRunning,
    Run,
}

struct Inner {
    config: ScannerConfig,
    catalog: DeviceCatalog,
    native: Option<Arc<dyn NativeReaderFactory>>,
    engine: Arc<dyn DecodeEngine>,
    emitter: Arc<dyn ScanEventEmitter>,
    control: Mutex<Control>,
    state_tx: watch::Sender<ScanState>,
    ops: tokio::sync::Mutex<Resources>,
    cooldown: Mutex<Cooldown>,
}

impl Inner {
    fn state(&self) -> ScanState {
        lock(&self.control).state
    }

    fn publish(&self, control: &mut Control, state: ScanState) {
        control.state = state;
        self.state_tx.send_replace(state);
    }

    /// Idle → Acquiring with a fresh token, or `None` if busy.
    fn begin_start(&self) -> Option<CancellationToken> {
        let mut control = lock(&self.control);
        if control.state != ScanState::Idle {
            return None;
        }
        control.start_token = CancellationToken::new();
        let token = control.start_token.clone();
        self.publish(&mut control, ScanState::Acquiring);
        Some(token)
    }

    /// Acquiring → Active, unless `stop()` got there first.
    fn finish_start(&self, token: &CancellationToken) -> bool {
        let mut control = lock(&self.control);
        if token.is_cancelled() || control.state != ScanState::Acquiring {
            return false;
        }
        self.publish(&mut control, ScanState::Active);
        true
    }

    /// Acquiring → Idle after a failed start, unless `stop()` owns the
    /// transition.
    fn abort_start(&self, token: &CancellationToken) -> bool {
        let mut control = lock(&self.control);
        if token.is_cancelled() || control.state != ScanState::Acquiring {
            return false;
        }
        self.publish(&mut control, ScanState::Idle);
        true
    }

    /// Active → Idle after a fatal failure while running.
    fn fail_active(&self) -> bool {
        let mut control = lock(&self.control);
        if control.state != ScanState::Active {
            return false;
        }
        self.publish(&mut control, ScanState::Idle);
        true
    }

    fn begin_stop(&self) -> StopPlan {
        let mut control = lock(&self.control);
        match control.state {
            ScanState::Idle => StopPlan::AlreadyIdle,
            ScanState::Stopping => StopPlan::JoinRunning,
            ScanState::Acquiring | ScanState::Active => {
                control.start_token.cancel();
                self.publish(&mut control, ScanState::Stopping);
                StopPlan::Run
            }
        }
    }

    fn finish_stop(&self) {
        let mut control = lock(&self.control);
        self.publish(&mut control, ScanState::Idle);
    }

    /// Applies the state gate and the cooldown, then emits.
    fn deliver(&self, result: &DecodeResult) -> bool {
        if self.state() != ScanState::Active {
            trace!(code = %result.raw_value, "Result outside Active state dropped");
            return false;
        }

        let now = tokio::time::Instant::now().into_std();
        if !lock(&self.cooldown).try_acquire(now) {
            trace!(code = %result.raw_value, "Result suppressed by cooldown");
            return false;
        }

        info!(code = %result.raw_value, symbology = ?result.symbology, "Barcode detected");
        self.emitter.on_status(&status::detected(&result.raw_value));
        self.emitter.on_result(result);
        true
    }

    // =========================================================================
    // Start Sequence
    // =========================================================================

    async fn run_start(
        &self,
        res: &mut Resources,
        token: &CancellationToken,
    ) -> ScanResult<mpsc::Receiver<DecodeResult>> {
        self.emitter.on_status(status::REQUESTING_CAMERA);

        let devices = cancellable(token, self.catalog.enumerate()).await?;
        checkpoint(token)?;

        let preferred = self
            .config
            .camera
            .preferred_device_id
            .clone()
            .or_else(|| DeviceCatalog::pick_preferred(&devices).map(|d| d.id.clone()));

        let video = cancellable(
            token,
            res.session.acquire(preferred.as_deref(), self.config.quality()),
        )
        .await?;
        checkpoint(token)?;
        res.devices = devices;

        let torch = res.session.probe_torch();
        self.emitter.on_torch_availability(torch);
        self.emitter
            .on_multiple_cameras(DeviceCatalog::has_multiple(&res.devices));
        self.emitter.on_status(status::STARTING_DECODER);

        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let strategy = self.select_strategy(video, tx.clone(), token).await?;
        res.strategy = Some(strategy);
        res.results_tx = Some(tx);
        checkpoint(token)?;

        Ok(rx)
    }

    /// Native first, then exactly one fallback attempt. On error nothing
    /// is left running.
    async fn select_strategy(
        &self,
        video: VideoHandle,
        results: mpsc::Sender<DecodeResult>,
        token: &CancellationToken,
    ) -> ScanResult<DecodeStrategy> {
        if self.config.decoder.prefer_native {
            if let Some(factory) = &self.native {
                match self
                    .try_native(factory.as_ref(), video.clone(), results.clone(), token)
                    .await
                {
                    Ok(strategy) => {
                        info!(strategy = %strategy.kind(), "Decode strategy selected");
                        return Ok(strategy);
                    }
                    Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
                    Err(e) => {
                        warn!(error = %e, "Native reader unavailable, falling back to software engine");
                        self.emitter.on_status(status::USING_SOFTWARE_DECODER);
                    }
                }
                checkpoint(token)?;
            }
        }

        let init_timeout = self.config.init_timeout();
        cancellable(token, async {
            let init = match tokio::time::timeout(
                init_timeout,
                self.engine.init(&self.config.decoder.symbologies),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ScanError::Timeout {
                    operation: "Software engine init".into(),
                    millis: init_timeout.as_millis() as u64,
                }),
            };
            init.map_err(|e| e.into_decoder_init(DecoderKind::Fallback))
        })
        .await?;
        checkpoint(token)?;

        let mut strategy = DecodeStrategy::Fallback(FallbackDecoder::new(self.engine.clone()));
        if let Err(e) = strategy.attach(video, results).await {
            strategy.detach_and_stop().await;
            return Err(e);
        }

        info!(strategy = %strategy.kind(), "Decode strategy selected");
        Ok(strategy)
    }

    async fn try_native(
        &self,
        factory: &dyn NativeReaderFactory,
        video: VideoHandle,
        results: mpsc::Sender<DecodeResult>,
        token: &CancellationToken,
    ) -> ScanResult<DecodeStrategy> {
        let init_timeout = self.config.init_timeout();
        let reader = cancellable(token, async {
            match tokio::time::timeout(
                init_timeout,
                factory.create(&self.config.decoder.symbologies),
            )
            .await
            {
                Ok(reader) => reader.map_err(|e| e.into_decoder_init(DecoderKind::Native)),
                Err(_) => Err(ScanError::DecoderInit {
                    decoder: DecoderKind::Native,
                    reason: format!("timed out after {} ms", init_timeout.as_millis()),
                }),
            }
        })
        .await?;
        checkpoint(token)?;

        let mut strategy =
            DecodeStrategy::Native(NativeDecoder::new(reader, self.config.frame_interval()));
        if let Err(e) = strategy.attach(video, results).await {
            strategy.detach_and_stop().await;
            return Err(e.into_decoder_init(DecoderKind::Native));
        }
        Ok(strategy)
    }
}

/// Forwards strategy results through the cooldown to the emitter.
async fn result_pump(
    inner: Weak<Inner>,
    mut results: mpsc::Receiver<DecodeResult>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = results.recv() => match result {
                Some(result) => result,
                None => break,
            },
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.deliver(&result) {
            continue;
        }

        if inner.config.scan.after_detection == AfterDetection::Stop {
            debug!("Stopping after first detection");
            let controller = ScanController { inner };
            tokio::spawn(async move { controller.stop().await });
            break;
        }
    }
}

/// Stops the scanner if a start future is dropped before finishing.
struct StartGuard {
    controller: Option<ScanController>,
}

impl StartGuard {
    fn disarm(mut self) {
        self.controller = None;
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        let Some(controller) = self.controller.take() else {
            return;
        };
        warn!("start() dropped before completing, stopping scanner");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { controller.stop().await });
            }
            Err(_) => controller.inner.finish_stop(),
        }
    }
}

// =============================================================================
// Scan Controller
// =============================================================================

/// Cheap-to-clone handle to a scanner.
#[derive(Clone)]
pub struct ScanController {
    inner: Arc<Inner>,
}

impl ScanController {
    pub fn builder(config: ScannerConfig) -> ScanControllerBuilder {
        ScanControllerBuilder::new(config)
    }

    pub fn state(&self) -> ScanState {
        self.inner.state()
    }

    /// Watches state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.inner.state_tx.subscribe()
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.inner.config
    }

    /// Starts scanning. No-op unless Idle.
    ///
    /// The Idle → Acquiring decision is made when `start()` is called, not
    /// when the returned future is first polled, so a `stop()` issued right
    /// after spawning it always sees the start.
    pub fn start(&self) -> impl Future<Output = ()> + Send + 'static {
        let claimed = self.inner.begin_start();
        // Armed before the future exists, so dropping it unpolled still
        // undoes the claim.
        let guard = StartGuard {
            controller: claimed.as_ref().map(|_| self.clone()),
        };
        let controller = self.clone();

        async move {
            let Some(token) = claimed else {
                debug!(state = %controller.state(), "start() ignored, scanner busy");
                return;
            };
            controller.run_start(token).await;
            guard.disarm();
        }
    }

    async fn run_start(&self, token: CancellationToken) {
        let inner = &self.inner;
        let mut res = inner.ops.lock().await;
        if token.is_cancelled() {
            debug!("Start cancelled before acquisition");
            return;
        }

        info!("Scanner starting");
        match inner.run_start(&mut res, &token).await {
            Ok(results) => {
                if !inner.finish_start(&token) {
                    debug!("Start superseded by stop()");
                    res.teardown().await;
                    return;
                }

                lock(&inner.cooldown).reset();
                let cancel = token.child_token();
                let task = tokio::spawn(result_pump(
                    Arc::downgrade(inner),
                    results,
                    cancel.clone(),
                ));
                res.pump = Some(LoopRun::new(cancel, task));

                info!(
                    device_id = ?res.session.active_device_id(),
                    strategy = ?res.strategy.as_ref().map(|s| s.kind()),
                    "Scanner active"
                );
                inner.emitter.on_status(status::READY);
            }
            Err(ScanError::Cancelled) => {
                debug!("Start cancelled, unwinding");
                res.teardown().await;
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "Scanner failed to start");
                res.teardown().await;
                if inner.abort_start(&token) {
                    inner.emitter.on_error(&e);
                }
            }
        }
    }

    /// Stops scanning. Idempotent; when it returns no device is open.
    pub async fn stop(&self) {
        match self.inner.begin_stop() {
            StopPlan::AlreadyIdle => {
                debug!("stop() ignored, scanner idle");
                return;
            }
            StopPlan::JoinRunning => {
                let _res = self.inner.ops.lock().await;
                return;
            }
            StopPlan::Run => {}
        }

        info!("Scanner stopping");
        let mut res = self.inner.ops.lock().await;
        res.teardown().await;
        self.inner.finish_stop();
        drop(res);

        info!("Scanner stopped");
        self.inner.emitter.on_status(status::STOPPED);
    }

    /// Flips the torch. Returns the torch state afterwards.
    pub async fn toggle_torch(&self) -> bool {
        if self.state() != ScanState::Active {
            self.inner.emitter.on_status(status::NOT_ACTIVE);
            return false;
        }

        let mut res = self.inner.ops.lock().await;
        if self.state() != ScanState::Active {
            self.inner.emitter.on_status(status::NOT_ACTIVE);
            return false;
        }

        match res.session.toggle_torch().await {
            TorchToggle::Unsupported => {
                self.inner
                    .emitter
                    .on_status(&ScanWarning::TorchUnsupported.to_string());
                false
            }
            TorchToggle::Applied(on) => {
                self.inner
                    .emitter
                    .on_status(if on { status::TORCH_ON } else { status::TORCH_OFF });
                on
            }
            TorchToggle::Rejected { state, reason } => {
                self.inner
                    .emitter
                    .on_status(&ScanWarning::TorchApplyFailed(reason).to_string());
                state
            }
        }
    }

    /// Moves to the next camera. Silent no-op with a single camera.
    pub async fn switch_camera(&self) {
        if self.state() != ScanState::Active {
            self.inner.emitter.on_status(status::NOT_ACTIVE);
            return;
        }

        let mut res = self.inner.ops.lock().await;
        if self.state() != ScanState::Active {
            self.inner.emitter.on_status(status::NOT_ACTIVE);
            return;
        }
        if !DeviceCatalog::has_multiple(&res.devices) {
            debug!("Single camera, switch ignored");
            return;
        }
        let Some(results) = res.results_tx.clone() else {
            return;
        };
        let Some(mut strategy) = res.strategy.take() else {
            return;
        };

        // The strategy must not outlive the stream it reads
        strategy.detach_and_stop().await;
        self.inner.emitter.on_status(status::SWITCHING_CAMERA);

        let devices = res.devices.clone();
        let video = match res.session.switch_camera(&devices).await {
            Ok(Some(video)) => Ok(video),
            Ok(None) => res
                .session
                .video()
                .ok_or_else(|| ScanError::Stream("no stream after switch".into())),
            Err(e) => Err(e),
        };
        let attached = match video {
            Ok(video) => {
                res.session.probe_torch();
                strategy.attach(video, results).await
            }
            Err(e) => Err(e),
        };

        match attached {
            Ok(()) => {
                info!(device_id = ?res.session.active_device_id(), "Camera switched");
                res.strategy = Some(strategy);
                self.inner.emitter.on_status(status::READY);
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "Camera switch failed");
                strategy.detach_and_stop().await;
                res.teardown().await;
                if self.inner.fail_active() {
                    self.inner.emitter.on_error(&e);
                }
            }
        }
    }

    /// Accepts a barcode typed by hand. Bypasses the cooldown.
    pub async fn submit_manual(&self, input: &str) -> ScanResult<DecodeResult> {
        let code = validate_manual_code(input)?;
        let result = DecodeResult::new(code, None, Utc::now());

        info!(code = %result.raw_value, "Barcode entered manually");
        self.inner.emitter.on_result(&result);

        if self.inner.config.scan.after_detection == AfterDetection::Stop && self.state().is_busy() {
            self.stop().await;
        }
        Ok(result)
    }

    /// The frame currently on display, while Active.
    pub async fn snapshot(&self) -> Option<GrayFrame> {
        if self.state() != ScanState::Active {
            return None;
        }
        let res = self.inner.ops.lock().await;
        res.session.video().and_then(|video| video.latest_frame())
    }

    /// Device id of the open camera, if any.
    pub async fn active_device_id(&self) -> Option<String> {
        let res = self.inner.ops.lock().await;
        res.session.active_device_id().map(str::to_string)
    }

    /// Kind of the running decode strategy, if any.
    pub async fn decoder_kind(&self) -> Option<DecoderKind> {
        let res = self.inner.ops.lock().await;
        res.strategy.as_ref().map(|s| s.kind())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for creating a ScanController.
pub struct ScanControllerBuilder {
    config: ScannerConfig,
    backend: Option<Arc<dyn CameraBackend>>,
    sink: Option<Arc<dyn VideoSink>>,
    native: Option<Arc<dyn NativeReaderFactory>>,
    engine: Option<Arc<dyn DecodeEngine>>,
    emitter: Option<Arc<dyn ScanEventEmitter>>,
}

impl ScanControllerBuilder {
    pub fn new(config: ScannerConfig) -> Self {
        ScanControllerBuilder {
            config,
            backend: None,
            sink: None,
            native: None,
            engine: None,
            emitter: None,
        }
    }

    /// Sets the platform camera API.
    pub fn with_backend(mut self, backend: Arc<dyn CameraBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the video element the stream is shown in.
    pub fn with_sink(mut self, sink: Arc<dyn VideoSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the platform barcode reader. Without one the software engine
    /// is always used.
    pub fn with_native_reader(mut self, factory: Arc<dyn NativeReaderFactory>) -> Self {
        self.native = Some(factory);
        self
    }

    /// Replaces the built-in software engine.
    pub fn with_engine(mut self, engine: Arc<dyn DecodeEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn ScanEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the ScanController.
    pub fn build(self) -> ScanResult<ScanController> {
        self.config.validate()?;

        let backend = self
            .backend
            .ok_or_else(|| ScanError::InvalidConfig("Camera backend required".into()))?;
        let sink = self
            .sink
            .ok_or_else(|| ScanError::InvalidConfig("Video sink required".into()))?;

        let config = self.config;
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(SoftwareEngine::new(config.engine_interval())));
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        let session = CaptureSession::new(backend.clone(), sink, SessionSettings::from(&config));
        let (state_tx, _) = watch::channel(ScanState::Idle);

        Ok(ScanController {
            inner: Arc::new(Inner {
                catalog: DeviceCatalog::new(backend, config.acquire_timeout()),
                cooldown: Mutex::new(Cooldown::new(config.cooldown())),
                native: self.native,
                engine,
                emitter,
                control: Mutex::new(Control {
                    state: ScanState::Idle,
                    start_token: CancellationToken::new(),
                }),
                state_tx,
                ops: tokio::sync::Mutex::new(Resources {
                    session,
                    strategy: None,
                    devices: Vec::new(),
                    results_tx: None,
                    pump: None,
                }),
                config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RecordingEmitter, ScanEvent};
    use crate::sim::{RecordingSink, SimulatedCamera, SimulatedNativeReaderFactory};
    use async_trait::async_trait;
    use shelfscan_core::{DeviceRequest, Symbology};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Software engine that counts inits and can be told to fail them.
    struct CountingEngine {
        inner: SoftwareEngine,
        inits: AtomicUsize,
        fail: AtomicBool,
        init_delay: Duration,
    }

    impl CountingEngine {
        fn new() -> Self {
            CountingEngine {
                inner: SoftwareEngine::new(Duration::from_millis(100)),
                inits: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                init_delay: Duration::ZERO,
            }
        }

        fn with_init_delay(mut self, delay: Duration) -> Self {
            self.init_delay = delay;
            self
        }
    }

    #[async_trait]
    impl DecodeEngine for CountingEngine {
        async fn init(&self, symbologies: &[shelfscan_core::Symbology]) -> ScanResult<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if !self.init_delay.is_zero() {
                tokio::time::sleep(self.init_delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ScanError::DecoderInit {
                    decoder: DecoderKind::Fallback,
                    reason: "engine failed to load".into(),
                });
            }
            self.inner.init(symbologies).await
        }

        async fn start(&self, video: VideoHandle, results: mpsc::Sender<DecodeResult>) -> ScanResult<()> {
            self.inner.start(video, results).await
        }

        async fn stop(&self) {
            self.inner.stop().await
        }
    }

    struct Harness {
        camera: SimulatedCamera,
        native: SimulatedNativeReaderFactory,
        engine: Arc<CountingEngine>,
        emitter: Arc<RecordingEmitter>,
        controller: ScanController,
    }

    fn two_cameras() -> SimulatedCamera {
        SimulatedCamera::builder()
            .device("cam-front", "Front Camera", false)
            .device("cam-back", "Back Camera", true)
            .build()
    }

    fn harness_with(config: ScannerConfig, camera: SimulatedCamera) -> Harness {
        let native = SimulatedNativeReaderFactory::new();
        let engine = Arc::new(CountingEngine::new());
        let emitter = Arc::new(RecordingEmitter::new());
        let controller = ScanController::builder(config)
            .with_backend(Arc::new(camera.clone()))
            .with_sink(Arc::new(RecordingSink::new()))
            .with_native_reader(Arc::new(native.clone()))
            .with_engine(engine.clone())
            .with_emitter(emitter.clone())
            .build()
            .unwrap();
        Harness {
            camera,
            native,
            engine,
            emitter,
            controller,
        }
    }

    fn harness() -> Harness {
        harness_with(ScannerConfig::default(), two_cameras())
    }

    #[test]
    fn test_builder_requires_backend_and_sink() {
        let err = ScanController::builder(ScannerConfig::default())
            .build()
            .err()
            .unwrap();
        assert!(err.is_config_error());

        let mut config = ScannerConfig::default();
        config.decoder.symbologies.clear();
        assert!(ScanController::builder(config)
            .with_backend(Arc::new(two_cameras()))
            .with_sink(Arc::new(RecordingSink::new()))
            .build()
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let h = harness();
        h.controller.start().await;

        assert_eq!(h.controller.state(), ScanState::Active);
        assert_eq!(h.camera.live_handles(), 1);
        assert_eq!(h.controller.decoder_kind().await, Some(DecoderKind::Native));
        assert_eq!(
            h.controller.active_device_id().await.as_deref(),
            Some("cam-back")
        );

        let events = h.emitter.events();
        assert_eq!(
            events,
            vec![
                ScanEvent::Status {
                    text: status::REQUESTING_CAMERA.into()
                },
                ScanEvent::TorchAvailability { available: true },
                ScanEvent::MultipleCameras { multiple: true },
                ScanEvent::Status {
                    text: status::STARTING_DECODER.into()
                },
                ScanEvent::Status {
                    text: status::READY.into()
                },
            ]
        );

        h.controller.stop().await;
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.camera.live_handles(), 0);
        assert_eq!(
            h.emitter.statuses().last().map(String::as_str),
            Some(status::STOPPED)
        );

        // Idempotent
        h.emitter.clear();
        h.controller.stop().await;
        assert!(h.emitter.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_start_opens_one_handle() {
        let camera = SimulatedCamera::builder()
            .device("cam-back", "Back Camera", true)
            .open_delay(Duration::from_millis(200))
            .build();
        let h = harness_with(ScannerConfig::default(), camera);

        let first = tokio::spawn(h.controller.start());
        let second = tokio::spawn(h.controller.start());
        assert_eq!(h.controller.state(), ScanState::Acquiring);
        first.await.unwrap();
        second.await.unwrap();
        h.controller.start().await;

        assert_eq!(h.controller.state(), ScanState::Active);
        assert_eq!(h.camera.open_count(), 1);
        assert_eq!(h.camera.live_handles(), 1);

        h.controller.stop().await;
        assert_eq!(h.camera.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_right_after_spawning_start() {
        let h = harness();

        let start = tokio::spawn(h.controller.start());
        h.controller.stop().await;
        assert_eq!(h.controller.state(), ScanState::Idle);
        start.await.unwrap();

        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.camera.live_handles(), 0);
        assert_eq!(h.camera.open_count(), 0);
        assert!(h.emitter.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_unpolled_start_returns_to_idle() {
        let h = harness();

        drop(h.controller.start());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.camera.open_count(), 0);

        h.controller.start().await;
        assert_eq!(h.controller.state(), ScanState::Active);
        assert_eq!(h.camera.live_handles(), 1);

        h.controller.stop().await;
        assert_eq!(h.camera.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_decoder_init() {
        let camera = two_cameras();
        let engine = Arc::new(CountingEngine::new().with_init_delay(Duration::from_millis(2000)));
        let emitter = Arc::new(RecordingEmitter::new());
        let controller = ScanController::builder(ScannerConfig::default())
            .with_backend(Arc::new(camera.clone()))
            .with_sink(Arc::new(RecordingSink::new()))
            .with_engine(engine.clone())
            .with_emitter(emitter.clone())
            .build()
            .unwrap();

        let start = tokio::spawn(controller.start());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.inits.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), ScanState::Acquiring);
        assert_eq!(camera.live_handles(), 1);

        let begun = tokio::time::Instant::now();
        controller.stop().await;
        assert!(begun.elapsed() < Duration::from_millis(2000));
        assert_eq!(controller.state(), ScanState::Idle);
        assert_eq!(camera.live_handles(), 0);

        start.await.unwrap();
        assert_eq!(controller.state(), ScanState::Idle);
        assert_eq!(controller.decoder_kind().await, None);
        assert!(emitter.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_acquisition() {
        let camera = SimulatedCamera::builder()
            .device("cam-back", "Back Camera", true)
            .open_delay(Duration::from_millis(500))
            .build();
        let h = harness_with(ScannerConfig::default(), camera);

        let start = tokio::spawn(h.controller.start());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.controller.state(), ScanState::Acquiring);

        h.controller.stop().await;
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.camera.live_handles(), 0);

        start.await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.camera.live_handles(), 0);
        assert!(h.emitter.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_reports_once() {
        let h = harness();
        h.camera.deny_permission(true);

        h.controller.start().await;
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.emitter.errors(), vec!["permission_denied"]);
        assert_eq!(h.camera.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_unavailable_after_all_attempts() {
        let mut config = ScannerConfig::default();
        config.camera.preferred_device_id = Some("cam-front".into());
        let h = harness_with(config, two_cameras());
        h.camera.fail_all(true);

        h.controller.start().await;
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.emitter.errors(), vec!["camera_unavailable"]);

        let attempts = h.camera.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].device, DeviceRequest::ExactId("cam-front".into()));
        assert!(matches!(attempts[1].device, DeviceRequest::RearFacing(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_failure_falls_back_once() {
        let h = harness();
        h.native.fail_init(true);
        h.camera.show_code("5901234123457", Symbology::Ean13).unwrap();

        h.controller.start().await;
        assert_eq!(h.controller.state(), ScanState::Active);
        assert_eq!(h.native.init_calls(), 1);
        assert_eq!(h.engine.inits.load(Ordering::SeqCst), 1);
        assert_eq!(h.controller.decoder_kind().await, Some(DecoderKind::Fallback));
        assert!(h
            .emitter
            .statuses()
            .contains(&status::USING_SOFTWARE_DECODER.to_string()));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let results = h.emitter.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].raw_value, "5901234123457");

        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_failure_is_fatal() {
        let h = harness();
        h.native.fail_init(true);
        h.engine.fail.store(true, Ordering::SeqCst);

        h.controller.start().await;
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.engine.inits.load(Ordering::SeqCst), 1);
        assert_eq!(h.emitter.errors(), vec!["decoder_init"]);
        assert_eq!(h.camera.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_native_reader_uses_engine() {
        let camera = two_cameras();
        let engine = Arc::new(CountingEngine::new());
        let controller = ScanController::builder(ScannerConfig::default())
            .with_backend(Arc::new(camera.clone()))
            .with_sink(Arc::new(RecordingSink::new()))
            .with_engine(engine.clone())
            .build()
            .unwrap();

        controller.start().await;
        assert_eq!(controller.decoder_kind().await, Some(DecoderKind::Fallback));
        controller.stop().await;
        assert_eq!(camera.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_suppresses_repeats() {
        let h = harness();
        h.camera.show_code("5901234123457", Symbology::Ean13).unwrap();

        h.controller.start().await;
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.emitter.results().len(), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(h.emitter.results().len(), 2);
        assert!(h
            .emitter
            .statuses()
            .contains(&status::detected("5901234123457")));

        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_detection() {
        let mut config = ScannerConfig::default();
        config.scan.after_detection = AfterDetection::Stop;
        let h = harness_with(config, two_cameras());
        h.camera.show_code("96385074", Symbology::Ean8).unwrap();

        h.controller.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(h.emitter.results().len(), 1);
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.camera.live_handles(), 0);
        assert_eq!(
            h.emitter.statuses().last().map(String::as_str),
            Some(status::STOPPED)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_camera_single_device_is_silent() {
        let camera = SimulatedCamera::builder()
            .device("cam-0", "Integrated Webcam", false)
            .build();
        let h = harness_with(ScannerConfig::default(), camera);

        h.controller.start().await;
        h.emitter.clear();
        h.controller.switch_camera().await;

        assert!(h.emitter.events().is_empty());
        assert_eq!(h.controller.state(), ScanState::Active);
        assert_eq!(h.camera.open_count(), 1);
        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_camera_cycles_and_keeps_decoding() {
        let h = harness();
        h.controller.start().await;
        assert_eq!(
            h.controller.active_device_id().await.as_deref(),
            Some("cam-back")
        );

        h.controller.switch_camera().await;
        assert_eq!(h.controller.state(), ScanState::Active);
        assert_eq!(
            h.controller.active_device_id().await.as_deref(),
            Some("cam-front")
        );
        assert_eq!(h.camera.live_handles(), 1);

        h.camera.show_code("5901234123457", Symbology::Ean13).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.emitter.results().len(), 1);

        h.controller.stop().await;
        assert_eq!(h.camera.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_torch() {
        let h = harness();

        // Not active
        assert!(!h.controller.toggle_torch().await);
        assert_eq!(h.emitter.statuses(), vec![status::NOT_ACTIVE]);

        h.controller.start().await;
        assert!(h.controller.toggle_torch().await);
        assert!(h.camera.torch_lit());
        assert!(!h.controller.toggle_torch().await);

        // Front camera has no torch
        h.controller.switch_camera().await;
        assert!(!h.controller.toggle_torch().await);
        assert_eq!(
            h.emitter.statuses().last(),
            Some(&ScanWarning::TorchUnsupported.to_string())
        );
        assert_eq!(h.controller.state(), ScanState::Active);

        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_torch_rejection_is_a_warning() {
        let h = harness();
        h.controller.start().await;
        h.camera.reject_torch(true);

        assert!(!h.controller.toggle_torch().await);
        assert_eq!(h.controller.state(), ScanState::Active);
        assert!(h.emitter.errors().is_empty());
        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_manual() {
        let h = harness();

        let result = h.controller.submit_manual(" 5901234123457 ").await.unwrap();
        assert_eq!(result.raw_value, "5901234123457");
        assert_eq!(result.symbology, None);
        assert_eq!(h.emitter.results().len(), 1);

        let err = h.controller.submit_manual("   ").await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(h.emitter.results().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_manual_stops_in_stop_mode() {
        let mut config = ScannerConfig::default();
        config.scan.after_detection = AfterDetection::Stop;
        let h = harness_with(config, two_cameras());

        h.controller.start().await;
        h.controller.submit_manual("SKU-0042").await.unwrap();
        assert_eq!(h.controller.state(), ScanState::Idle);
        assert_eq!(h.camera.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_only_while_active() {
        let h = harness();
        assert!(h.controller.snapshot().await.is_none());

        h.camera.show_code("96385074", Symbology::Ean8).unwrap();
        h.controller.start().await;
        let frame = h.controller.snapshot().await.unwrap();
        assert_eq!(
            shelfscan_core::symbology::decode_frame(&frame, Symbology::ALL)[0].text,
            "96385074"
        );

        h.controller.stop().await;
        assert!(h.controller.snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_subscription() {
        let h = harness();
        let mut states = h.controller.subscribe();
        assert_eq!(*states.borrow(), ScanState::Idle);

        h.controller.start().await;
        assert_eq!(*states.borrow_and_update(), ScanState::Active);

        h.controller.stop().await;
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ScanState::Idle);
    }
}
