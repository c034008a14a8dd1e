//! # Decode Strategies
//!
//! Turns video into barcode results. Exactly one strategy runs per
//! session, picked once at `start()`:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DecodeStrategy                                  │
//! │                                                                         │
//! │  Native(NativeDecoder)                  Fallback(FallbackDecoder)       │
//! │  ─────────────────────                  ─────────────────────────       │
//! │  platform reader, driven here:          software engine, drives itself: │
//! │                                                                         │
//! │   interval(16ms, Skip) ──tick──►         engine.init(symbologies)       │
//! │     previous attempt pending?            engine.start(video, tx)        │
//! │       yes → skip tick                    ... engine's own cadence ...   │
//! │       no  → spawn detect(latest frame)   engine.stop()                  │
//! │                 │                                                        │
//! │                 ▼                                                        │
//! │        results_tx.send(DecodeResult)  ◄── same channel ──►              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-frame misses and detect errors are dropped silently (trace only).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shelfscan_core::symbology::Barcode;
use shelfscan_core::{DecodeResult, DecoderKind, GrayFrame, Symbology};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::backend::VideoHandle;
use crate::error::{ScanError, ScanResult, ScanWarning};

// =============================================================================
// Platform Seams
// =============================================================================

/// Creates the platform barcode reader, if the platform has one.
#[async_trait]
pub trait NativeReaderFactory: Send + Sync {
    /// Fails with `DecoderInit` when the reader is missing or refuses the
    /// requested symbologies.
    async fn create(&self, symbologies: &[Symbology]) -> ScanResult<Arc<dyn NativeReader>>;
}

/// A platform barcode reader.
#[async_trait]
pub trait NativeReader: Send + Sync {
    /// Detects barcodes in one frame. An empty list is a miss.
    async fn detect(&self, frame: &GrayFrame) -> ScanResult<Vec<Barcode>>;
}

/// A software decoding engine that binds to a video source and runs at
/// its own cadence.
#[async_trait]
pub trait DecodeEngine: Send + Sync {
    async fn init(&self, symbologies: &[Symbology]) -> ScanResult<()>;

    /// Starts decoding `video`, sending every read on `results`.
    async fn start(&self, video: VideoHandle, results: mpsc::Sender<DecodeResult>) -> ScanResult<()>;

    /// Stops decoding. Returns once no more results will be sent.
    async fn stop(&self);
}

// =============================================================================
// Loop Runs
// =============================================================================

/// A spawned loop and the token that stops it.
pub(crate) struct LoopRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopRun {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        LoopRun { cancel, task }
    }

    /// Cancels the loop and waits for it to finish.
    pub(crate) async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            if e.is_panic() {
                tracing::error!(error = %e, "Loop task panicked");
            }
        }
    }
}

impl Drop for LoopRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Native Decoder
// =============================================================================

/// Drives a platform reader from a frame tick.
pub struct NativeDecoder {
    reader: Arc<dyn NativeReader>,
    frame_interval: Duration,
    run: Option<LoopRun>,
}

impl NativeDecoder {
    pub fn new(reader: Arc<dyn NativeReader>, frame_interval: Duration) -> Self {
        NativeDecoder {
            reader,
            frame_interval,
            run: None,
        }
    }

    async fn attach(&mut self, video: VideoHandle, results: mpsc::Sender<DecodeResult>) -> ScanResult<()> {
        if self.run.is_some() {
            return Err(ScanError::DecoderInit {
                decoder: DecoderKind::Native,
                reason: "already attached".into(),
            });
        }
        if !video.is_live() {
            return Err(ScanError::DecoderInit {
                decoder: DecoderKind::Native,
                reason: "video stream is not live".into(),
            });
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(frame_loop(
            self.reader.clone(),
            video,
            results,
            self.frame_interval,
            cancel.clone(),
        ));
        self.run = Some(LoopRun::new(cancel, task));

        debug!(interval_ms = self.frame_interval.as_millis() as u64, "Native frame loop started");
        Ok(())
    }

    async fn detach_and_stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.shutdown().await;
            debug!("Native frame loop stopped");
        }
    }
}

/// Sample-and-detect on every tick, never more than one detect outstanding.
async fn frame_loop(
    reader: Arc<dyn NativeReader>,
    video: VideoHandle,
    results: mpsc::Sender<DecodeResult>,
    frame_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut attempt: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if attempt.as_ref().is_some_and(|h| !h.is_finished()) {
            trace!("Detection still in flight, skipping tick");
            continue;
        }

        let Some(frame) = video.latest_frame() else {
            trace!("No frame on display yet");
            continue;
        };

        let reader = reader.clone();
        let results = results.clone();
        attempt = Some(tokio::spawn(async move {
            match reader.detect(&frame).await {
                Ok(codes) if codes.is_empty() => trace!("{}", ScanWarning::PerFrameMiss),
                Ok(codes) => {
                    for code in codes {
                        let result = DecodeResult::new(code.text, Some(code.symbology), Utc::now());
                        if results.send(result).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => trace!(error = %e, "Detection failed"),
            }
        }));
    }

    // No detection may outlive the loop.
    if let Some(handle) = attempt {
        handle.abort();
        let _ = handle.await;
    }
}

// =============================================================================
// Fallback Decoder
// =============================================================================

/// Binds a software engine to the video source.
pub struct FallbackDecoder {
    engine: Arc<dyn DecodeEngine>,
    attached: bool,
}

impl FallbackDecoder {
    /// Wraps an engine whose `init` has already succeeded.
    pub fn new(engine: Arc<dyn DecodeEngine>) -> Self {
        FallbackDecoder {
            engine,
            attached: false,
        }
    }

    async fn attach(&mut self, video: VideoHandle, results: mpsc::Sender<DecodeResult>) -> ScanResult<()> {
        self.engine
            .start(video, results)
            .await
            .map_err(|e| e.into_decoder_init(DecoderKind::Fallback))?;
        self.attached = true;
        debug!("Software engine attached");
        Ok(())
    }

    async fn detach_and_stop(&mut self) {
        if self.attached {
            self.engine.stop().await;
            self.attached = false;
            debug!("Software engine stopped");
        }
    }
}

// =============================================================================
// Decode Strategy
// =============================================================================

/// The strategy picked for a session.
pub enum DecodeStrategy {
    Native(NativeDecoder),
    Fallback(FallbackDecoder),
}

impl DecodeStrategy {
    pub fn kind(&self) -> DecoderKind {
        match self {
            DecodeStrategy::Native(_) => DecoderKind::Native,
            DecodeStrategy::Fallback(_) => DecoderKind::Fallback,
        }
    }

    /// Starts decoding `video`. Results arrive on `results` asynchronously.
    pub async fn attach(&mut self, video: VideoHandle, results: mpsc::Sender<DecodeResult>) -> ScanResult<()> {
        match self {
            DecodeStrategy::Native(native) => native.attach(video, results).await,
            DecodeStrategy::Fallback(fallback) => fallback.attach(video, results).await,
        }
    }

    /// Stops decoding. Idempotent; no result is sent after this returns.
    pub async fn detach_and_stop(&mut self) {
        match self {
            DecodeStrategy::Native(native) => native.detach_and_stop().await,
            DecodeStrategy::Fallback(fallback) => fallback.detach_and_stop().await,
        }
    }
}

impl std::fmt::Debug for DecodeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DecodeStrategy").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CameraBackend, VideoHandle};
    use crate::sim::{SimulatedCamera, SimulatedNativeReaderFactory};
    use shelfscan_core::{DeviceRequest, FacingMode, StreamConstraints};

    async fn open_video(camera: &SimulatedCamera) -> VideoHandle {
        let stream = camera
            .open_stream(&StreamConstraints {
                device: DeviceRequest::RearFacing(FacingMode::Ideal),
                resolution: None,
            })
            .await
            .unwrap();
        VideoHandle::new(Arc::from(stream))
    }

    fn camera() -> SimulatedCamera {
        SimulatedCamera::builder()
            .device("cam-back", "Back Camera", false)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_decoder_emits_results() {
        let camera = camera();
        camera.show_code("96385074", Symbology::Ean8).unwrap();
        let video = open_video(&camera).await;

        let factory = SimulatedNativeReaderFactory::new();
        let reader = factory.create(Symbology::ALL).await.unwrap();
        let mut strategy =
            DecodeStrategy::Native(NativeDecoder::new(reader, Duration::from_millis(16)));
        assert_eq!(strategy.kind(), DecoderKind::Native);

        let (tx, mut rx) = mpsc::channel(8);
        strategy.attach(video, tx).await.unwrap();

        let result = rx.recv().await.unwrap();
        assert_eq!(result.raw_value, "96385074");
        assert_eq!(result.symbology, Some(Symbology::Ean8));

        strategy.detach_and_stop().await;
        strategy.detach_and_stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_decoder_one_detection_in_flight() {
        let camera = camera();
        let video = open_video(&camera).await;

        // Detection takes ten ticks
        let factory =
            SimulatedNativeReaderFactory::new().with_detect_delay(Duration::from_millis(160));
        let reader = factory.create(Symbology::ALL).await.unwrap();
        let mut strategy =
            DecodeStrategy::Native(NativeDecoder::new(reader, Duration::from_millis(16)));

        let (tx, _rx) = mpsc::channel(8);
        strategy.attach(video, tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        strategy.detach_and_stop().await;

        assert_eq!(factory.max_in_flight(), 1);
        assert!(factory.detect_calls() >= 2);
        assert!(factory.detect_calls() <= 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_decoder_rejects_dead_video() {
        let camera = camera();
        let stream: Arc<dyn crate::backend::MediaStream> = Arc::from(
            camera
                .open_stream(&StreamConstraints {
                    device: DeviceRequest::RearFacing(FacingMode::Ideal),
                    resolution: None,
                })
                .await
                .unwrap(),
        );
        let video = VideoHandle::new(stream.clone());
        for track in stream.tracks() {
            track.stop();
        }

        let factory = SimulatedNativeReaderFactory::new();
        let reader = factory.create(Symbology::ALL).await.unwrap();
        let mut strategy =
            DecodeStrategy::Native(NativeDecoder::new(reader, Duration::from_millis(16)));
        let (tx, _rx) = mpsc::channel(8);
        let err = strategy.attach(video, tx).await.unwrap_err();
        assert!(matches!(err, ScanError::DecoderInit { .. }));
    }
}
