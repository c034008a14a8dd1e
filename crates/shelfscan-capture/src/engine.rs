//! # Software Engine
//!
//! The built-in [`DecodeEngine`]: pulls frames from the video source at a
//! fixed cadence and runs [`shelfscan_core::symbology::decode_frame`] on
//! them. Used whenever the platform has no barcode reader of its own.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shelfscan_core::symbology::decode_frame;
use shelfscan_core::{DecodeResult, DecoderKind, Symbology};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backend::VideoHandle;
use crate::decoder::{DecodeEngine, LoopRun};
use crate::error::{ScanError, ScanResult};

/// Software EAN/UPC decoding engine.
pub struct SoftwareEngine {
    interval: Duration,
    symbologies: Mutex<Vec<Symbology>>,
    run: tokio::sync::Mutex<Option<LoopRun>>,
}

impl SoftwareEngine {
    /// Creates an engine sampling one frame per `interval`.
    pub fn new(interval: Duration) -> Self {
        SoftwareEngine {
            interval,
            symbologies: Mutex::new(Vec::new()),
            run: tokio::sync::Mutex::new(None),
        }
    }

    fn symbologies(&self) -> MutexGuard<'_, Vec<Symbology>> {
        self.symbologies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DecodeEngine for SoftwareEngine {
    async fn init(&self, symbologies: &[Symbology]) -> ScanResult<()> {
        if symbologies.is_empty() {
            return Err(ScanError::DecoderInit {
                decoder: DecoderKind::Fallback,
                reason: "no symbologies enabled".into(),
            });
        }
        *self.symbologies() = symbologies.to_vec();
        debug!(?symbologies, "Software engine initialised");
        Ok(())
    }

    async fn start(&self, video: VideoHandle, results: mpsc::Sender<DecodeResult>) -> ScanResult<()> {
        let symbologies = self.symbologies().clone();
        if symbologies.is_empty() {
            return Err(ScanError::DecoderInit {
                decoder: DecoderKind::Fallback,
                reason: "engine started before init".into(),
            });
        }

        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(ScanError::DecoderInit {
                decoder: DecoderKind::Fallback,
                reason: "engine already running".into(),
            });
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(decode_loop(
            video,
            results,
            symbologies,
            self.interval,
            cancel.clone(),
        ));
        *run = Some(LoopRun::new(cancel, task));

        info!(interval_ms = self.interval.as_millis() as u64, "Software engine started");
        Ok(())
    }

    async fn stop(&self) {
        if let Some(run) = self.run.lock().await.take() {
            run.shutdown().await;
            info!("Software engine stopped");
        }
    }
}

async fn decode_loop(
    video: VideoHandle,
    results: mpsc::Sender<DecodeResult>,
    symbologies: Vec<Symbology>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = async {
                ticker.tick().await;
                video.next_live_frame().await
            } => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Video source ended, software engine idle");
                break;
            }
        };

        let codes = decode_frame(&frame, &symbologies);
        if codes.is_empty() {
            trace!("No barcode in frame");
            continue;
        }

        for code in codes {
            let result = DecodeResult::new(code.text, Some(code.symbology), Utc::now());
            let sent = tokio::select! {
                _ = cancel.cancelled() => false,
                sent = results.send(result) => sent.is_ok(),
            };
            if !sent {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CameraBackend, MediaStream};
    use crate::sim::SimulatedCamera;
    use shelfscan_core::{DeviceRequest, FacingMode, StreamConstraints};
    use std::sync::Arc;

    async fn open(camera: &SimulatedCamera) -> Arc<dyn MediaStream> {
        Arc::from(
            camera
                .open_stream(&StreamConstraints {
                    device: DeviceRequest::RearFacing(FacingMode::Ideal),
                    resolution: None,
                })
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_init_rejects_empty_symbologies() {
        let engine = SoftwareEngine::new(Duration::from_millis(100));
        let err = engine.init(&[]).await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::DecoderInit {
                decoder: DecoderKind::Fallback,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_before_init_fails() {
        let camera = SimulatedCamera::builder()
            .device("cam-0", "Back Camera", false)
            .build();
        let video = VideoHandle::new(open(&camera).await);
        let engine = SoftwareEngine::new(Duration::from_millis(100));
        let (tx, _rx) = mpsc::channel(4);
        assert!(engine.start(video, tx).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_reads_enabled_symbologies_only() {
        let camera = SimulatedCamera::builder()
            .device("cam-0", "Back Camera", false)
            .build();
        camera.show_code("0425261", Symbology::UpcE).unwrap();
        let video = VideoHandle::new(open(&camera).await);

        let engine = SoftwareEngine::new(Duration::from_millis(100));
        engine.init(&[Symbology::UpcE]).await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        engine.start(video, tx).await.unwrap();

        let result = rx.recv().await.unwrap();
        assert_eq!(result.raw_value, "04252614");
        assert_eq!(result.symbology, Some(Symbology::UpcE));

        engine.stop().await;
        engine.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_stops_when_stream_ends() {
        let camera = SimulatedCamera::builder()
            .device("cam-0", "Back Camera", false)
            .build();
        let stream = open(&camera).await;
        let video = VideoHandle::new(stream.clone());

        let engine = SoftwareEngine::new(Duration::from_millis(100));
        engine.init(Symbology::ALL).await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        engine.start(video, tx).await.unwrap();

        for track in stream.tracks() {
            track.stop();
        }
        // The loop exits and drops its sender
        assert!(rx.recv().await.is_none());
        engine.stop().await;
    }
}
