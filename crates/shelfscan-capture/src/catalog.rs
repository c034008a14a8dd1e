//! # Device Catalog
//!
//! Lists cameras and applies the selection rules from
//! [`shelfscan_core::devices`].

use std::sync::Arc;
use std::time::Duration;

use shelfscan_core::{devices, CaptureDevice};
use tracing::{debug, warn};

use crate::backend::CameraBackend;
use crate::error::{ScanError, ScanResult};

/// Camera enumeration over a platform backend.
#[derive(Clone)]
pub struct DeviceCatalog {
    backend: Arc<dyn CameraBackend>,
    timeout: Duration,
}

impl DeviceCatalog {
    pub fn new(backend: Arc<dyn CameraBackend>, timeout: Duration) -> Self {
        DeviceCatalog { backend, timeout }
    }

    /// Takes a fresh device snapshot.
    ///
    /// Fails with `PermissionDenied` if the platform blocks listing, or
    /// `Timeout` if it never answers.
    pub async fn enumerate(&self) -> ScanResult<Vec<CaptureDevice>> {
        let devices = tokio::time::timeout(self.timeout, self.backend.enumerate_devices())
            .await
            .map_err(|_| ScanError::Timeout {
                operation: "Camera enumeration".into(),
                millis: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| {
                warn!(error = %e, "Camera enumeration failed");
                e
            })?;

        debug!(
            count = devices.len(),
            rear = devices.iter().filter(|d| d.is_rear_facing).count(),
            "Enumerated cameras"
        );
        Ok(devices)
    }

    /// First rear-facing device, else the first device.
    pub fn pick_preferred(devices: &[CaptureDevice]) -> Option<&CaptureDevice> {
        devices::pick_preferred(devices)
    }

    pub fn has_multiple(devices: &[CaptureDevice]) -> bool {
        devices::has_multiple(devices)
    }

    /// Cyclic successor of `current_id`; `None` with fewer than two devices.
    pub fn next_after<'a>(
        devices: &'a [CaptureDevice],
        current_id: Option<&str>,
    ) -> Option<&'a CaptureDevice> {
        devices::next_after(devices, current_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedCamera;

    #[tokio::test]
    async fn test_enumerate_and_pick() {
        let camera = SimulatedCamera::builder()
            .device("cam-front", "FaceTime HD Camera", false)
            .device("cam-back", "Back Camera", true)
            .build();
        let catalog = DeviceCatalog::new(Arc::new(camera), Duration::from_secs(1));

        let devices = catalog.enumerate().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(
            DeviceCatalog::pick_preferred(&devices).map(|d| d.id.as_str()),
            Some("cam-back")
        );
        assert!(DeviceCatalog::has_multiple(&devices));
        assert_eq!(
            DeviceCatalog::next_after(&devices, Some("cam-back")).map(|d| d.id.as_str()),
            Some("cam-front")
        );
    }

    #[tokio::test]
    async fn test_enumerate_permission_denied() {
        let camera = SimulatedCamera::builder()
            .device("cam-0", "Integrated Webcam", false)
            .build();
        camera.deny_permission(true);
        let catalog = DeviceCatalog::new(Arc::new(camera), Duration::from_secs(1));

        let err = catalog.enumerate().await.unwrap_err();
        assert!(matches!(err, ScanError::PermissionDenied(_)));
    }
}
