//! # Device Selection
//!
//! Pure selection rules over an enumerated device list. The async
//! enumeration itself lives in the capture crate; everything here is
//! deterministic given the same labels in the same order.
//!
//! ## Preferred Device
//! ```text
//!   devices ──► first label matching rear/back/environment ──► Some(dev)
//!                         │ none
//!                         ▼
//!               first device in enumeration order ──────────► Some(dev)
//!                         │ empty list
//!                         ▼
//!                       None  (the platform default decides)
//! ```

use crate::types::CaptureDevice;

/// Label fragments that identify a rear-facing camera.
const REAR_FACING_HINTS: &[&str] = &["back", "rear", "environment", "traseira"];

/// Returns true if a device label looks like a rear-facing camera.
pub fn looks_rear_facing(label: &str) -> bool {
    let label = label.to_lowercase();
    REAR_FACING_HINTS.iter().any(|hint| label.contains(hint))
}

/// Picks the device a scan should try first.
pub fn pick_preferred(devices: &[CaptureDevice]) -> Option<&CaptureDevice> {
    devices
        .iter()
        .find(|d| d.is_rear_facing || looks_rear_facing(&d.label))
        .or_else(|| devices.first())
}

/// Returns true if more than one camera can be switched between.
pub fn has_multiple(devices: &[CaptureDevice]) -> bool {
    devices.len() > 1
}

/// Returns the device after `current_id` in enumeration order, wrapping
/// around.
///
/// `None` when there is nothing to switch to (fewer than two devices). An
/// unknown or absent `current_id` selects the first device.
pub fn next_after<'a>(
    devices: &'a [CaptureDevice],
    current_id: Option<&str>,
) -> Option<&'a CaptureDevice> {
    if !has_multiple(devices) {
        return None;
    }

    let position = current_id.and_then(|id| devices.iter().position(|d| d.id == id));
    match position {
        Some(idx) => devices.get((idx + 1) % devices.len()),
        None => devices.first(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(labels: &[&str]) -> Vec<CaptureDevice> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| CaptureDevice::new(format!("dev-{}", i), *label))
            .collect()
    }

    #[test]
    fn test_pick_preferred_rear_camera() {
        let list = devices(&["Front Camera", "Back Camera", "Back Ultra Wide"]);
        assert_eq!(pick_preferred(&list).unwrap().id, "dev-1");
    }

    #[test]
    fn test_pick_preferred_falls_back_to_first() {
        let list = devices(&["Integrated Webcam", "USB Camera"]);
        assert_eq!(pick_preferred(&list).unwrap().id, "dev-0");
        assert!(pick_preferred(&[]).is_none());
    }

    #[test]
    fn test_rear_hint_is_case_insensitive() {
        assert!(looks_rear_facing("Câmera TRASEIRA"));
        assert!(looks_rear_facing("Environment facing"));
        assert!(!looks_rear_facing("user facing"));
    }

    #[test]
    fn test_next_after_cycles() {
        let list = devices(&["A", "B", "C"]);
        assert_eq!(next_after(&list, Some("dev-0")).unwrap().id, "dev-1");
        assert_eq!(next_after(&list, Some("dev-2")).unwrap().id, "dev-0");
        assert_eq!(next_after(&list, Some("missing")).unwrap().id, "dev-0");
        assert_eq!(next_after(&list, None).unwrap().id, "dev-0");
    }

    #[test]
    fn test_next_after_single_device_is_none() {
        let list = devices(&["Only"]);
        assert!(next_after(&list, Some("dev-0")).is_none());
        assert!(!has_multiple(&list));
    }
}
