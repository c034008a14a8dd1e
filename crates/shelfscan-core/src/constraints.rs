//! # Stream Constraint Plan
//!
//! Strict camera constraints frequently fail on real hardware while looser
//! ones succeed, so acquisition walks an ordered plan from most to least
//! specific.
//!
//! ## Fallback Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Attempt 1   exact preferred device id   + ideal resolution            │
//! │              (skipped when no device was preferred)                    │
//! │                         │ constraint / device error                     │
//! │                         ▼                                               │
//! │  Attempt 2   rear-facing camera          + ideal resolution            │
//! │              (exact facing when strict_rear_facing is set)             │
//! │                         │ constraint / device error                     │
//! │                         ▼                                               │
//! │  Attempt 3   rear-facing camera (ideal)  , no resolution hint          │
//! │                         │ constraint / device error                     │
//! │                         ▼                                               │
//! │              CameraUnavailable                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_IDEAL_HEIGHT, DEFAULT_IDEAL_WIDTH};

// =============================================================================
// Constraint Parts
// =============================================================================

/// How strongly the rear-facing requirement is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Prefer a rear camera, accept any.
    Ideal,
    /// Fail unless a rear camera is available.
    Exact,
}

/// Which device a stream request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRequest {
    /// A specific device by its enumeration id.
    ExactId(String),
    /// Any rear-facing ("environment") camera.
    RearFacing(FacingMode),
}

/// Ideal capture resolution. A hint, not a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::new(DEFAULT_IDEAL_WIDTH, DEFAULT_IDEAL_HEIGHT)
    }
}

/// One stream request handed to the camera backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConstraints {
    pub device: DeviceRequest,
    pub resolution: Option<Resolution>,
}

impl std::fmt::Display for StreamConstraints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.device {
            DeviceRequest::ExactId(id) => write!(f, "device={}", id)?,
            DeviceRequest::RearFacing(FacingMode::Exact) => write!(f, "facing=environment(exact)")?,
            DeviceRequest::RearFacing(FacingMode::Ideal) => write!(f, "facing=environment")?,
        }
        if let Some(res) = self.resolution {
            write!(f, " {}x{}", res.width, res.height)?;
        }
        Ok(())
    }
}

// =============================================================================
// Constraint Plan
// =============================================================================

/// Ordered list of stream requests tried by `CaptureSession::acquire`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintPlan {
    attempts: Vec<StreamConstraints>,
}

impl ConstraintPlan {
    /// Builds the plan for a preferred device and a quality hint.
    ///
    /// ## Example
    /// ```rust
    /// use shelfscan_core::constraints::{ConstraintPlan, DeviceRequest, Resolution};
    ///
    /// let plan = ConstraintPlan::build(Some("cam-1"), Resolution::default(), false);
    /// assert_eq!(plan.len(), 3);
    /// assert_eq!(plan.attempts()[0].device, DeviceRequest::ExactId("cam-1".into()));
    /// assert!(plan.attempts()[2].resolution.is_none());
    /// ```
    pub fn build(preferred_device_id: Option<&str>, quality: Resolution, strict_rear_facing: bool) -> Self {
        let mut attempts = Vec::with_capacity(3);

        if let Some(id) = preferred_device_id.filter(|id| !id.is_empty()) {
            attempts.push(StreamConstraints {
                device: DeviceRequest::ExactId(id.to_string()),
                resolution: Some(quality),
            });
        }

        let facing = if strict_rear_facing {
            FacingMode::Exact
        } else {
            FacingMode::Ideal
        };
        attempts.push(StreamConstraints {
            device: DeviceRequest::RearFacing(facing),
            resolution: Some(quality),
        });

        attempts.push(StreamConstraints {
            device: DeviceRequest::RearFacing(FacingMode::Ideal),
            resolution: None,
        });

        ConstraintPlan { attempts }
    }

    pub fn attempts(&self) -> &[StreamConstraints] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamConstraints> {
        self.attempts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_without_preferred_device_skips_exact_id() {
        let plan = ConstraintPlan::build(None, Resolution::default(), false);
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan.attempts()[0].device,
            DeviceRequest::RearFacing(FacingMode::Ideal)
        );
        assert_eq!(plan.attempts()[0].resolution, Some(Resolution::new(640, 480)));
        assert_eq!(plan.attempts()[1].resolution, None);
    }

    #[test]
    fn test_empty_preferred_id_is_ignored() {
        let plan = ConstraintPlan::build(Some(""), Resolution::default(), false);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_strict_rear_facing_only_tightens_second_attempt() {
        let plan = ConstraintPlan::build(Some("cam"), Resolution::new(1280, 720), true);
        assert_eq!(
            plan.attempts()[1].device,
            DeviceRequest::RearFacing(FacingMode::Exact)
        );
        assert_eq!(
            plan.attempts()[2].device,
            DeviceRequest::RearFacing(FacingMode::Ideal)
        );
    }

    #[test]
    fn test_constraints_display() {
        let plan = ConstraintPlan::build(Some("cam-9"), Resolution::new(640, 480), false);
        let rendered: Vec<String> = plan.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "device=cam-9 640x480",
                "facing=environment 640x480",
                "facing=environment",
            ]
        );
    }
}
