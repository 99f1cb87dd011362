//! Landmark-based yaw gating for guided enrollment.
//!
//! The yaw value is a dimensionless signed proxy, not a calibrated angle:
//! the horizontal offset of the nose from the bi-ocular midpoint, normalized
//! by face-box width. Positive values mean the head is turned toward the
//! subject's left in the mirrored preview. Thresholds are empirical tuning
//! constants and stay overridable configuration.

use crate::types::Detection;

// Landmark slots in the five-point layout.
const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;

/// Pose gate tuning.
#[derive(Debug, Clone, Copy)]
pub struct PoseConfig {
    /// `|yaw|` bound for a frontal face.
    pub front_max: f32,
    /// Lower bound of the accepted side-turn band.
    pub side_min: f32,
    /// Upper bound of the accepted side-turn band.
    pub side_max: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            front_max: 0.06,
            side_min: 0.10,
            side_max: 0.30,
        }
    }
}

/// The pose a capture stage asks the subject to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseStage {
    Front,
    Left,
    Right,
}

/// Normalized yaw proxy for a detection.
///
/// Requires landmarks; a detection without them cannot be pose-gated.
pub fn yaw(det: &Detection) -> Option<f32> {
    let lm = det.landmarks.as_ref()?;
    let eyes_x = (lm[LEFT_EYE].0 + lm[RIGHT_EYE].0) / 2.0;
    let width = if det.bbox.width > 0.0 { det.bbox.width } else { 1.0 };
    Some((lm[NOSE].0 - eyes_x) / width)
}

/// Whether a yaw value satisfies the given capture stage.
pub fn meets_pose(yaw: f32, stage: PoseStage, cfg: &PoseConfig) -> bool {
    match stage {
        PoseStage::Front => yaw.abs() < cfg.front_max,
        PoseStage::Left => yaw > cfg.side_min && yaw < cfg.side_max,
        PoseStage::Right => yaw < -cfg.side_min && yaw > -cfg.side_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding};

    /// Detection with a 100-wide box, eyes centered at x=50, and the nose
    /// offset so that the yaw proxy equals `yaw`.
    fn det_with_yaw(yaw: f32) -> Detection {
        Detection {
            bbox: BoundingBox { x: 0.0, y: 0.0, width: 100.0, height: 100.0, confidence: 0.9 },
            landmarks: Some([
                (40.0, 40.0),
                (60.0, 40.0),
                (50.0 + yaw * 100.0, 60.0),
                (45.0, 80.0),
                (55.0, 80.0),
            ]),
            embedding: Embedding::new(vec![0.0]),
        }
    }

    #[test]
    fn test_yaw_centered_nose_is_zero() {
        let y = yaw(&det_with_yaw(0.0)).unwrap();
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_yaw_offset_normalized_by_width() {
        let y = yaw(&det_with_yaw(0.2)).unwrap();
        assert!((y - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_yaw_requires_landmarks() {
        let mut det = det_with_yaw(0.0);
        det.landmarks = None;
        assert!(yaw(&det).is_none());
    }

    #[test]
    fn test_yaw_zero_width_box_does_not_divide_by_zero() {
        let mut det = det_with_yaw(0.1);
        det.bbox.width = 0.0;
        // Falls back to an unnormalized offset; must stay finite.
        assert!(yaw(&det).unwrap().is_finite());
    }

    #[test]
    fn test_front_gate() {
        let cfg = PoseConfig::default();
        assert!(meets_pose(0.0, PoseStage::Front, &cfg));
        assert!(meets_pose(-0.05, PoseStage::Front, &cfg));
        assert!(!meets_pose(0.06, PoseStage::Front, &cfg));
        assert!(!meets_pose(0.2, PoseStage::Front, &cfg));
    }

    #[test]
    fn test_left_gate_band() {
        let cfg = PoseConfig::default();
        assert!(meets_pose(0.2, PoseStage::Left, &cfg));
        assert!(!meets_pose(0.10, PoseStage::Left, &cfg));
        assert!(!meets_pose(0.30, PoseStage::Left, &cfg));
        assert!(!meets_pose(-0.2, PoseStage::Left, &cfg));
    }

    #[test]
    fn test_right_gate_mirrors_left() {
        let cfg = PoseConfig::default();
        assert!(meets_pose(-0.2, PoseStage::Right, &cfg));
        assert!(!meets_pose(-0.10, PoseStage::Right, &cfg));
        assert!(!meets_pose(-0.30, PoseStage::Right, &cfg));
        assert!(!meets_pose(0.2, PoseStage::Right, &cfg));
    }
}
