//! Time-boxed live admin verification.
//!
//! Unlike the windowed vote used for display, this gate guards a privileged
//! write: it requires several back-to-back accepting samples, and a single
//! failing sample discards all prior progress. A frame with no face leaves
//! the counter untouched; only a detected face that misses the threshold
//! resets it.
//!
//! The check is identity-specific: minimum distance to any of the admin's
//! templates against a dedicated verification threshold, not the
//! population-wide open-set matcher.

use std::time::{Duration, Instant};

use crate::types::{largest_face, Detection, Embedding};

/// Verification gate tuning.
#[derive(Debug, Clone, Copy)]
pub struct VerifyConfig {
    /// Accept threshold for the min distance to any admin template.
    pub threshold: f32,
    /// Consecutive accepting samples required.
    pub need_consecutive: u32,
    /// Wall-clock window for the whole attempt.
    pub timeout: Duration,
    /// Poll interval between samples.
    pub poll: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.50,
            need_consecutive: 3,
            timeout: Duration::from_secs(10),
            poll: Duration::from_millis(120),
        }
    }
}

/// Outcome of one verification step.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyStep {
    /// Enough consecutive matches; authorization granted. Terminal.
    Granted,
    /// The deadline passed first. Terminal.
    Expired,
    /// Keep polling. `remaining` feeds the UI countdown.
    Pending { remaining: Duration, consecutive: u32 },
}

/// One verification attempt against a fixed set of admin templates.
/// Transient; progress never outlives the session.
#[derive(Debug)]
pub struct VerificationSession {
    cfg: VerifyConfig,
    deadline: Instant,
    consecutive: u32,
    templates: Vec<Embedding>,
}

impl VerificationSession {
    /// Callers must ensure `templates` is non-empty; an empty set can never
    /// match and the session would only ever expire (fail closed).
    pub fn begin(now: Instant, templates: Vec<Embedding>, cfg: VerifyConfig) -> Self {
        Self {
            deadline: now + cfg.timeout,
            cfg,
            consecutive: 0,
            templates,
        }
    }

    /// Time left before the attempt expires.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    /// Consume one frame observation.
    pub fn step(&mut self, now: Instant, frame: &[Detection]) -> VerifyStep {
        if now >= self.deadline {
            tracing::debug!("admin verification window expired");
            return VerifyStep::Expired;
        }

        if let Some(det) = largest_face(frame) {
            let min_dist = self
                .templates
                .iter()
                .map(|t| t.euclidean_distance(&det.embedding))
                .fold(f32::INFINITY, f32::min);

            if min_dist < self.cfg.threshold {
                self.consecutive += 1;
                if self.consecutive >= self.cfg.need_consecutive {
                    tracing::info!(consecutive = self.consecutive, "admin verification granted");
                    return VerifyStep::Granted;
                }
            } else {
                // A miss discards all prior progress.
                self.consecutive = 0;
            }
        }

        VerifyStep::Pending {
            remaining: self.remaining(now),
            consecutive: self.consecutive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn det(embedding: &[f32]) -> Detection {
        Detection {
            bbox: BoundingBox { x: 0.0, y: 0.0, width: 100.0, height: 100.0, confidence: 0.9 },
            landmarks: None,
            embedding: Embedding::new(embedding.to_vec()),
        }
    }

    fn session(now: Instant) -> VerificationSession {
        VerificationSession::begin(now, vec![Embedding::new(vec![0.0, 0.0])], VerifyConfig::default())
    }

    const MATCH: [f32; 2] = [0.1, 0.0];
    const MISS: [f32; 2] = [5.0, 0.0];

    #[test]
    fn test_three_consecutive_matches_grant() {
        let t0 = Instant::now();
        let mut s = session(t0);
        assert!(matches!(s.step(t0, &[det(&MATCH)]), VerifyStep::Pending { consecutive: 1, .. }));
        assert!(matches!(s.step(t0, &[det(&MATCH)]), VerifyStep::Pending { consecutive: 2, .. }));
        assert_eq!(s.step(t0, &[det(&MATCH)]), VerifyStep::Granted);
    }

    #[test]
    fn test_miss_resets_progress() {
        // match, match, miss, match, match, match: the miss discards the
        // first two, success lands on the sixth sample.
        let t0 = Instant::now();
        let mut s = session(t0);
        s.step(t0, &[det(&MATCH)]);
        s.step(t0, &[det(&MATCH)]);
        assert!(matches!(
            s.step(t0, &[det(&MISS)]),
            VerifyStep::Pending { consecutive: 0, .. }
        ));
        s.step(t0, &[det(&MATCH)]);
        assert!(matches!(
            s.step(t0, &[det(&MATCH)]),
            VerifyStep::Pending { consecutive: 2, .. }
        ));
        assert_eq!(s.step(t0, &[det(&MATCH)]), VerifyStep::Granted);
    }

    #[test]
    fn test_all_misses_expire() {
        let t0 = Instant::now();
        let mut s = session(t0);
        let mut now = t0;
        for _ in 0..10 {
            assert!(matches!(
                s.step(now, &[det(&MISS)]),
                VerifyStep::Pending { consecutive: 0, .. }
            ));
            now += Duration::from_secs(1);
        }
        assert_eq!(s.step(now, &[det(&MATCH)]), VerifyStep::Expired);
    }

    #[test]
    fn test_empty_frame_does_not_reset() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.step(t0, &[det(&MATCH)]);
        s.step(t0, &[det(&MATCH)]);
        assert!(matches!(s.step(t0, &[]), VerifyStep::Pending { consecutive: 2, .. }));
        assert_eq!(s.step(t0, &[det(&MATCH)]), VerifyStep::Granted);
    }

    #[test]
    fn test_min_distance_over_all_templates() {
        let t0 = Instant::now();
        let templates = vec![
            Embedding::new(vec![9.0, 9.0]),
            Embedding::new(vec![0.0, 0.0]),
        ];
        let mut s = VerificationSession::begin(t0, templates, VerifyConfig::default());
        assert!(matches!(
            s.step(t0, &[det(&MATCH)]),
            VerifyStep::Pending { consecutive: 1, .. }
        ));
    }

    #[test]
    fn test_expiry_beats_matching_sample() {
        let t0 = Instant::now();
        let mut s = session(t0);
        let late = t0 + Duration::from_secs(11);
        assert_eq!(s.step(late, &[det(&MATCH)]), VerifyStep::Expired);
    }

    #[test]
    fn test_remaining_counts_down() {
        let t0 = Instant::now();
        let s = session(t0);
        assert_eq!(s.remaining(t0), Duration::from_secs(10));
        assert_eq!(s.remaining(t0 + Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(s.remaining(t0 + Duration::from_secs(20)), Duration::ZERO);
    }
}
