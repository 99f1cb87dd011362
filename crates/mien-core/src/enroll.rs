//! Guided multi-pose enrollment capture.
//!
//! The session is a synchronous state machine: the driver polls the
//! detector at its own cadence and feeds each frame to [`EnrollmentSession::step`]
//! together with the current time. The session never sleeps and never reads
//! a clock, so stage logic is testable frame by frame.
//!
//! Stage order: wait for any face to appear, then capture a fixed number of
//! samples at each of front, left, and right pose. A stage that exhausts its
//! attempt budget advances with whatever it collected; the final commit rule
//! (minimum total sample count) is enforced by [`EnrollmentSession::finish`],
//! so a partial session can never be committed.

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::pose::{self, PoseConfig, PoseStage};
use crate::types::{largest_face, Detection, Embedding};

/// Capture cadence and budgets.
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentConfig {
    /// How long to wait for the first face before giving up.
    pub presence_timeout: Duration,
    /// Poll interval while waiting for presence.
    pub presence_poll: Duration,
    /// Poll interval between capture attempts.
    pub sample_poll: Duration,
    /// Extra settle delay after an accepted sample, to avoid near-duplicate
    /// frames.
    pub settle: Duration,
    /// Samples required per pose stage.
    pub samples_per_stage: u32,
    /// Capture attempts allowed per pose stage.
    pub attempts_per_stage: u32,
    /// Minimum total samples for a session to be committable.
    pub min_total_samples: usize,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            presence_timeout: Duration::from_secs(8),
            presence_poll: Duration::from_millis(200),
            sample_poll: Duration::from_millis(120),
            settle: Duration::from_millis(160),
            samples_per_stage: 3,
            attempts_per_stage: 120,
            min_total_samples: 9,
        }
    }
}

/// Enrollment stage. Capture stages advance in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    WaitingForPresence,
    Front,
    Left,
    Right,
    Done,
}

impl Stage {
    fn next(self) -> Stage {
        match self {
            Stage::WaitingForPresence => Stage::Front,
            Stage::Front => Stage::Left,
            Stage::Left => Stage::Right,
            Stage::Right | Stage::Done => Stage::Done,
        }
    }

    /// The pose gate for a capture stage, `None` outside capture.
    fn pose(self) -> Option<PoseStage> {
        match self {
            Stage::Front => Some(PoseStage::Front),
            Stage::Left => Some(PoseStage::Left),
            Stage::Right => Some(PoseStage::Right),
            Stage::WaitingForPresence | Stage::Done => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::WaitingForPresence => "waiting for presence",
            Stage::Front => "front",
            Stage::Left => "left",
            Stage::Right => "right",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// What a single `step` call did, and what the driver should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollStep {
    /// No face yet; keep polling at the presence cadence.
    Waiting { remaining: Duration },
    /// Presence window expired without any face. Terminal.
    TimedOut,
    /// A face appeared; capture begins with the next frame.
    PresenceConfirmed,
    /// Sample accepted; the driver should settle before the next poll.
    Captured { stage: Stage, total: usize },
    /// Frame examined, nothing captured (no face, no landmarks, or pose
    /// mismatch); keep polling at the sample cadence.
    Rejected { stage: Stage },
    /// All capture stages finished. Terminal; call `finish`.
    Finished { total: usize },
}

/// Why a capture session cannot produce a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentFailure {
    #[error("no face detected within the presence window")]
    NoFaceDetected,
    #[error("captured {got} of {need} required samples")]
    InsufficientSamples { got: usize, need: usize },
}

/// Progress snapshot for UI display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentProgress {
    pub stage: Stage,
    pub samples_so_far: usize,
    pub target_total: usize,
}

/// One guided capture attempt. Transient: discarded on completion,
/// cancellation, or failure; nothing is persisted from here.
#[derive(Debug)]
pub struct EnrollmentSession {
    cfg: EnrollmentConfig,
    pose_cfg: PoseConfig,
    stage: Stage,
    presence_deadline: Instant,
    attempts: u32,
    captured_in_stage: u32,
    samples: Vec<Embedding>,
}

impl EnrollmentSession {
    pub fn begin(now: Instant, cfg: EnrollmentConfig, pose_cfg: PoseConfig) -> Self {
        Self {
            presence_deadline: now + cfg.presence_timeout,
            cfg,
            pose_cfg,
            stage: Stage::WaitingForPresence,
            attempts: 0,
            captured_in_stage: 0,
            samples: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn samples_captured(&self) -> usize {
        self.samples.len()
    }

    pub fn config(&self) -> &EnrollmentConfig {
        &self.cfg
    }

    pub fn progress(&self) -> EnrollmentProgress {
        EnrollmentProgress {
            stage: self.stage,
            samples_so_far: self.samples.len(),
            target_total: self.cfg.samples_per_stage as usize * 3,
        }
    }

    /// Consume one frame observation.
    pub fn step(&mut self, now: Instant, frame: &[Detection]) -> EnrollStep {
        match self.stage {
            Stage::Done => EnrollStep::Finished { total: self.samples.len() },
            Stage::WaitingForPresence => {
                if !frame.is_empty() {
                    self.stage = Stage::Front;
                    tracing::debug!("presence confirmed, starting guided capture");
                    EnrollStep::PresenceConfirmed
                } else if now >= self.presence_deadline {
                    EnrollStep::TimedOut
                } else {
                    EnrollStep::Waiting { remaining: self.presence_deadline - now }
                }
            }
            stage => self.step_capture(stage, frame),
        }
    }

    fn step_capture(&mut self, stage: Stage, frame: &[Detection]) -> EnrollStep {
        // Every examined frame costs one attempt, accepted or not.
        self.attempts += 1;

        let mut outcome = EnrollStep::Rejected { stage };
        if let Some(det) = largest_face(frame) {
            if let Some(yaw) = pose::yaw(det) {
                let gate = stage.pose().expect("capture stage has a pose");
                if pose::meets_pose(yaw, gate, &self.pose_cfg) {
                    self.samples.push(det.embedding.clone());
                    self.captured_in_stage += 1;
                    outcome = EnrollStep::Captured { stage, total: self.samples.len() };
                }
            }
        }

        let stage_done = self.captured_in_stage >= self.cfg.samples_per_stage
            || self.attempts >= self.cfg.attempts_per_stage;
        if stage_done {
            let next = stage.next();
            tracing::debug!(
                from = %stage,
                to = %next,
                captured = self.captured_in_stage,
                attempts = self.attempts,
                "capture stage complete"
            );
            self.stage = next;
            self.attempts = 0;
            self.captured_in_stage = 0;
            if next == Stage::Done {
                return EnrollStep::Finished { total: self.samples.len() };
            }
        }

        outcome
    }

    /// Validate the total sample count and fold the samples into a single
    /// centroid template.
    pub fn finish(self) -> Result<Embedding, EnrollmentFailure> {
        let got = self.samples.len();
        let need = self.cfg.min_total_samples;
        if got < need {
            return Err(EnrollmentFailure::InsufficientSamples { got, need });
        }
        // min_total_samples >= 1, so the centroid exists.
        Embedding::centroid(&self.samples)
            .ok_or(EnrollmentFailure::InsufficientSamples { got, need })
    }
}
