//! Engine configuration, loaded from `MIEN_*` environment variables.
//!
//! Every tunable of the recognition core is overridable; defaults are the
//! empirically tuned values of the reference deployment.

use std::path::PathBuf;
use std::time::Duration;

use mien_core::enroll::EnrollmentConfig;
use mien_core::pose::PoseConfig;
use mien_core::verify::VerifyConfig;
use mien_core::{MatcherConfig, VoteConfig};

/// Full engine configuration: core tunables plus engine cadence and the
/// store location.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub matcher: MatcherConfig,
    pub vote: VoteConfig,
    pub pose: PoseConfig,
    pub enroll: EnrollmentConfig,
    pub verify: VerifyConfig,
    /// Cadence of the idle live-classification loop.
    pub live_poll: Duration,
    /// Whether the idle live-classification loop runs at all. Session-only
    /// drivers (replay CLI, tests) turn it off so sessions see every frame.
    pub live_enabled: bool,
    /// Path of the store blob.
    pub store_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            vote: VoteConfig::default(),
            pose: PoseConfig::default(),
            enroll: EnrollmentConfig::default(),
            verify: VerifyConfig::default(),
            live_poll: Duration::from_millis(60),
            live_enabled: true,
            store_path: default_store_path(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `MIEN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.store_path = std::env::var("MIEN_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or(cfg.store_path);

        cfg.matcher.th_normal = env_f32("MIEN_MATCH_THRESHOLD", cfg.matcher.th_normal);
        cfg.matcher.th_single = env_f32("MIEN_MATCH_THRESHOLD_SINGLE", cfg.matcher.th_single);
        cfg.matcher.margin = env_f32("MIEN_MATCH_MARGIN", cfg.matcher.margin);

        cfg.vote.window = env_usize("MIEN_VOTE_WINDOW", cfg.vote.window);
        cfg.vote.need = env_usize("MIEN_VOTE_NEED", cfg.vote.need);

        cfg.pose.front_max = env_f32("MIEN_POSE_FRONT_MAX", cfg.pose.front_max);
        cfg.pose.side_min = env_f32("MIEN_POSE_SIDE_MIN", cfg.pose.side_min);
        cfg.pose.side_max = env_f32("MIEN_POSE_SIDE_MAX", cfg.pose.side_max);

        cfg.enroll.presence_timeout = env_millis("MIEN_PRESENCE_TIMEOUT_MS", cfg.enroll.presence_timeout);
        cfg.enroll.presence_poll = env_millis("MIEN_PRESENCE_POLL_MS", cfg.enroll.presence_poll);
        cfg.enroll.sample_poll = env_millis("MIEN_SAMPLE_POLL_MS", cfg.enroll.sample_poll);
        cfg.enroll.settle = env_millis("MIEN_SAMPLE_SETTLE_MS", cfg.enroll.settle);
        cfg.enroll.samples_per_stage = env_u32("MIEN_SAMPLES_PER_STAGE", cfg.enroll.samples_per_stage);
        cfg.enroll.attempts_per_stage = env_u32("MIEN_STAGE_ATTEMPTS", cfg.enroll.attempts_per_stage);
        cfg.enroll.min_total_samples = env_usize("MIEN_MIN_TOTAL_SAMPLES", cfg.enroll.min_total_samples);

        cfg.verify.threshold = env_f32("MIEN_VERIFY_THRESHOLD", cfg.verify.threshold);
        cfg.verify.need_consecutive = env_u32("MIEN_VERIFY_CONSECUTIVE", cfg.verify.need_consecutive);
        cfg.verify.timeout = env_secs("MIEN_VERIFY_TIMEOUT_SECS", cfg.verify.timeout);
        cfg.verify.poll = env_millis("MIEN_VERIFY_POLL_MS", cfg.verify.poll);

        cfg.live_poll = env_millis("MIEN_LIVE_POLL_MS", cfg.live_poll);
        cfg.live_enabled = std::env::var("MIEN_LIVE_ENABLED")
            .map(|v| v != "0")
            .unwrap_or(cfg.live_enabled);

        cfg
    }
}

/// Default store path under `XDG_DATA_HOME` (falling back to
/// `~/.local/share`).
pub fn default_store_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("mien")
        .join("store.json")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
