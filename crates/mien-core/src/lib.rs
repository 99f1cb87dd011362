//! mien-core — Open-set face-identity recognition core.
//!
//! Turns a stream of face observations (bounding box, landmarks, descriptor
//! embedding) into identity decisions: open-set nearest-identity matching
//! with margin rejection, temporal vote smoothing, pose-gated guided
//! enrollment, and a consecutive-match admin verification gate.
//!
//! Everything here is pure state: no camera, no clock of its own, no
//! persistence. Deadlines are computed from injected `Instant`s and the
//! polling cadence belongs to the caller, so every state machine is
//! unit-testable without faking timers.

pub mod classify;
pub mod enroll;
pub mod matcher;
pub mod pose;
pub mod source;
pub mod types;
pub mod verify;
pub mod vote;

pub use classify::{LiveClassifier, RecognizedIdentity};
pub use matcher::{MatchHit, MatcherConfig, OpenSetMatcher};
pub use source::{FrameSource, SourceError};
pub use types::{largest_face, AdminCredential, BoundingBox, Detection, Embedding, Identity, Role, Store};
pub use vote::{VoteAggregator, VoteConfig};
