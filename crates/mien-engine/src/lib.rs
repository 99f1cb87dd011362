//! mien-engine — The session engine the host dashboard embeds.
//!
//! A dedicated engine thread owns the frame source, the in-memory store,
//! and the live classifier. While idle it runs the live classification
//! loop; guided enrollment, admin creation, and admin verification run as
//! exclusive sessions that suspend the live loop for their duration (the
//! single thread is the camera lock). Callers talk to the engine through a
//! clone-safe async [`EngineHandle`].

pub mod config;
pub mod engine;
pub mod replay;

pub use config::EngineConfig;
pub use engine::{
    spawn_engine, AdminCreationError, EngineHandle, EnrollmentError, EnrollmentProgressView,
    EnrollmentTicket, LiveDecision, SessionState,
};
pub use replay::ReplaySource;
