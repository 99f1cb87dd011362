//! Frame source seam.
//!
//! The detector/extractor pipeline is an external collaborator: per frame it
//! yields zero or more detections, each with a bounding box, optional
//! landmarks, and a descriptor embedding. Implementations wrap a live
//! camera pipeline or a recorded stream.

use thiserror::Error;

use crate::types::Detection;

#[derive(Error, Debug)]
pub enum SourceError {
    /// The collaborator failed (camera gone, pipeline crashed, bad data).
    /// Never silently retried; the caller decides what to do.
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    /// A finite stream (recording) ran out of frames. Distinct from "no
    /// face in this frame", which is an empty detection list.
    #[error("frame stream ended")]
    Exhausted,
}

/// Cooperatively polled detector/extractor collaborator.
///
/// Calls may be slow (tens of milliseconds); drivers sleep a fixed interval
/// between calls rather than spinning. A frame with no face is `Ok(vec![])`,
/// never an error.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Vec<Detection>, SourceError>;
}
