//! Debounced live classification: matcher output smoothed by the vote
//! window. This is the per-frame path behind the dashboard's identity
//! label.

use crate::matcher::{MatcherConfig, OpenSetMatcher};
use crate::types::{Embedding, Role, Store};
use crate::vote::{VoteAggregator, VoteConfig};

/// The debounced identity surfaced to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedIdentity {
    pub name: String,
    pub role: Role,
}

/// Matcher plus vote window, owning all per-stream mutable state.
#[derive(Debug)]
pub struct LiveClassifier {
    matcher: OpenSetMatcher,
    votes: VoteAggregator,
}

impl LiveClassifier {
    pub fn new(matcher_cfg: MatcherConfig, vote_cfg: VoteConfig) -> Self {
        Self {
            matcher: OpenSetMatcher::new(matcher_cfg),
            votes: VoteAggregator::new(vote_cfg),
        }
    }

    /// Classify one frame's dominant-face embedding.
    ///
    /// The raw matcher label (or `None` for an open-set reject) enters the
    /// vote window; the returned decision is the window majority, so a
    /// single noisy frame cannot flip the display.
    pub fn classify_frame(&mut self, embedding: &Embedding, store: &Store) -> Option<RecognizedIdentity> {
        let hit = self.matcher.classify(embedding, store);
        self.votes.push(hit.map(|h| h.name));

        let name = self.votes.decide()?.to_string();
        let role = store.identity(&name)?.role;
        Some(RecognizedIdentity { name, role })
    }

    /// Forget all buffered votes (store reset, session hand-off).
    pub fn reset(&mut self) {
        self.votes.clear();
    }
}

impl Default for LiveClassifier {
    fn default() -> Self {
        Self::new(MatcherConfig::default(), VoteConfig::default())
    }
}
