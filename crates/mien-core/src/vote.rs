//! Temporal vote smoothing over per-frame matcher outputs.
//!
//! Per-frame embeddings are noisy (pose, lighting, motion blur). The
//! aggregator keeps the last N per-frame labels and only surfaces an
//! identity once it holds a supermajority of the window, trading a few
//! hundred milliseconds of latency for a flicker-free decision.

use std::collections::VecDeque;

/// Vote window tuning.
#[derive(Debug, Clone, Copy)]
pub struct VoteConfig {
    /// Number of per-frame labels retained.
    pub window: usize,
    /// Minimum count the winning label needs before it is surfaced.
    pub need: usize,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self { window: 8, need: 5 }
    }
}

/// Fixed-capacity FIFO of per-frame labels with majority decision.
#[derive(Debug, Clone)]
pub struct VoteAggregator {
    cfg: VoteConfig,
    window: VecDeque<Option<String>>,
}

impl VoteAggregator {
    pub fn new(cfg: VoteConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(cfg.window),
            cfg,
        }
    }

    /// Append one per-frame label (`None` for an unrecognized face),
    /// evicting the oldest entry when the window is full.
    pub fn push(&mut self, label: Option<String>) {
        if self.window.len() >= self.cfg.window {
            self.window.pop_front();
        }
        self.window.push_back(label);
    }

    /// The current debounced decision.
    ///
    /// Returns the label with the highest count in the window, only if that
    /// count reaches `need`. The unknown pseudo-label never wins. Ties break
    /// to the label seen earliest in the window (scan order, strictly
    /// greater comparison), which is deterministic and not latency-sensitive.
    pub fn decide(&self) -> Option<&str> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for label in self.window.iter().flatten() {
            let label = label.as_str();
            match counts.iter_mut().find(|(l, _)| *l == label) {
                Some((_, c)) => *c += 1,
                None => counts.push((label, 1)),
            }
        }

        let mut best: Option<(&str, usize)> = None;
        for (label, count) in counts {
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((label, count));
            }
        }

        best.filter(|(_, count)| *count >= self.cfg.need)
            .map(|(label, _)| label)
    }

    /// Drop all buffered votes (store reset, mode switch).
    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

impl Default for VoteAggregator {
    fn default() -> Self {
        Self::new(VoteConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(agg: &mut VoteAggregator, labels: &[Option<&str>]) {
        for label in labels {
            agg.push(label.map(str::to_string));
        }
    }

    #[test]
    fn test_supermajority_wins() {
        let mut agg = VoteAggregator::default();
        push_all(
            &mut agg,
            &[
                Some("A"), Some("A"), Some("A"), Some("A"), Some("A"),
                Some("B"), Some("B"), Some("B"),
            ],
        );
        assert_eq!(agg.decide(), Some("A"));
    }

    #[test]
    fn test_split_window_yields_no_decision() {
        let mut agg = VoteAggregator::default();
        push_all(
            &mut agg,
            &[
                Some("A"), Some("A"), Some("A"),
                Some("B"), Some("B"), Some("B"),
                None, None,
            ],
        );
        assert_eq!(agg.decide(), None);
    }

    #[test]
    fn test_unknown_never_wins() {
        let mut agg = VoteAggregator::default();
        push_all(&mut agg, &[None, None, None, None, None, None, None, Some("A")]);
        assert_eq!(agg.decide(), None);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut agg = VoteAggregator::new(VoteConfig { window: 3, need: 2 });
        push_all(&mut agg, &[Some("A"), Some("A"), Some("B"), Some("B")]);
        // First A evicted: window is [A, B, B].
        assert_eq!(agg.len(), 3);
        assert_eq!(agg.decide(), Some("B"));
    }

    #[test]
    fn test_tie_breaks_to_earliest_label() {
        let mut agg = VoteAggregator::new(VoteConfig { window: 4, need: 2 });
        push_all(&mut agg, &[Some("A"), Some("B"), Some("A"), Some("B")]);
        assert_eq!(agg.decide(), Some("A"));
    }

    #[test]
    fn test_empty_window_decides_nothing() {
        let agg = VoteAggregator::default();
        assert_eq!(agg.decide(), None);
    }

    #[test]
    fn test_clear_forgets_votes() {
        let mut agg = VoteAggregator::default();
        push_all(&mut agg, &[Some("A"); 8]);
        assert_eq!(agg.decide(), Some("A"));
        agg.clear();
        assert_eq!(agg.decide(), None);
        assert!(agg.is_empty());
    }
}
