//! Open-set nearest-identity matcher.
//!
//! Plain nearest-neighbor matching misclassifies borderline strangers as
//! whichever enrolled identity happens to be nearest. The matcher therefore
//! applies two rejection rules on top of the nearest hit: an absolute
//! distance threshold (stricter when only one identity is enrolled, since
//! there is no competing class to disambiguate against) and a margin test
//! against the best *competing* identity.

use crate::types::{Embedding, Role, Store};

/// Matcher tuning. Distances are Euclidean in embedding space.
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// Accept threshold when two or more identities are enrolled.
    pub th_normal: f32,
    /// Accept threshold when exactly one identity is enrolled.
    pub th_single: f32,
    /// Minimum lead over the best competing identity.
    pub margin: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            th_normal: 0.52,
            th_single: 0.44,
            margin: 0.05,
        }
    }
}

/// An accepted match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchHit {
    pub name: String,
    pub role: Role,
    pub distance: f32,
}

/// Distance-based open-set classifier over the enrolled population.
#[derive(Debug, Clone, Default)]
pub struct OpenSetMatcher {
    cfg: MatcherConfig,
}

impl OpenSetMatcher {
    pub fn new(cfg: MatcherConfig) -> Self {
        Self { cfg }
    }

    /// Classify a probe embedding against every enrolled identity.
    ///
    /// Each identity competes with its own nearest template, so multiple
    /// templates of one identity never trip the margin test against each
    /// other. Returns `None` for an empty store, a nearest distance at or
    /// beyond the threshold, or an ambiguous winner.
    pub fn classify(&self, probe: &Embedding, store: &Store) -> Option<MatchHit> {
        let mut best: Option<(usize, f32)> = None;
        let mut second: Option<f32> = None;

        for (idx, identity) in store.identities.iter().enumerate() {
            let Some(dist) = identity.nearest_distance(probe) else {
                continue;
            };
            match best {
                None => best = Some((idx, dist)),
                Some((_, best_dist)) if dist < best_dist => {
                    second = Some(best_dist);
                    best = Some((idx, dist));
                }
                Some(_) => match second {
                    None => second = Some(dist),
                    Some(s) if dist < s => second = Some(dist),
                    Some(_) => {}
                },
            }
        }

        let (idx, distance) = best?;

        let threshold = if store.identities.len() == 1 {
            self.cfg.th_single
        } else {
            self.cfg.th_normal
        };
        if distance >= threshold {
            return None;
        }
        if let Some(second) = second {
            if second - distance < self.cfg.margin {
                return None;
            }
        }

        let identity = &store.identities[idx];
        Some(MatchHit {
            name: identity.name.clone(),
            role: identity.role,
            distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn identity(name: &str, templates: Vec<Embedding>) -> Identity {
        Identity {
            name: name.into(),
            role: Role::Member,
            templates,
            enrolled_at: String::new(),
        }
    }

    fn store_of(identities: Vec<Identity>) -> Store {
        Store { identities, ..Store::default() }
    }

    #[test]
    fn test_empty_store_rejects_everything() {
        let matcher = OpenSetMatcher::default();
        assert!(matcher.classify(&emb(&[0.0, 0.0]), &store_of(vec![])).is_none());
    }

    #[test]
    fn test_clear_winner_is_accepted() {
        let matcher = OpenSetMatcher::default();
        let store = store_of(vec![
            identity("Ada", vec![emb(&[0.0, 0.0])]),
            identity("Grace", vec![emb(&[1.0, 0.0])]),
        ]);
        let hit = matcher.classify(&emb(&[0.05, 0.0]), &store).unwrap();
        assert_eq!(hit.name, "Ada");
        assert!((hit.distance - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_equidistant_probe_is_rejected_regardless_of_winner() {
        // Two identities 1.0 apart; a probe within MARGIN of both must be
        // open-set rejected even though one is nominally closer.
        let matcher = OpenSetMatcher::default();
        let store = store_of(vec![
            identity("Ada", vec![emb(&[0.0, 0.0])]),
            identity("Grace", vec![emb(&[0.5, 0.0])]),
        ]);
        // Distances 0.26 and 0.24: both under threshold, lead 0.02 < 0.05.
        assert!(matcher.classify(&emb(&[0.26, 0.0]), &store).is_none());
    }

    #[test]
    fn test_own_templates_do_not_compete() {
        // One identity with two close templates must not margin-reject itself.
        let matcher = OpenSetMatcher::default();
        let store = store_of(vec![
            identity("Ada", vec![emb(&[0.0, 0.0]), emb(&[0.02, 0.0])]),
            identity("Grace", vec![emb(&[5.0, 0.0])]),
        ]);
        let hit = matcher.classify(&emb(&[0.01, 0.0]), &store).unwrap();
        assert_eq!(hit.name, "Ada");
    }

    #[test]
    fn test_single_identity_uses_stricter_threshold() {
        // A probe at distance between th_single and th_normal is rejected
        // when the identity stands alone, accepted once a far-away second
        // identity exists (nothing nearby to trip the margin test).
        let matcher = OpenSetMatcher::default();
        let probe = emb(&[0.48, 0.0]);

        let alone = store_of(vec![identity("Ada", vec![emb(&[0.0, 0.0])])]);
        assert!(matcher.classify(&probe, &alone).is_none());

        let populated = store_of(vec![
            identity("Ada", vec![emb(&[0.0, 0.0])]),
            identity("Grace", vec![emb(&[10.0, 0.0])]),
        ]);
        let hit = matcher.classify(&probe, &populated).unwrap();
        assert_eq!(hit.name, "Ada");
    }

    #[test]
    fn test_distance_at_threshold_is_rejected() {
        let matcher = OpenSetMatcher::default();
        let store = store_of(vec![identity("Ada", vec![emb(&[0.0, 0.0])])]);
        // Exactly th_single away: rejected (strict less-than accept).
        assert!(matcher.classify(&emb(&[0.44, 0.0]), &store).is_none());
    }

    #[test]
    fn test_identity_without_templates_is_skipped() {
        let matcher = OpenSetMatcher::default();
        let store = store_of(vec![
            identity("Ghost", vec![]),
            identity("Ada", vec![emb(&[0.0, 0.0])]),
        ]);
        let hit = matcher.classify(&emb(&[0.1, 0.0]), &store).unwrap();
        assert_eq!(hit.name, "Ada");
    }
}
