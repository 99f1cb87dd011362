use serde::{Deserialize, Serialize};

/// Store schema version written to and expected from the persisted blob.
pub const STORE_SCHEMA_VERSION: u32 = 1;

/// Face descriptor embedding produced by the external feature extractor.
///
/// The dimensionality is fixed by the extractor (128 for the reference
/// extractor); the store validates that all persisted templates agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Componentwise arithmetic mean of a set of sample embeddings.
    ///
    /// Returns `None` for an empty slice. All samples are assumed to share
    /// one dimensionality; extra components beyond the first sample's length
    /// are ignored.
    pub fn centroid(samples: &[Embedding]) -> Option<Embedding> {
        let first = samples.first()?;
        let mut out = vec![0.0f32; first.dim()];
        for sample in samples {
            for (acc, v) in out.iter_mut().zip(sample.values.iter()) {
                *acc += v;
            }
        }
        let n = samples.len() as f32;
        for acc in &mut out {
            *acc /= n;
        }
        Some(Embedding::new(out))
    }
}

/// Axis-aligned face bounding box in frame coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// One detected face in a frame, as delivered by the detector/extractor
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
    pub embedding: Embedding,
}

/// Select the single largest-by-area detection in a frame.
///
/// Multi-face frames are collapsed to their dominant face; ties keep the
/// earliest detection.
pub fn largest_face(frame: &[Detection]) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for det in frame {
        match best {
            Some(b) if det.bbox.area() <= b.bbox.area() => {}
            _ => best = Some(det),
        }
    }
    best
}

/// Role attached to an enrolled identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Member,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => f.write_str("Admin"),
            Role::Member => f.write_str("Member"),
        }
    }
}

/// An enrolled identity: unique case-sensitive name, role, and one or more
/// face templates (normally a single centroid per enrollment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub role: Role,
    pub templates: Vec<Embedding>,
    /// RFC 3339 timestamp of the enrollment commit.
    pub enrolled_at: String,
}

impl Identity {
    /// Nearest distance from a probe to any of this identity's templates.
    /// `None` when the identity holds no templates.
    pub fn nearest_distance(&self, probe: &Embedding) -> Option<f32> {
        self.templates
            .iter()
            .map(|t| t.euclidean_distance(probe))
            .min_by(f32::total_cmp)
    }
}

/// Administrator credential. The PIN is stored as a salted SHA-256 digest,
/// never in clear; hashing and verification live in the store crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCredential {
    pub name: String,
    pub pin_hash: String,
    pub salt: String,
}

/// The whole persisted enrollment database. Loaded and saved only as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub schema_version: u32,
    pub admin: Option<AdminCredential>,
    pub identities: Vec<Identity>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            schema_version: STORE_SCHEMA_VERSION,
            admin: None,
            identities: Vec::new(),
        }
    }
}

impl Store {
    /// Look up an identity by exact (case-sensitive) name.
    pub fn identity(&self, name: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.name == name)
    }

    /// The identity record backing the admin credential, if both exist.
    pub fn admin_identity(&self) -> Option<&Identity> {
        let cred = self.admin.as_ref()?;
        self.identities
            .iter()
            .find(|i| i.name == cred.name && i.role == Role::Admin)
    }

    /// Structural validation, applied on every load. Fails fast so that
    /// malformed data never reaches the matcher.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != STORE_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema version {} (expected {STORE_SCHEMA_VERSION})",
                self.schema_version
            ));
        }

        let mut dim: Option<usize> = None;
        for identity in &self.identities {
            if identity.name.is_empty() {
                return Err("identity with empty name".into());
            }
            if self
                .identities
                .iter()
                .filter(|i| i.name == identity.name)
                .count()
                > 1
            {
                return Err(format!("duplicate identity name {:?}", identity.name));
            }
            if identity.templates.is_empty() {
                return Err(format!("identity {:?} has no templates", identity.name));
            }
            for template in &identity.templates {
                if template.dim() == 0 {
                    return Err(format!("identity {:?} has an empty template", identity.name));
                }
                match dim {
                    None => dim = Some(template.dim()),
                    Some(d) if d != template.dim() => {
                        return Err(format!(
                            "identity {:?} template dimension {} differs from {}",
                            identity.name,
                            template.dim(),
                            d
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        if let Some(cred) = &self.admin {
            if cred.name.is_empty() || cred.pin_hash.is_empty() {
                return Err("admin credential missing name or PIN digest".into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn identity(name: &str, role: Role, templates: Vec<Embedding>) -> Identity {
        Identity {
            name: name.into(),
            role,
            templates,
            enrolled_at: String::new(),
        }
    }

    #[test]
    fn test_euclidean_distance() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = emb(&[1.0, 2.0, 3.0]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_centroid_componentwise_mean() {
        let samples = vec![emb(&[1.0, 2.0]), emb(&[3.0, 4.0]), emb(&[5.0, 6.0])];
        let c = Embedding::centroid(&samples).unwrap();
        assert_eq!(c.values, vec![3.0, 4.0]);
    }

    #[test]
    fn test_centroid_empty() {
        assert!(Embedding::centroid(&[]).is_none());
    }

    #[test]
    fn test_largest_face_picks_max_area() {
        let small = Detection {
            bbox: BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9 },
            landmarks: None,
            embedding: emb(&[1.0]),
        };
        let large = Detection {
            bbox: BoundingBox { x: 0.0, y: 0.0, width: 50.0, height: 50.0, confidence: 0.5 },
            landmarks: None,
            embedding: emb(&[2.0]),
        };
        let frame = vec![small, large];
        let picked = largest_face(&frame).unwrap();
        assert_eq!(picked.embedding.values, vec![2.0]);
    }

    #[test]
    fn test_largest_face_empty_frame() {
        assert!(largest_face(&[]).is_none());
    }

    #[test]
    fn test_store_lookup_case_sensitive() {
        let store = Store {
            identities: vec![identity("Ada", Role::Member, vec![emb(&[1.0])])],
            ..Store::default()
        };
        assert!(store.identity("Ada").is_some());
        assert!(store.identity("ada").is_none());
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let store = Store {
            identities: vec![
                identity("Ada", Role::Member, vec![emb(&[1.0])]),
                identity("Ada", Role::Member, vec![emb(&[2.0])]),
            ],
            ..Store::default()
        };
        assert!(store.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mixed_dimensions() {
        let store = Store {
            identities: vec![
                identity("Ada", Role::Member, vec![emb(&[1.0, 2.0])]),
                identity("Grace", Role::Member, vec![emb(&[1.0])]),
            ],
            ..Store::default()
        };
        assert!(store.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_schema_version() {
        let store = Store { schema_version: 99, ..Store::default() };
        assert!(store.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_empty_store() {
        assert!(Store::default().validate().is_ok());
    }

    #[test]
    fn test_admin_identity_requires_matching_role() {
        let cred = AdminCredential {
            name: "Root".into(),
            pin_hash: "x".into(),
            salt: "y".into(),
        };
        let store = Store {
            admin: Some(cred),
            identities: vec![identity("Root", Role::Member, vec![emb(&[1.0])])],
            ..Store::default()
        };
        // Same name but Member role does not back the credential.
        assert!(store.admin_identity().is_none());
    }
}
