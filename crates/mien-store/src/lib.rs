//! mien-store — Persistence for the enrollment database.
//!
//! The store is read and written only as a whole JSON blob: the core always
//! loads the full store before deciding and writes the full store after a
//! commit, so no consumer can observe a partially updated identity. Admin
//! PINs are persisted as salted SHA-256 digests.

pub mod credential;
pub mod store;

pub use credential::{create_credential, verify_pin, CredentialError, MIN_PIN_LEN};
pub use store::{StoreError, StoreFile};
