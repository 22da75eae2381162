//! Tamper-evidence for issued fiscal documents.
//!
//! Every issued document carries a SHA-256 fingerprint of its fiscally
//! relevant fields plus the fingerprint of the tenant's previously issued
//! document. Deleting, reordering or editing a past document breaks the chain
//! at a recomputable position.

pub mod fingerprint;
pub mod verify;

pub use fingerprint::{compute_fingerprint, ChainInput};
pub use verify::{verify_chain, ChainRecord, IntegrityError};
