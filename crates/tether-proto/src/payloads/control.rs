//! Out-of-band control payloads: key retrieval and health probing.
//!
//! Both exchanges run over short-lived connections that never register
//! an identity: the key lookup in particular has to work before any
//! session exists.

use serde::{Deserialize, Serialize};

/// Server public key in textual encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyResponse {
    /// Base64-encoded X25519 public key.
    pub public_key: String,
}

/// Health probe response for external monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Whether the process considers itself healthy.
    pub healthy: bool,
}
