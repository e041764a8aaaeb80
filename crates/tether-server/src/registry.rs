//! Session registry: the authoritative username → connection table.
//!
//! The registry maintains bidirectional mappings: normalized username
//! to binding (for lookup and eviction on collision) and connection to
//! username (for cleanup on close). Uniqueness is case-insensitive.
//!
//! This is a pure structure with no locking of its own: the owning
//! driver serializes every mutation, so claim/evict/lookup are atomic
//! with respect to each other by construction. No other code can reach
//! the table.

use std::collections::HashMap;

use tether_crypto::SessionKey;

/// Maximum accepted username length in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// One live identity binding: the session established by the most
/// recent accepted claim for a username.
pub struct SessionBinding<I> {
    /// Username as claimed (original case, for display).
    pub username: String,
    /// Connection currently bound to the identity.
    pub connection_id: u64,
    /// Server-assigned identifier of this session generation.
    pub session_id: u64,
    /// Symmetric key of this generation. Superseded wholesale by each
    /// new accepted claim, never mutated.
    pub session_key: SessionKey,
    /// When the binding was established.
    pub created_at: I,
}

/// Outcome of a registration claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// A different live connection previously held the username and was
    /// unbound by this claim. The caller owes it a goodbye and a close.
    pub evicted: Option<u64>,
}

/// Username → session binding table.
#[derive(Default)]
pub struct SessionRegistry<I> {
    /// Normalized username → binding.
    bindings: HashMap<String, SessionBinding<I>>,
    /// Connection → normalized username (reverse index for cleanup).
    by_connection: HashMap<u64, String>,
}

/// Normalize a username for uniqueness comparison.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_ascii_lowercase()
}

/// Validate a claimed username. Malformed names are rejected terminally
/// at registration time.
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err("username must not be empty");
    }
    if trimmed.len() > MAX_USERNAME_LEN {
        return Err("username is too long");
    }
    if !trimmed.chars().all(|c| c.is_ascii_graphic()) {
        return Err("username must be printable ASCII without spaces");
    }

    Ok(())
}

impl<I: Copy> SessionRegistry<I> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { bindings: HashMap::new(), by_connection: HashMap::new() }
    }

    /// Apply a registration claim.
    ///
    /// - no existing binding: bind and accept;
    /// - same connection re-claiming: accept, superseding the session
    ///   key with the new generation;
    /// - different connection holding the name: unbind it ("last
    ///   registration wins"; the old connection is assumed dead or
    ///   abandoned; the liveness monitor bounds how long that
    ///   assumption can be wrong), then bind.
    ///
    /// A connection claiming a new name atomically releases any name it
    /// held before.
    pub fn claim(&mut self, binding: SessionBinding<I>) -> ClaimOutcome {
        let key = normalize_username(&binding.username);
        let connection_id = binding.connection_id;

        // A connection holds at most one identity.
        if let Some(previous) = self.by_connection.get(&connection_id) {
            if *previous != key {
                let previous = previous.clone();
                self.bindings.remove(&previous);
                self.by_connection.remove(&connection_id);
            }
        }

        let evicted = match self.bindings.get(&key) {
            Some(existing) if existing.connection_id != connection_id => {
                let evicted_connection = existing.connection_id;
                self.by_connection.remove(&evicted_connection);
                Some(evicted_connection)
            },
            _ => None,
        };

        self.bindings.insert(key.clone(), binding);
        self.by_connection.insert(connection_id, key);

        ClaimOutcome { evicted }
    }

    /// Drop the binding held by a connection (close or liveness expiry).
    ///
    /// Returns the released binding, and with it the session key,
    /// which is dropped (and zeroized) with the return value. Only the
    /// identity binding is affected; nothing else about the user is
    /// touched.
    pub fn release(&mut self, connection_id: u64) -> Option<SessionBinding<I>> {
        let key = self.by_connection.remove(&connection_id)?;
        self.bindings.remove(&key)
    }

    /// Look up the live binding for a username (case-insensitive).
    #[must_use]
    pub fn lookup(&self, username: &str) -> Option<&SessionBinding<I>> {
        self.bindings.get(&normalize_username(username))
    }

    /// Username bound to a connection, if any.
    #[must_use]
    pub fn username_for(&self, connection_id: u64) -> Option<&str> {
        self.binding_for(connection_id).map(|b| b.username.as_str())
    }

    /// The binding held by a connection, if any.
    #[must_use]
    pub fn binding_for(&self, connection_id: u64) -> Option<&SessionBinding<I>> {
        let key = self.by_connection.get(&connection_id)?;
        self.bindings.get(key)
    }

    /// Whether a connection holds a binding.
    #[must_use]
    pub fn is_bound(&self, connection_id: u64) -> bool {
        self.by_connection.contains_key(&connection_id)
    }

    /// All live bindings, in no particular order.
    pub fn bindings(&self) -> impl Iterator<Item = &SessionBinding<I>> {
        self.bindings.values()
    }

    /// Number of live bindings.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.bindings.len()
    }
}
