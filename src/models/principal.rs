//! Database login identities as observed in the authentication catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scheme::EncryptionScheme;

/// A database login identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Unique role name.
    pub username: String,
    /// Stored secret hash; empty when the role has no password.
    pub hash: String,
    /// Whether the role may log in.
    pub can_login: bool,
    /// Password expiry, if any.
    pub valid_until: Option<DateTime<Utc>>,
    /// When this principal was read from the catalog.
    pub last_observed: DateTime<Utc>,
}

impl Principal {
    /// Create a login-state principal observed now.
    pub fn new(username: impl Into<String>, hash: impl Into<String>, can_login: bool) -> Self {
        Self {
            username: username.into(),
            hash: hash.into(),
            can_login,
            valid_until: None,
            last_observed: Utc::now(),
        }
    }

    /// Set the password expiry.
    pub fn with_valid_until(mut self, valid_until: Option<DateTime<Utc>>) -> Self {
        self.valid_until = valid_until;
        self
    }

    /// Set the observation timestamp.
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_observed = at;
        self
    }

    /// Whether a secret hash is present.
    pub fn has_hash(&self) -> bool {
        !self.hash.is_empty()
    }

    /// Scheme the stored hash is encoded with.
    pub fn scheme(&self) -> Option<EncryptionScheme> {
        EncryptionScheme::detect(&self.hash)
    }

    /// Whether any field relevant to the auth file differs.
    ///
    /// `last_observed` changes on every poll and is not compared.
    pub fn differs_from(&self, other: &Principal) -> bool {
        self.hash != other.hash
            || self.can_login != other.can_login
            || self.valid_until != other.valid_until
    }
}
