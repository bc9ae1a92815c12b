//! Secret hash extraction with an ordered fallback chain.
//!
//! A [`HashExtractor`] tries each [`ExtractStrategy`] in turn and returns the
//! first hash encoded with the target scheme. The full chain is:
//!
//! | Step | Strategy | Mutates catalog |
//! |------|----------|-----------------|
//! | 1 | [`DirectRead`] (`pg_authid`) | no |
//! | 2 | [`SelfHeal`] (force scheme, re-hash plaintext) | yes |
//! | 3 | [`BulkRead`] (`pg_shadow`) | no |
//! | 4 | [`ExportedArtifact`] (`COPY` to a temp auth file) | no |
//! | 5 | [`PlaintextFallback`] (opt-in, insecure) | no |
//!
//! The snapshotter uses the read-only chain (1, 3, 4) without plaintext.

mod strategies;

use async_trait::async_trait;
use std::fmt;

pub use strategies::{BulkRead, DirectRead, ExportedArtifact, PlaintextFallback, SelfHeal};

use crate::error::{SyncError, SyncResult};
use crate::models::EncryptionScheme;
use crate::traits::CatalogClient;

/// What to extract.
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub username: &'a str,
    pub target: EncryptionScheme,
    /// Only ever available for the bootstrap principal.
    pub plaintext: Option<&'a str>,
}

impl<'a> ExtractRequest<'a> {
    pub fn new(username: &'a str, target: EncryptionScheme) -> Self {
        Self {
            username,
            target,
            plaintext: None,
        }
    }

    pub fn with_plaintext(mut self, plaintext: Option<&'a str>) -> Self {
        self.plaintext = plaintext;
        self
    }
}

/// Which step produced a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashSource {
    DirectRead,
    SelfHeal,
    BulkRead,
    ExportedArtifact,
    PlaintextFallback,
}

impl HashSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashSource::DirectRead => "direct_read",
            HashSource::SelfHeal => "self_heal",
            HashSource::BulkRead => "bulk_read",
            HashSource::ExportedArtifact => "exported_artifact",
            HashSource::PlaintextFallback => "plaintext_fallback",
        }
    }
}

impl fmt::Display for HashSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proxy-ready hash for one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedHash {
    pub username: String,
    pub hash: String,
    pub scheme: EncryptionScheme,
    pub source: HashSource,
    /// Set when the "hash" is the plaintext secret itself.
    pub insecure: bool,
}

/// Failure of a single step.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no hash stored")]
    NotFound,
    #[error("hash is {}, not the target scheme", .found.map(|s| s.as_str()).unwrap_or("empty"))]
    Mismatch { found: Option<EncryptionScheme> },
    #[error("skipped: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Catalog(#[from] SyncError),
}

/// One step of the chain.
#[async_trait]
pub trait ExtractStrategy: Send + Sync {
    fn source(&self) -> HashSource;

    /// Produce a candidate hash. Scheme validation is done by the caller.
    async fn attempt(
        &self,
        catalog: &dyn CatalogClient,
        request: &ExtractRequest<'_>,
    ) -> Result<String, ExtractError>;
}

/// Ordered fallback chain of extraction strategies.
pub struct HashExtractor {
    strategies: Vec<Box<dyn ExtractStrategy>>,
}

impl fmt::Debug for HashExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.source()))
            .finish()
    }
}

impl HashExtractor {
    pub fn new(strategies: Vec<Box<dyn ExtractStrategy>>) -> Self {
        Self { strategies }
    }

    /// Every step, for the bootstrap path.
    ///
    /// The plaintext step is only present when `allow_plaintext` is set.
    pub fn full_chain(allow_plaintext: bool) -> Self {
        let mut strategies: Vec<Box<dyn ExtractStrategy>> = vec![
            Box::new(DirectRead),
            Box::new(SelfHeal),
            Box::new(BulkRead),
            Box::new(ExportedArtifact),
        ];
        if allow_plaintext {
            strategies.push(Box::new(PlaintextFallback));
        }
        Self::new(strategies)
    }

    /// Non-mutating steps only.
    pub fn read_only() -> Self {
        Self::new(vec![
            Box::new(DirectRead),
            Box::new(BulkRead),
            Box::new(ExportedArtifact),
        ])
    }

    pub fn sources(&self) -> Vec<HashSource> {
        self.strategies.iter().map(|s| s.source()).collect()
    }

    /// Run the chain until a step yields a hash in the target scheme.
    ///
    /// Fails with [`SyncError::Extraction`] listing every step's cause when
    /// no step succeeds.
    pub async fn extract(
        &self,
        catalog: &dyn CatalogClient,
        request: &ExtractRequest<'_>,
    ) -> SyncResult<ExtractedHash> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let source = strategy.source();
            let result = match strategy.attempt(catalog, request).await {
                Ok(hash) if source == HashSource::PlaintextFallback => {
                    tracing::warn!(
                        principal = %request.username,
                        "Using the plaintext credential as the auth file secret (insecure)"
                    );
                    return Ok(ExtractedHash {
                        username: request.username.to_string(),
                        hash,
                        scheme: EncryptionScheme::Plain,
                        source,
                        insecure: true,
                    });
                }
                Ok(hash) if request.target.matches(&hash) => {
                    tracing::debug!(principal = %request.username, "Extracted hash via {}", source);
                    return Ok(ExtractedHash {
                        username: request.username.to_string(),
                        hash,
                        scheme: request.target,
                        source,
                        insecure: false,
                    });
                }
                Ok(hash) => ExtractError::Mismatch {
                    found: EncryptionScheme::detect(&hash),
                },
                Err(e) => e,
            };

            tracing::debug!(principal = %request.username, "{} failed: {}", source, result);
            attempts.push(format!("{}: {}", source, result));
        }

        Err(SyncError::Extraction {
            username: request.username.to_string(),
            target: request.target,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockCatalog;

    #[test]
    fn test_chain_composition() {
        assert_eq!(
            HashExtractor::full_chain(false).sources(),
            vec![
                HashSource::DirectRead,
                HashSource::SelfHeal,
                HashSource::BulkRead,
                HashSource::ExportedArtifact
            ]
        );
        assert_eq!(
            HashExtractor::full_chain(true).sources().last(),
            Some(&HashSource::PlaintextFallback)
        );
        assert!(!HashExtractor::read_only()
            .sources()
            .contains(&HashSource::SelfHeal));
    }

    #[tokio::test]
    async fn test_direct_read_wins_when_matching() {
        let catalog = MockCatalog::new();
        catalog.create_role("app", Some("pw"), true);

        let extracted = HashExtractor::full_chain(false)
            .extract(&catalog, &ExtractRequest::new("app", EncryptionScheme::ScramSha256))
            .await
            .unwrap();
        assert_eq!(extracted.source, HashSource::DirectRead);
        assert!(!extracted.insecure);
        assert!(catalog.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_self_heal_forces_scheme_and_rehashes() {
        let catalog = MockCatalog::new();
        catalog.set_default_scheme_setting("md5");
        catalog.create_role("postgres", Some("pw"), true);

        let request =
            ExtractRequest::new("postgres", EncryptionScheme::ScramSha256).with_plaintext(Some("pw"));
        let extracted = HashExtractor::full_chain(false)
            .extract(&catalog, &request)
            .await
            .unwrap();

        assert_eq!(extracted.source, HashSource::SelfHeal);
        assert!(extracted.hash.starts_with("SCRAM-SHA-256$"));
        assert_eq!(catalog.default_scheme_setting(), "scram-sha-256");
        assert_eq!(
            catalog.mutations(),
            vec![
                "set_default_scheme scram-sha-256",
                "reset_credential postgres scram-sha-256"
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_read_covers_empty_direct_read() {
        let catalog = MockCatalog::new();
        catalog.create_role("app", Some("pw"), true);
        catalog.set_hide_direct_reads(true);

        let extracted = HashExtractor::read_only()
            .extract(&catalog, &ExtractRequest::new("app", EncryptionScheme::ScramSha256))
            .await
            .unwrap();
        assert_eq!(extracted.source, HashSource::BulkRead);
    }

    #[tokio::test]
    async fn test_export_is_last_read_path() {
        let catalog = MockCatalog::new();
        catalog.create_role("app", Some("pw"), true);
        catalog.set_hide_direct_reads(true);
        catalog.set_shadow_unavailable(true);

        let extracted = HashExtractor::read_only()
            .extract(&catalog, &ExtractRequest::new("app", EncryptionScheme::ScramSha256))
            .await
            .unwrap();
        assert_eq!(extracted.source, HashSource::ExportedArtifact);
    }

    #[tokio::test]
    async fn test_all_steps_fail_lists_causes() {
        let catalog = MockCatalog::new();
        catalog.set_default_scheme_setting("md5");
        catalog.create_role("legacy", Some("pw"), true);

        let err = HashExtractor::full_chain(false)
            .extract(&catalog, &ExtractRequest::new("legacy", EncryptionScheme::ScramSha256))
            .await
            .unwrap_err();

        match err {
            SyncError::Extraction { attempts, .. } => {
                assert_eq!(attempts.len(), 4);
                assert!(attempts[0].starts_with("direct_read: hash is md5"));
                assert!(attempts[1].starts_with("self_heal: skipped"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(catalog.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_plaintext_fallback_only_when_allowed() {
        let catalog = MockCatalog::new();
        catalog.create_role("postgres", Some("pw"), true);
        catalog.set_deny_privilege(true);
        catalog.set_mutations_fail(true);
        catalog.set_shadow_unavailable(true);

        let request =
            ExtractRequest::new("postgres", EncryptionScheme::ScramSha256).with_plaintext(Some("pw"));

        assert!(HashExtractor::full_chain(false)
            .extract(&catalog, &request)
            .await
            .is_err());

        let extracted = HashExtractor::full_chain(true)
            .extract(&catalog, &request)
            .await
            .unwrap();
        assert!(extracted.insecure);
        assert_eq!(extracted.hash, "pw");
        assert_eq!(extracted.source, HashSource::PlaintextFallback);
    }
}
