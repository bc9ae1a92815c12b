//! The individual steps of the extraction chain.

use async_trait::async_trait;

use super::{ExtractError, ExtractRequest, ExtractStrategy, HashSource};
use crate::authfile::parse_auth_file;
use crate::traits::CatalogClient;

fn non_empty(hash: Option<String>) -> Result<String, ExtractError> {
    match hash.map(|h| h.trim().to_string()) {
        Some(h) if !h.is_empty() => Ok(h),
        _ => Err(ExtractError::NotFound),
    }
}

/// Step 1: the stored hash from `pg_authid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectRead;

#[async_trait]
impl ExtractStrategy for DirectRead {
    fn source(&self) -> HashSource {
        HashSource::DirectRead
    }

    async fn attempt(
        &self,
        catalog: &dyn CatalogClient,
        request: &ExtractRequest<'_>,
    ) -> Result<String, ExtractError> {
        non_empty(catalog.read_stored_hash(request.username).await?)
    }
}

/// Step 2: re-hash the plaintext under the target scheme, then read again.
///
/// Forces the catalog-wide default scheme first when it disagrees with the
/// target. Both mutations are logged at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfHeal;

#[async_trait]
impl ExtractStrategy for SelfHeal {
    fn source(&self) -> HashSource {
        HashSource::SelfHeal
    }

    async fn attempt(
        &self,
        catalog: &dyn CatalogClient,
        request: &ExtractRequest<'_>,
    ) -> Result<String, ExtractError> {
        let plaintext = request
            .plaintext
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ExtractError::Unavailable("no plaintext credential".to_string()))?;
        let setting = request.target.catalog_setting().ok_or_else(|| {
            ExtractError::Unavailable(format!("the catalog cannot store {} secrets", request.target))
        })?;

        let current = catalog.default_scheme().await?;
        if !request.target.is_catalog_default(&current) {
            tracing::warn!(
                stage = "self_heal",
                "Mutation: forcing catalog password_encryption from '{}' to '{}'",
                current.trim(),
                setting
            );
            catalog.set_default_scheme(setting).await?;
        }

        tracing::warn!(
            stage = "self_heal",
            principal = %request.username,
            "Mutation: re-hashing credential as {}",
            setting
        );
        catalog
            .reset_credential(request.username, plaintext, setting)
            .await?;

        non_empty(catalog.read_stored_hash(request.username).await?)
    }
}

/// Step 3: the `pg_shadow` view.
#[derive(Debug, Default, Clone, Copy)]
pub struct BulkRead;

#[async_trait]
impl ExtractStrategy for BulkRead {
    fn source(&self) -> HashSource {
        HashSource::BulkRead
    }

    async fn attempt(
        &self,
        catalog: &dyn CatalogClient,
        request: &ExtractRequest<'_>,
    ) -> Result<String, ExtractError> {
        non_empty(catalog.read_shadow_hash(request.username).await?)
    }
}

/// Step 4: export the entry to a temporary auth file and parse it back.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExportedArtifact;

#[async_trait]
impl ExtractStrategy for ExportedArtifact {
    fn source(&self) -> HashSource {
        HashSource::ExportedArtifact
    }

    async fn attempt(
        &self,
        catalog: &dyn CatalogClient,
        request: &ExtractRequest<'_>,
    ) -> Result<String, ExtractError> {
        // Removed on drop.
        let artifact = tempfile::Builder::new()
            .prefix("pgbsync-export-")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| ExtractError::Unavailable(format!("cannot create export file: {}", e)))?;

        catalog.export_entry(request.username, artifact.path()).await?;

        let contents = tokio::fs::read_to_string(artifact.path())
            .await
            .map_err(|e| ExtractError::Unavailable(format!("cannot read export file: {}", e)))?;
        let parsed = parse_auth_file(&contents);
        non_empty(parsed.entries.get(request.username).cloned())
    }
}

/// Step 5: the plaintext itself, flagged insecure.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextFallback;

#[async_trait]
impl ExtractStrategy for PlaintextFallback {
    fn source(&self) -> HashSource {
        HashSource::PlaintextFallback
    }

    async fn attempt(
        &self,
        _catalog: &dyn CatalogClient,
        request: &ExtractRequest<'_>,
    ) -> Result<String, ExtractError> {
        request
            .plaintext
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ExtractError::Unavailable("no plaintext credential".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockCatalog;
    use crate::models::EncryptionScheme;

    fn request<'a>(username: &'a str, plaintext: Option<&'a str>) -> ExtractRequest<'a> {
        ExtractRequest {
            username,
            target: EncryptionScheme::ScramSha256,
            plaintext,
        }
    }

    #[tokio::test]
    async fn test_direct_read_missing_role() {
        let catalog = MockCatalog::new();
        let err = DirectRead
            .attempt(&catalog, &request("ghost", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound));
    }

    #[tokio::test]
    async fn test_self_heal_needs_plaintext() {
        let catalog = MockCatalog::new();
        catalog.create_role("postgres", Some("pw"), true);
        let err = SelfHeal
            .attempt(&catalog, &request("postgres", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unavailable(_)));
        assert!(catalog.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_self_heal_keeps_matching_default() {
        let catalog = MockCatalog::new();
        catalog.insert_raw("postgres", Some("md5ffffffffffffffffffffffffffffffff"), true);

        let hash = SelfHeal
            .attempt(&catalog, &request("postgres", Some("pw")))
            .await
            .unwrap();
        assert!(EncryptionScheme::ScramSha256.matches(&hash));
        assert_eq!(
            catalog.mutations(),
            vec!["reset_credential postgres scram-sha-256"]
        );
    }

    #[tokio::test]
    async fn test_exported_artifact_round_trip() {
        let catalog = MockCatalog::new();
        catalog.create_role("we\"ird", Some("pw"), true);
        catalog.set_hide_direct_reads(true);

        let hash = ExportedArtifact
            .attempt(&catalog, &request("we\"ird", None))
            .await
            .unwrap();
        assert_eq!(Some(hash), catalog.stored_hash("we\"ird"));
    }

    #[tokio::test]
    async fn test_plaintext_fallback_requires_plaintext() {
        let catalog = MockCatalog::new();
        assert!(PlaintextFallback
            .attempt(&catalog, &request("x", Some("")))
            .await
            .is_err());
        assert_eq!(
            PlaintextFallback
                .attempt(&catalog, &request("x", Some("pw")))
                .await
                .unwrap(),
            "pw"
        );
    }
}
