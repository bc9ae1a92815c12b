//! Secret encryption schemes understood by the catalog and the proxy.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of a SCRAM-SHA-256 verifier as stored in `pg_authid`.
pub const SCRAM_PREFIX: &str = "SCRAM-SHA-256$";

static MD5_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^md5[0-9a-f]{32}$").expect("valid regex"));

/// Encoding applied to a principal's secret.
///
/// Serialized by its canonical name and parsed through [`FromStr`], so the
/// config file and `PGBSYNC_SCHEME` accept the same spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EncryptionScheme {
    /// SCRAM-SHA-256 challenge-response verifier.
    ScramSha256,
    /// Legacy `md5` digest.
    Md5,
    /// Cleartext secret.
    Plain,
}

impl EncryptionScheme {
    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionScheme::ScramSha256 => "scram-sha-256",
            EncryptionScheme::Md5 => "md5",
            EncryptionScheme::Plain => "plain",
        }
    }

    /// Recognize the scheme of a stored hash.
    ///
    /// Returns `None` for an empty value; anything that is neither a SCRAM
    /// verifier nor an md5 digest is treated as plaintext.
    pub fn detect(hash: &str) -> Option<Self> {
        if hash.is_empty() {
            None
        } else if hash.starts_with(SCRAM_PREFIX) {
            Some(EncryptionScheme::ScramSha256)
        } else if MD5_HASH.is_match(hash) {
            Some(EncryptionScheme::Md5)
        } else {
            Some(EncryptionScheme::Plain)
        }
    }

    /// Whether `hash` is encoded with this scheme.
    pub fn matches(&self, hash: &str) -> bool {
        Self::detect(hash) == Some(*self)
    }

    /// Value of the catalog's `password_encryption` setting for this scheme.
    ///
    /// The catalog cannot store cleartext secrets, so `Plain` has no setting.
    pub fn catalog_setting(&self) -> Option<&'static str> {
        match self {
            EncryptionScheme::ScramSha256 => Some("scram-sha-256"),
            EncryptionScheme::Md5 => Some("md5"),
            EncryptionScheme::Plain => None,
        }
    }

    /// Whether the catalog's `password_encryption` value selects this scheme.
    ///
    /// Older servers report `on` for md5.
    pub fn is_catalog_default(&self, setting: &str) -> bool {
        let setting = setting.trim().to_ascii_lowercase();
        match self {
            EncryptionScheme::ScramSha256 => setting == "scram-sha-256",
            EncryptionScheme::Md5 => setting == "md5" || setting == "on",
            EncryptionScheme::Plain => false,
        }
    }
}

impl Default for EncryptionScheme {
    fn default() -> Self {
        EncryptionScheme::ScramSha256
    }
}

impl fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a scheme name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown encryption scheme '{0}' (expected scram-sha-256, md5 or plain)")]
pub struct UnknownScheme(pub String);

impl FromStr for EncryptionScheme {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scram-sha-256" | "scram" => Ok(EncryptionScheme::ScramSha256),
            "md5" => Ok(EncryptionScheme::Md5),
            "plain" | "plaintext" => Ok(EncryptionScheme::Plain),
            other => Err(UnknownScheme(other.to_string())),
        }
    }
}

impl TryFrom<String> for EncryptionScheme {
    type Error = UnknownScheme;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EncryptionScheme> for String {
    fn from(scheme: EncryptionScheme) -> Self {
        scheme.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRAM: &str = "SCRAM-SHA-256$4096:c2FsdA==$c3RvcmVk:c2VydmVy";

    #[test]
    fn test_detect_scram() {
        assert_eq!(
            EncryptionScheme::detect(SCRAM),
            Some(EncryptionScheme::ScramSha256)
        );
    }

    #[test]
    fn test_detect_md5() {
        let hash = format!("md5{}", "a".repeat(32));
        assert_eq!(EncryptionScheme::detect(&hash), Some(EncryptionScheme::Md5));
    }

    #[test]
    fn test_short_md5_is_plaintext() {
        assert_eq!(
            EncryptionScheme::detect("md5abc"),
            Some(EncryptionScheme::Plain)
        );
    }

    #[test]
    fn test_detect_empty() {
        assert_eq!(EncryptionScheme::detect(""), None);
        assert!(!EncryptionScheme::Plain.matches(""));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "SCRAM-SHA-256".parse::<EncryptionScheme>().unwrap(),
            EncryptionScheme::ScramSha256
        );
        assert_eq!("md5".parse::<EncryptionScheme>().unwrap(), EncryptionScheme::Md5);
        assert_eq!(
            "plaintext".parse::<EncryptionScheme>().unwrap(),
            EncryptionScheme::Plain
        );
        assert!("sha1".parse::<EncryptionScheme>().is_err());
    }

    #[test]
    fn test_catalog_default() {
        assert!(EncryptionScheme::Md5.is_catalog_default("on"));
        assert!(EncryptionScheme::ScramSha256.is_catalog_default("scram-sha-256"));
        assert!(!EncryptionScheme::ScramSha256.is_catalog_default("md5"));
        assert!(EncryptionScheme::Plain.catalog_setting().is_none());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&EncryptionScheme::ScramSha256).unwrap();
        assert_eq!(json, "\"scram-sha-256\"");
        let parsed: EncryptionScheme = serde_json::from_str("\"scram\"").unwrap();
        assert_eq!(parsed, EncryptionScheme::ScramSha256);
    }

    #[test]
    fn test_serde_accepts_same_names_as_from_str() {
        for name in ["\"SCRAM-SHA-256\"", "\"scram\"", "\" Md5 \"", "\"PLAINTEXT\""] {
            let from_json: EncryptionScheme = serde_json::from_str(name).unwrap();
            let parsed: EncryptionScheme = name.trim_matches('"').parse().unwrap();
            assert_eq!(from_json, parsed);
        }
        assert!(serde_json::from_str::<EncryptionScheme>("\"sha1\"").is_err());
    }
}
