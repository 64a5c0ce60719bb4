use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{ErrorKind, Result};

/// A type-safe representation of a destination domain for throttling
/// purposes.
///
/// Extracts and normalizes hostnames from posting URLs so that all
/// applications against the same site share one set of limits, regardless
/// of URL casing or path.
///
/// # Examples
///
/// ```
/// use autoapply_lib::throttle::DomainKey;
/// use url::Url;
///
/// let url = Url::parse("https://Careers.Example.com/jobs/42").unwrap();
/// let key = DomainKey::try_from(&url).unwrap();
/// assert_eq!(key.as_str(), "careers.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainKey(String);

impl DomainKey {
    /// Get the domain as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the domain as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<&Url> for DomainKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| ErrorKind::MissingHost(url.clone()))?;

        // Normalize to lowercase for consistent lookup
        Ok(DomainKey(host.to_lowercase()))
    }
}

impl TryFrom<Url> for DomainKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self> {
        DomainKey::try_from(&url)
    }
}

impl From<&str> for DomainKey {
    fn from(domain: &str) -> Self {
        DomainKey(domain.to_lowercase())
    }
}

impl From<String> for DomainKey {
    fn from(domain: String) -> Self {
        DomainKey(domain.to_lowercase())
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
