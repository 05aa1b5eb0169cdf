//! Domain newtype used as the routing key for outbound mail.
//!
//! Domain names compare case-insensitively on the wire, so the value is
//! normalised once on construction: ASCII lowercase, surrounding whitespace
//! and a trailing root dot removed. Two spellings of the same domain always
//! produce equal `Domain`s and therefore land in the same delivery group.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// A normalised domain name.
///
/// ```
/// use emissary_common::Domain;
///
/// let domain = Domain::new("Mail.Example.COM.");
/// assert_eq!(domain.as_str(), "mail.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Domain(Arc<str>);

impl Domain {
    /// Create a new `Domain`, normalising the input.
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        let trimmed = s.as_ref().trim();
        let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
        Self(Arc::from(trimmed.to_ascii_lowercase()))
    }

    /// Extract the domain part of an address such as `user@example.com`.
    ///
    /// Returns `None` when the address has no domain part.
    #[must_use]
    pub fn of_address(address: &str) -> Option<Self> {
        crate::address::split(address).map(|(_, domain)| Self::new(domain))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Arc<str> {
        self.0
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_normalised() {
        assert_eq!(Domain::new("Example.COM").as_str(), "example.com");
        assert_eq!(Domain::new(" mx1.example.com. ").as_str(), "mx1.example.com");
    }

    #[test]
    fn test_domain_equality_ignores_case() {
        assert_eq!(Domain::new("EXAMPLE.com"), Domain::from("example.COM"));
        assert_ne!(Domain::new("example.com"), Domain::new("example.org"));
    }

    #[test]
    fn test_domain_of_address() {
        assert_eq!(
            Domain::of_address("User@Example.com"),
            Some(Domain::new("example.com"))
        );
        assert_eq!(Domain::of_address("postmaster"), None);
        assert_eq!(Domain::of_address("user@"), None);
    }

    #[test]
    fn test_domain_display_and_deref() {
        let domain = Domain::new("display.example.com");
        assert_eq!(format!("{domain}"), "display.example.com");
        assert_eq!(domain.len(), "display.example.com".len());
    }
}
