//! Validated domain names
//!
//! Every domain that reaches the filesystem or an external command argument
//! goes through [`DomainName::parse`] first. The accepted syntax is the
//! RFC 1035 host name subset: ASCII letters, digits and hyphens, labels of
//! 1..=63 characters that do not start or end with a hyphen, at least two
//! labels, 253 characters total.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum length of a domain name (RFC 1035)
const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of a single label (RFC 1035)
const MAX_LABEL_LEN: usize = 63;

/// A syntactically valid, lowercase domain name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    /// Validate and normalise a domain name
    ///
    /// Surrounding whitespace and a single trailing dot are stripped and the
    /// name is lowercased before validation.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
        let domain = trimmed.to_ascii_lowercase();

        if domain.is_empty() {
            return Err(Error::invalid_domain("domain name cannot be empty"));
        }

        if domain.len() > MAX_DOMAIN_LEN {
            return Err(Error::invalid_domain(format!(
                "domain name too long: {} chars (max {})",
                domain.len(),
                MAX_DOMAIN_LEN
            )));
        }

        let mut labels = 0usize;
        for label in domain.split('.') {
            labels += 1;

            if label.is_empty() {
                return Err(Error::invalid_domain(format!(
                    "domain name has empty label: '{}'",
                    domain
                )));
            }

            if label.len() > MAX_LABEL_LEN {
                return Err(Error::invalid_domain(format!(
                    "label too long: {} chars (max {}): '{}'",
                    label.len(),
                    MAX_LABEL_LEN,
                    label
                )));
            }

            if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(Error::invalid_domain(format!(
                    "label contains invalid characters: '{}' (letters, digits and hyphen only)",
                    label
                )));
            }

            if label.starts_with('-') || label.ends_with('-') {
                return Err(Error::invalid_domain(format!(
                    "label cannot start or end with hyphen: '{}'",
                    label
                )));
            }
        }

        if labels < 2 {
            return Err(Error::invalid_domain(format!(
                "'{}' is not a fully qualified domain name",
                domain
            )));
        }

        Ok(Self(domain))
    }

    /// Borrow the domain as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DomainName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DomainName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DomainName> for String {
    fn from(domain: DomainName) -> Self {
        domain.0
    }
}
