//! Domain ownership verification
//!
//! Two checks gate provisioning:
//!
//! - **Ownership**: a TXT record at the domain contains the configured token.
//! - **Address**: an A record at the domain equals the configured server IP.
//!
//! Results are never cached; every call issues a live lookup. A lookup that
//! fails counts as a negative result. The failure is logged and kept apart in
//! [`DnsCheck::LookupFailed`], but the boolean checks collapse it into `false`.

use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::DomainName;
use crate::traits::DnsLookup;

/// Outcome of one DNS check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsCheck {
    /// The required value is published
    Verified,
    /// The lookup answered, but without the required value
    Missing,
    /// The lookup itself failed
    LookupFailed(String),
}

impl DnsCheck {
    pub fn is_verified(&self) -> bool {
        matches!(self, DnsCheck::Verified)
    }
}

/// Both verification results for a domain, computed fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationState {
    pub txt_verified: bool,
    pub a_record_verified: bool,
}

impl VerificationState {
    pub fn is_verified(&self) -> bool {
        self.txt_verified && self.a_record_verified
    }
}

/// Checks TXT and A records against the configured values
#[derive(Clone)]
pub struct DomainVerifier {
    lookup: Arc<dyn DnsLookup>,
    token: String,
    server_ip: Ipv4Addr,
}

impl DomainVerifier {
    /// Create a verifier
    ///
    /// # Parameters
    ///
    /// - `lookup`: DNS backend
    /// - `token`: string that must appear in one of the domain's TXT records
    /// - `server_ip`: address the domain's A record must equal
    pub fn new(lookup: Arc<dyn DnsLookup>, token: impl Into<String>, server_ip: Ipv4Addr) -> Self {
        Self {
            lookup,
            token: token.into(),
            server_ip,
        }
    }

    /// The token callers must publish
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The address callers must point their A record at
    pub fn server_ip(&self) -> Ipv4Addr {
        self.server_ip
    }

    /// Check the TXT records of `domain` for the ownership token
    pub async fn ownership(&self, domain: &DomainName) -> DnsCheck {
        match self.lookup.txt_records(domain).await {
            Ok(records) => {
                debug!(%domain, count = records.len(), "TXT lookup answered");
                if records.iter().any(|record| record.contains(&self.token)) {
                    DnsCheck::Verified
                } else {
                    DnsCheck::Missing
                }
            }
            Err(e) => {
                warn!(%domain, backend = self.lookup.backend_name(), error = %e, "TXT lookup failed");
                DnsCheck::LookupFailed(e.to_string())
            }
        }
    }

    /// Check the A records of `domain` for the server address
    pub async fn address(&self, domain: &DomainName) -> DnsCheck {
        match self.lookup.a_records(domain).await {
            Ok(records) => {
                debug!(%domain, ?records, "A lookup answered");
                if records.contains(&self.server_ip) {
                    DnsCheck::Verified
                } else {
                    DnsCheck::Missing
                }
            }
            Err(e) => {
                warn!(%domain, backend = self.lookup.backend_name(), error = %e, "A lookup failed");
                DnsCheck::LookupFailed(e.to_string())
            }
        }
    }

    /// `true` iff the ownership token is published
    pub async fn check_ownership_token(&self, domain: &DomainName) -> bool {
        self.ownership(domain).await.is_verified()
    }

    /// `true` iff the A record points at the server
    pub async fn check_address_record(&self, domain: &DomainName) -> bool {
        self.address(domain).await.is_verified()
    }

    /// Run both checks
    pub async fn verify(&self, domain: &DomainName) -> VerificationState {
        VerificationState {
            txt_verified: self.check_ownership_token(domain).await,
            a_record_verified: self.check_address_record(domain).await,
        }
    }
}
