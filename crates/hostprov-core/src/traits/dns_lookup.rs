// # DNS Lookup Trait
//
// Defines the single external lookup capability the verifier relies on.
//
// ## Implementations
//
// - Hickory resolver: `hostprov-dns-hickory` crate
// - Test doubles: `tests/common/mod.rs`
//
// ## Usage
//
// ```rust,ignore
// use hostprov_core::{DnsLookup, DomainName};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let lookup = /* DnsLookup implementation */;
//     let domain = DomainName::parse("example.com")?;
//
//     for record in lookup.txt_records(&domain).await? {
//         println!("TXT {}", record);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

use crate::domain::DomainName;

/// Trait for DNS lookup backends
///
/// # Contract
///
/// - A name with no records of the requested type yields `Ok(vec![])`, not an error.
/// - Transport failures, timeouts and malformed responses yield `Err(Error::Dns)`.
/// - Every call performs a live query. Implementations must not cache answers
///   between calls, since verification results are derived fresh per request.
/// - No retries. The verifier treats a failed lookup as a negative result and
///   the caller decides whether to ask again.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Fetch all TXT records published at `name`
    ///
    /// Records made of several character-strings are returned concatenated.
    async fn txt_records(&self, name: &DomainName) -> Result<Vec<String>, crate::Error>;

    /// Fetch all A records published at `name`
    async fn a_records(&self, name: &DomainName) -> Result<Vec<Ipv4Addr>, crate::Error>;

    /// Get the backend name (for logging/debugging)
    fn backend_name(&self) -> &'static str;
}
