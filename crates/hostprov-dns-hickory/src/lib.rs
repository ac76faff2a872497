// # Hickory DNS Lookup
//
// DNS lookup backend built on `hickory-resolver`.
//
// ## Behaviour
//
// - Every call is a live query: the resolver cache is disabled
// - NXDOMAIN and "no records" answers are an empty list, not an error
// - Timeouts and server failures are `Error::Dns`
// - Names are queried fully qualified so no search domain is appended
//
// ## Configuration
//
// Nameservers are optional. Without any, the resolver's built-in public
// defaults are used.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{ResolveError, Resolver, TokioResolver};
use hostprov_core::traits::DnsLookup;
use hostprov_core::{DomainName, Error, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::{debug, trace};

/// Resolver settings
#[derive(Debug, Clone)]
pub struct HickoryConfig {
    /// Nameservers to query (empty = resolver defaults)
    pub nameservers: Vec<IpAddr>,
    /// UDP port the nameservers listen on
    pub port: u16,
    /// Per-query timeout
    pub timeout: Duration,
    /// Attempts per query before giving up
    pub attempts: usize,
}

impl Default for HickoryConfig {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            port: 53,
            timeout: Duration::from_secs(5),
            attempts: 2,
        }
    }
}

/// Uncached DNS lookups through hickory
#[derive(Debug)]
pub struct HickoryLookup {
    resolver: TokioResolver,
}

impl HickoryLookup {
    /// Build a resolver from `config`
    pub fn new(config: &HickoryConfig) -> Self {
        let resolver_config = if config.nameservers.is_empty() {
            ResolverConfig::default()
        } else {
            let mut resolver_config = ResolverConfig::new();
            for ip in &config.nameservers {
                resolver_config
                    .add_name_server(NameServerConfig::new(SocketAddr::new(*ip, config.port), Protocol::Udp));
            }
            resolver_config
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = config.timeout;
        opts.attempts = config.attempts;
        opts.cache_size = 0;

        let resolver =
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        debug!(
            nameservers = ?config.nameservers,
            timeout_secs = config.timeout.as_secs(),
            "DNS resolver ready"
        );
        Self { resolver }
    }
}

#[async_trait]
impl DnsLookup for HickoryLookup {
    async fn txt_records(&self, domain: &DomainName) -> Result<Vec<String>> {
        let name = fqdn(domain);
        match self.resolver.txt_lookup(name.as_str()).await {
            Ok(lookup) => {
                let records: Vec<String> = lookup
                    .iter()
                    .map(|txt| {
                        // One record may be split into several character strings
                        txt.txt_data()
                            .iter()
                            .map(|data| String::from_utf8_lossy(data))
                            .collect()
                    })
                    .collect();
                trace!(%domain, ?records, "TXT answer");
                Ok(records)
            }
            Err(e) if is_empty_answer(&e) => Ok(Vec::new()),
            Err(e) => Err(Error::dns(format!("TXT lookup for {} failed: {}", domain, e))),
        }
    }

    async fn a_records(&self, domain: &DomainName) -> Result<Vec<Ipv4Addr>> {
        let name = fqdn(domain);
        match self.resolver.ipv4_lookup(name.as_str()).await {
            Ok(lookup) => {
                let records: Vec<Ipv4Addr> = lookup.iter().map(|a| a.0).collect();
                trace!(%domain, ?records, "A answer");
                Ok(records)
            }
            Err(e) if is_empty_answer(&e) => Ok(Vec::new()),
            Err(e) => Err(Error::dns(format!("A lookup for {} failed: {}", domain, e))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "hickory"
    }
}

fn fqdn(domain: &DomainName) -> String {
    format!("{}.", domain)
}

/// NXDOMAIN and NOERROR-without-data both mean "nothing published"
fn is_empty_answer(error: &ResolveError) -> bool {
    error.is_nx_domain() || error.is_no_records_found()
}
