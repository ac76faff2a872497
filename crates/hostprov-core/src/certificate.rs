//! TLS certificate issuance through an external ACME client

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::HostingConfig;
use crate::domain::DomainName;
use crate::error::Result;
use crate::traits::{CommandExecutor, CommandSpec};
use crate::vhost::VirtualHostWriter;

/// Requests a certificate for an active virtual host
#[derive(Clone)]
pub struct CertificateIssuer {
    config: Arc<HostingConfig>,
    executor: Arc<dyn CommandExecutor>,
    vhost: VirtualHostWriter,
}

impl CertificateIssuer {
    pub fn new(
        config: Arc<HostingConfig>,
        executor: Arc<dyn CommandExecutor>,
        vhost: VirtualHostWriter,
    ) -> Self {
        Self {
            config,
            executor,
            vhost,
        }
    }

    /// The ACME client invocation for `domain`
    ///
    /// Non-interactive, terms agreed, contact `<admin_contact>@<domain>`.
    pub fn command(&self, domain: &DomainName) -> CommandSpec {
        CommandSpec::new(self.config.acme_client.clone())
            .arg("--nginx")
            .arg("-d")
            .arg(domain.as_str())
            .arg("--non-interactive")
            .arg("--agree-tos")
            .arg("-m")
            .arg(self.config.contact_email(domain))
            .wrapped(self.config.privilege_wrapper.as_deref())
    }

    /// Issue a certificate, then reload the proxy
    pub async fn issue(&self, domain: &DomainName, cancel: &CancellationToken) -> Result<()> {
        self.executor
            .run(&self.command(domain), self.config.timeouts.certificate(), cancel)
            .await?;
        self.vhost.reload(cancel).await?;
        info!(%domain, "Certificate issued");
        Ok(())
    }
}
