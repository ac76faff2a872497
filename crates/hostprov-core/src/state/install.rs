// # Install Store
//
// Reads the implicit installation record of a domain.
//
// ## Crash Behavior
//
// - A run that fails or crashes after creating the document root leaves it in
//   place. The next lookup reports the domain as installed and a retry
//   no-ops at the idempotency gate.
// - Nothing here ever deletes a document root.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

use crate::config::HostingConfig;
use crate::domain::DomainName;
use crate::Error;

/// An existing installation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InstallationRecord {
    /// The installed domain
    pub domain: DomainName,
    /// Its document root
    pub document_root: PathBuf,
    /// When the document root was created (if the filesystem reports it)
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Looks up installation records under the hosting root
#[derive(Debug, Clone)]
pub struct InstallStore {
    config: Arc<HostingConfig>,
}

impl InstallStore {
    pub fn new(config: Arc<HostingConfig>) -> Self {
        Self { config }
    }

    /// Get the installation record for a domain
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: the document root exists
    /// - `Ok(None)`: the domain has not been installed
    /// - `Err(Error)`: the hosting root could not be inspected
    pub async fn lookup(&self, domain: &DomainName) -> Result<Option<InstallationRecord>, Error> {
        let document_root = self.config.document_root(domain);

        match fs::symlink_metadata(&document_root).await {
            Ok(metadata) => {
                let created_at = metadata
                    .created()
                    .or_else(|_| metadata.modified())
                    .ok()
                    .map(chrono::DateTime::<chrono::Utc>::from);

                Ok(Some(InstallationRecord {
                    domain: domain.clone(),
                    document_root,
                    created_at,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Check whether a domain is installed
    pub async fn is_installed(&self, domain: &DomainName) -> Result<bool, Error> {
        Ok(self.lookup(domain).await?.is_some())
    }
}
