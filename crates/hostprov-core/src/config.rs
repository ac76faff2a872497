//! Configuration types for the provisioning system
//!
//! The configuration is built once at process start and shared immutably
//! (behind an `Arc`) by every component that needs it.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::DomainName;

/// Main provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    /// Directory under which one document root per domain is created
    #[serde(default = "default_hosting_root")]
    pub hosting_root: PathBuf,

    /// Proxy configuration directory holding every known virtual host
    #[serde(default = "default_sites_available")]
    pub sites_available: PathBuf,

    /// Proxy configuration directory holding links to the active virtual hosts
    #[serde(default = "default_sites_enabled")]
    pub sites_enabled: PathBuf,

    /// Where rendered virtual hosts are written before activation
    ///
    /// Must be writable by the daemon itself. Defaults to `sites_available`,
    /// or to the system temporary directory when a privilege wrapper moves
    /// the file into place. A directory on another filesystem than
    /// `sites_available` works but loses the atomic rename: the file is
    /// copied next to its target first.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Unix socket of the PHP process manager
    #[serde(default = "default_php_fpm_socket")]
    pub php_fpm_socket: PathBuf,

    /// Token the caller must publish in a TXT record
    pub verification_token: String,

    /// IPv4 address the domain's A record must point at
    pub server_ip: Ipv4Addr,

    /// Software bundle fetched into each new document root
    #[serde(default = "default_bundle_url")]
    pub bundle_url: String,

    /// File name the bundle is downloaded as
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    /// Account that owns the document root
    #[serde(default = "default_runtime_user")]
    pub runtime_user: String,

    /// Group that owns the document root
    #[serde(default = "default_runtime_group")]
    pub runtime_group: String,

    /// Octal mode applied recursively to the document root
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,

    /// Service manager unit of the reverse proxy
    #[serde(default = "default_proxy_service")]
    pub proxy_service: String,

    /// ACME client program
    #[serde(default = "default_acme_client")]
    pub acme_client: String,

    /// Local part of the contact address registered with the ACME server
    #[serde(default = "default_admin_contact")]
    pub admin_contact: String,

    /// Program every external command is wrapped in (e.g. `sudo`)
    #[serde(default)]
    pub privilege_wrapper: Option<String>,

    /// Issue a certificate as the last pipeline stage
    #[serde(default)]
    pub issue_certificate: bool,

    /// Per-step time budgets
    #[serde(default)]
    pub timeouts: StepTimeouts,
}

impl HostingConfig {
    /// Create a configuration with defaults for everything but the verification values
    pub fn new(verification_token: impl Into<String>, server_ip: Ipv4Addr) -> Self {
        Self {
            hosting_root: default_hosting_root(),
            sites_available: default_sites_available(),
            sites_enabled: default_sites_enabled(),
            staging_dir: None,
            php_fpm_socket: default_php_fpm_socket(),
            verification_token: verification_token.into(),
            server_ip,
            bundle_url: default_bundle_url(),
            archive_name: default_archive_name(),
            runtime_user: default_runtime_user(),
            runtime_group: default_runtime_group(),
            permission_mode: default_permission_mode(),
            proxy_service: default_proxy_service(),
            acme_client: default_acme_client(),
            admin_contact: default_admin_contact(),
            privilege_wrapper: None,
            issue_certificate: false,
            timeouts: StepTimeouts::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.verification_token.trim().is_empty() {
            return Err(crate::Error::config("Verification token cannot be empty"));
        }

        if self.server_ip.is_unspecified() {
            return Err(crate::Error::config("Server IP cannot be 0.0.0.0"));
        }

        for (name, path) in [
            ("hosting_root", &self.hosting_root),
            ("sites_available", &self.sites_available),
            ("sites_enabled", &self.sites_enabled),
            ("php_fpm_socket", &self.php_fpm_socket),
        ] {
            if !path.is_absolute() {
                return Err(crate::Error::config(format!(
                    "{} must be an absolute path, got {}",
                    name,
                    path.display()
                )));
            }
        }

        if !self.bundle_url.starts_with("https://") && !self.bundle_url.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "Bundle URL must use HTTP or HTTPS, got {}",
                self.bundle_url
            )));
        }

        if self.archive_name.is_empty()
            || self.archive_name.contains('/')
            || self.archive_name.starts_with('.')
        {
            return Err(crate::Error::config(format!(
                "Archive name must be a plain file name, got '{}'",
                self.archive_name
            )));
        }

        if self.permission_mode.is_empty()
            || self.permission_mode.len() > 4
            || !self.permission_mode.chars().all(|c| ('0'..='7').contains(&c))
        {
            return Err(crate::Error::config(format!(
                "Permission mode must be octal (e.g. 755), got '{}'",
                self.permission_mode
            )));
        }

        for (name, value) in [
            ("runtime_user", &self.runtime_user),
            ("runtime_group", &self.runtime_group),
            ("proxy_service", &self.proxy_service),
            ("acme_client", &self.acme_client),
            ("admin_contact", &self.admin_contact),
        ] {
            if value.trim().is_empty() {
                return Err(crate::Error::config(format!("{} cannot be empty", name)));
            }
        }

        self.timeouts.validate()
    }

    /// Document root for a domain
    pub fn document_root(&self, domain: &DomainName) -> PathBuf {
        self.hosting_root.join(domain.as_str())
    }

    /// Path of the downloaded bundle inside a document root
    pub fn archive_path(&self, document_root: &Path) -> PathBuf {
        document_root.join(&self.archive_name)
    }

    /// Active virtual host file for a domain
    pub fn available_site(&self, domain: &DomainName) -> PathBuf {
        self.sites_available.join(domain.as_str())
    }

    /// Enabled-site link for a domain
    pub fn enabled_site(&self, domain: &DomainName) -> PathBuf {
        self.sites_enabled.join(domain.as_str())
    }

    /// Staging file the virtual host is rendered into before activation
    pub fn staged_site(&self, domain: &DomainName) -> PathBuf {
        let dir = match (&self.staging_dir, &self.privilege_wrapper) {
            (Some(dir), _) => dir.clone(),
            (None, Some(_)) => std::env::temp_dir(),
            (None, None) => self.sites_available.clone(),
        };
        dir.join(format!(".{}.staged", domain))
    }

    /// Contact address registered with the ACME server
    pub fn contact_email(&self, domain: &DomainName) -> String {
        format!("{}@{}", self.admin_contact, domain)
    }

    /// URL the operator finishes the platform setup at
    pub fn setup_url(&self, domain: &DomainName) -> String {
        format!("http://{}/wp-admin/install.php", domain)
    }
}

/// Time budgets for external steps (in seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTimeouts {
    /// Bundle download
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,

    /// Archive extraction and cleanup
    #[serde(default = "default_extract_secs")]
    pub extract_secs: u64,

    /// Ownership and mode changes
    #[serde(default = "default_permissions_secs")]
    pub permissions_secs: u64,

    /// Proxy service reload
    #[serde(default = "default_reload_secs")]
    pub reload_secs: u64,

    /// Certificate issuance
    #[serde(default = "default_certificate_secs")]
    pub certificate_secs: u64,
}

impl StepTimeouts {
    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn extract(&self) -> Duration {
        Duration::from_secs(self.extract_secs)
    }

    pub fn permissions(&self) -> Duration {
        Duration::from_secs(self.permissions_secs)
    }

    pub fn reload(&self) -> Duration {
        Duration::from_secs(self.reload_secs)
    }

    pub fn certificate(&self) -> Duration {
        Duration::from_secs(self.certificate_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        for (name, secs) in [
            ("download", self.download_secs),
            ("extract", self.extract_secs),
            ("permissions", self.permissions_secs),
            ("reload", self.reload_secs),
            ("certificate", self.certificate_secs),
        ] {
            if secs == 0 {
                return Err(crate::Error::config(format!(
                    "{} timeout must be > 0",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            download_secs: default_download_secs(),
            extract_secs: default_extract_secs(),
            permissions_secs: default_permissions_secs(),
            reload_secs: default_reload_secs(),
            certificate_secs: default_certificate_secs(),
        }
    }
}

fn default_hosting_root() -> PathBuf {
    PathBuf::from("/var/www")
}

fn default_sites_available() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-available")
}

fn default_sites_enabled() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-enabled")
}

fn default_php_fpm_socket() -> PathBuf {
    PathBuf::from("/run/php/php7.4-fpm.sock")
}

fn default_bundle_url() -> String {
    "https://wordpress.org/latest.tar.gz".to_string()
}

fn default_archive_name() -> String {
    "latest.tar.gz".to_string()
}

fn default_runtime_user() -> String {
    "www-data".to_string()
}

fn default_runtime_group() -> String {
    "www-data".to_string()
}

fn default_permission_mode() -> String {
    "755".to_string()
}

fn default_proxy_service() -> String {
    "nginx".to_string()
}

fn default_acme_client() -> String {
    "certbot".to_string()
}

fn default_admin_contact() -> String {
    "admin".to_string()
}

fn default_download_secs() -> u64 {
    300
}

fn default_extract_secs() -> u64 {
    120
}

fn default_permissions_secs() -> u64 {
    60
}

fn default_reload_secs() -> u64 {
    30
}

fn default_certificate_secs() -> u64 {
    180
}
