//! Daemon configuration from `HOSTPROV_*` environment variables

use anyhow::{Context, Result};
use hostprov_core::HostingConfig;
use hostprov_dns_hickory::HickoryConfig;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Application configuration
pub struct Config {
    pub hosting: HostingConfig,
    pub dns: HickoryConfig,
    pub listen_addr: SocketAddr,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = var("HOSTPROV_VERIFICATION_TOKEN").unwrap_or_default();
        let server_ip = match var("HOSTPROV_SERVER_IP") {
            Some(raw) => parse::<Ipv4Addr>("HOSTPROV_SERVER_IP", &raw)?,
            None => anyhow::bail!(
                "HOSTPROV_SERVER_IP is required. \
                Set it via: export HOSTPROV_SERVER_IP=<public IPv4 of this server>"
            ),
        };

        let mut hosting = HostingConfig::new(token, server_ip);

        if let Some(path) = var("HOSTPROV_HOSTING_ROOT") {
            hosting.hosting_root = PathBuf::from(path);
        }
        if let Some(path) = var("HOSTPROV_SITES_AVAILABLE") {
            hosting.sites_available = PathBuf::from(path);
        }
        if let Some(path) = var("HOSTPROV_SITES_ENABLED") {
            hosting.sites_enabled = PathBuf::from(path);
        }
        hosting.staging_dir = var("HOSTPROV_STAGING_DIR").map(PathBuf::from);
        if let Some(path) = var("HOSTPROV_PHP_FPM_SOCKET") {
            hosting.php_fpm_socket = PathBuf::from(path);
        }
        if let Some(url) = var("HOSTPROV_BUNDLE_URL") {
            hosting.bundle_url = url;
        }
        if let Some(user) = var("HOSTPROV_RUNTIME_USER") {
            hosting.runtime_user = user;
        }
        if let Some(group) = var("HOSTPROV_RUNTIME_GROUP") {
            hosting.runtime_group = group;
        }
        if let Some(mode) = var("HOSTPROV_PERMISSION_MODE") {
            hosting.permission_mode = mode;
        }
        if let Some(service) = var("HOSTPROV_PROXY_SERVICE") {
            hosting.proxy_service = service;
        }
        if let Some(client) = var("HOSTPROV_ACME_CLIENT") {
            hosting.acme_client = client;
        }
        if let Some(contact) = var("HOSTPROV_ADMIN_CONTACT") {
            hosting.admin_contact = contact;
        }
        hosting.privilege_wrapper = var("HOSTPROV_PRIVILEGE_WRAPPER").filter(|w| !w.is_empty());
        if let Some(raw) = var("HOSTPROV_ISSUE_CERTIFICATE") {
            hosting.issue_certificate = parse_bool("HOSTPROV_ISSUE_CERTIFICATE", &raw)?;
        }

        let timeouts = &mut hosting.timeouts;
        for (key, slot) in [
            ("HOSTPROV_DOWNLOAD_TIMEOUT_SECS", &mut timeouts.download_secs),
            ("HOSTPROV_EXTRACT_TIMEOUT_SECS", &mut timeouts.extract_secs),
            ("HOSTPROV_PERMISSIONS_TIMEOUT_SECS", &mut timeouts.permissions_secs),
            ("HOSTPROV_RELOAD_TIMEOUT_SECS", &mut timeouts.reload_secs),
            ("HOSTPROV_CERTIFICATE_TIMEOUT_SECS", &mut timeouts.certificate_secs),
        ] {
            if let Some(raw) = var(key) {
                *slot = parse(key, &raw)?;
            }
        }

        let mut dns = HickoryConfig::default();
        if let Some(raw) = var("HOSTPROV_DNS_NAMESERVERS") {
            dns.nameservers = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse::<IpAddr>("HOSTPROV_DNS_NAMESERVERS", s))
                .collect::<Result<_>>()?;
        }
        if let Some(raw) = var("HOSTPROV_DNS_TIMEOUT_SECS") {
            dns.timeout = Duration::from_secs(parse("HOSTPROV_DNS_TIMEOUT_SECS", &raw)?);
        }

        let listen_addr = parse(
            "HOSTPROV_LISTEN_ADDR",
            &var("HOSTPROV_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        )?;

        Ok(Self {
            hosting,
            dns,
            listen_addr,
            log_level: var("HOSTPROV_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let token = &self.hosting.verification_token;
        if token.trim().is_empty() {
            anyhow::bail!(
                "HOSTPROV_VERIFICATION_TOKEN is required. \
                Set it via: export HOSTPROV_VERIFICATION_TOKEN=<token customers publish in TXT>"
            );
        }

        // Catch copy-pasted placeholders
        let token_lower = token.to_lowercase();
        if token_lower.contains("your_token") || token_lower.contains("replace_me") {
            anyhow::bail!(
                "HOSTPROV_VERIFICATION_TOKEN appears to be a placeholder. \
                Choose the token customers will publish."
            );
        }

        if self.dns.timeout.is_zero() {
            anyhow::bail!("HOSTPROV_DNS_TIMEOUT_SECS must be greater than 0");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "HOSTPROV_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.hosting
            .validate()
            .context("Check the HOSTPROV_* layout and provisioning variables")?;

        Ok(())
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("HOSTPROV_VERIFICATION_TOKEN", "hostprov-verify-7f3a"),
        ("HOSTPROV_SERVER_IP", "203.0.113.10"),
    ];

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = load(&REQUIRED).unwrap();
        config.validate().unwrap();

        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.hosting.hosting_root, PathBuf::from("/var/www"));
        assert_eq!(config.hosting.server_ip, Ipv4Addr::new(203, 0, 113, 10));
        assert!(config.hosting.privilege_wrapper.is_none());
        assert!(!config.hosting.issue_certificate);
        assert!(config.dns.nameservers.is_empty());
    }

    #[test]
    fn overrides_are_applied() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("HOSTPROV_PRIVILEGE_WRAPPER", "sudo"),
            ("HOSTPROV_ISSUE_CERTIFICATE", "yes"),
            ("HOSTPROV_DOWNLOAD_TIMEOUT_SECS", "42"),
            ("HOSTPROV_DNS_NAMESERVERS", "1.1.1.1, 9.9.9.9"),
            ("HOSTPROV_LISTEN_ADDR", "0.0.0.0:9000"),
        ]);
        let config = load(&vars).unwrap();
        config.validate().unwrap();

        assert_eq!(config.hosting.privilege_wrapper.as_deref(), Some("sudo"));
        assert!(config.hosting.issue_certificate);
        assert_eq!(config.hosting.timeouts.download_secs, 42);
        assert_eq!(config.dns.nameservers.len(), 2);
        assert_eq!(config.listen_addr.port(), 9000);
    }

    #[test]
    fn missing_server_ip_is_explained() {
        let err = load(&[("HOSTPROV_VERIFICATION_TOKEN", "t")])
            .err()
            .expect("server IP is required");
        assert!(err.to_string().contains("HOSTPROV_SERVER_IP is required"));
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("HOSTPROV_RELOAD_TIMEOUT_SECS", "soon"));
        let err = load(&vars).err().expect("non-numeric timeout");
        assert!(err.to_string().contains("HOSTPROV_RELOAD_TIMEOUT_SECS"));
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let config = load(&[("HOSTPROV_SERVER_IP", "203.0.113.10")]).unwrap();
        assert!(config.validate().is_err(), "token is required");

        let mut vars = REQUIRED.to_vec();
        vars.push(("HOSTPROV_PERMISSION_MODE", "rwxr-xr-x"));
        assert!(load(&vars).unwrap().validate().is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("HOSTPROV_LOG_LEVEL", "verbose"));
        assert!(load(&vars).unwrap().validate().is_err());
    }
}
