//! Reverse-proxy virtual host activation
//!
//! The rendered server block is written to a staging file, renamed into
//! `sites_available`, linked from `sites_enabled`, and picked up by reloading
//! the proxy service. Both the rename and the link replacement are atomic, so
//! the proxy never sees a half-written file. A failed reload leaves the file
//! and link in place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::HostingConfig;
use crate::domain::DomainName;
use crate::error::Result;
use crate::traits::{CommandExecutor, CommandSpec};

/// Index files served for directory requests, in order
const INDEX_FILES: &[&str] = &["index.php", "index.html", "index.htm"];

/// Front controller unmatched paths are rewritten to
const FRONT_CONTROLLER: &str = "/index.php?$args";

/// Writes and activates virtual hosts
#[derive(Clone)]
pub struct VirtualHostWriter {
    config: Arc<HostingConfig>,
    executor: Arc<dyn CommandExecutor>,
}

impl VirtualHostWriter {
    pub fn new(config: Arc<HostingConfig>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { config, executor }
    }

    /// Render the server block for `domain`
    pub fn render(&self, domain: &DomainName, document_root: &Path) -> String {
        format!(
            r#"server {{
    listen 80;
    server_name {domain};

    root {root};
    index {index};

    location / {{
        try_files $uri $uri/ {front};
    }}

    location ~ \.php$ {{
        include snippets/fastcgi-php.conf;
        fastcgi_pass unix:{socket};
        fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;
        include fastcgi_params;
    }}
}}
"#,
            domain = domain,
            root = document_root.display(),
            index = INDEX_FILES.join(" "),
            front = FRONT_CONTROLLER,
            socket = self.config.php_fpm_socket.display(),
        )
    }

    /// Write, enable and load the virtual host for `domain`
    pub async fn activate(
        &self,
        domain: &DomainName,
        document_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.write(domain, document_root, cancel).await?;
        self.enable(domain, cancel).await?;
        self.reload(cancel).await?;
        info!(%domain, "Virtual host active");
        Ok(())
    }

    /// Render into the staging file and move it into `sites_available`
    async fn write(
        &self,
        domain: &DomainName,
        document_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let staged = self.config.staged_site(domain);
        let available = self.config.available_site(domain);

        ensure_parent(&staged).await?;

        let mut file = fs::File::create(&staged).await?;
        file.write_all(self.render(domain, document_root).as_bytes())
            .await?;
        file.sync_all().await?;
        drop(file);

        if self.config.privilege_wrapper.is_some() {
            let mv = self.command(
                CommandSpec::new("mv")
                    .arg("-f")
                    .path_arg(&staged)
                    .path_arg(&available),
            );
            self.executor
                .run(&mv, self.config.timeouts.reload(), cancel)
                .await?;
        } else {
            ensure_parent(&available).await?;
            move_into_place(&staged, &available).await?;
        }
        debug!(path = %available.display(), "Virtual host written");
        Ok(())
    }

    /// Point `sites_enabled/<domain>` at the available file, replacing any old link
    async fn enable(&self, domain: &DomainName, cancel: &CancellationToken) -> Result<()> {
        let available = self.config.available_site(domain);
        let enabled = self.config.enabled_site(domain);
        let pending = self.config.sites_enabled.join(format!(".{}.link", domain));

        if self.config.privilege_wrapper.is_some() {
            let budget = self.config.timeouts.reload();
            let ln = self.command(
                CommandSpec::new("ln")
                    .arg("-sfn")
                    .path_arg(&available)
                    .path_arg(&pending),
            );
            self.executor.run(&ln, budget, cancel).await?;

            let mv = self.command(
                CommandSpec::new("mv")
                    .arg("-Tf")
                    .path_arg(&pending)
                    .path_arg(&enabled),
            );
            self.executor.run(&mv, budget, cancel).await?;
        } else {
            ensure_parent(&enabled).await?;

            if fs::symlink_metadata(&pending).await.is_ok() {
                fs::remove_file(&pending).await?;
            }
            link(&available, &pending).await?;
            fs::rename(&pending, &enabled).await?;
        }

        debug!(path = %enabled.display(), "Virtual host enabled");
        Ok(())
    }

    /// Ask the proxy service to reload its configuration
    pub async fn reload(&self, cancel: &CancellationToken) -> Result<()> {
        let command = self.command(
            CommandSpec::new("systemctl")
                .arg("reload")
                .arg(self.config.proxy_service.clone()),
        );

        self.executor
            .run(&command, self.config.timeouts.reload(), cancel)
            .await?;
        debug!(service = %self.config.proxy_service, "Proxy reloaded");
        Ok(())
    }

    fn command(&self, command: CommandSpec) -> CommandSpec {
        command.wrapped(self.config.privilege_wrapper.as_deref())
    }
}

/// Rename `from` onto `to`
///
/// Across filesystems the file is first copied beside `to` so the final
/// step is still a rename.
async fn move_into_place(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            let beside = sibling(to);
            fs::copy(from, &beside).await?;
            fs::rename(&beside, to).await?;
            fs::remove_file(from).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.incoming", name))
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn link(target: &Path, link: &Path) -> Result<()> {
    fs::symlink(target, link).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn link(target: &Path, link: &Path) -> Result<()> {
    fs::copy(target, link).await?;
    Ok(())
}
