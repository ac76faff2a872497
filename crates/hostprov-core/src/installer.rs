//! Filesystem provisioning
//!
//! Populates a document root with the software bundle:
//!
//! 1. create the directory
//! 2. download the bundle archive into it
//! 3. extract the archive (top-level component stripped) and delete it
//! 4. hand ownership to the runtime account and apply the permission mode
//!
//! Each method is one pipeline stage. Nothing is rolled back on failure.

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::HostingConfig;
use crate::error::Result;
use crate::traits::{CommandExecutor, CommandSpec};

/// Runs the filesystem stages for one document root
#[derive(Clone)]
pub struct BundleInstaller {
    config: Arc<HostingConfig>,
    executor: Arc<dyn CommandExecutor>,
}

impl BundleInstaller {
    pub fn new(config: Arc<HostingConfig>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { config, executor }
    }

    /// Create the document root
    ///
    /// With a privilege wrapper configured the daemon may not own
    /// `hosting_root`, so the directory is made by a wrapped `mkdir -p`.
    pub async fn create_directory(
        &self,
        document_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.config.privilege_wrapper.is_some() {
            let mkdir = self.command(
                CommandSpec::new("mkdir")
                    .arg("-p")
                    .path_arg(document_root),
            );
            self.executor
                .run(&mkdir, self.config.timeouts.permissions(), cancel)
                .await?;
        } else {
            tokio::fs::create_dir_all(document_root).await?;
        }
        info!(path = %document_root.display(), "Document root created");
        Ok(())
    }

    /// Download `bundle_url` into the document root
    ///
    /// `-nv` keeps wget's error lines on stderr so a failed fetch is
    /// reported in the tool's own words.
    pub async fn download(
        &self,
        document_root: &Path,
        bundle_url: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let archive = self.config.archive_path(document_root);
        let command = self.command(
            CommandSpec::new("wget")
                .arg("-nv")
                .arg("-O")
                .path_arg(&archive)
                .arg(bundle_url),
        );

        self.executor
            .run(&command, self.config.timeouts.download(), cancel)
            .await?;
        debug!(archive = %archive.display(), "Bundle downloaded");
        Ok(())
    }

    /// Unpack the archive over the document root, then remove it
    pub async fn extract(&self, document_root: &Path, cancel: &CancellationToken) -> Result<()> {
        let archive = self.config.archive_path(document_root);
        let budget = self.config.timeouts.extract();

        let untar = self.command(
            CommandSpec::new("tar")
                .arg("-xzf")
                .path_arg(&archive)
                .arg("-C")
                .path_arg(document_root)
                .arg("--strip-components=1"),
        );
        self.executor.run(&untar, budget, cancel).await?;

        let remove = self.command(CommandSpec::new("rm").arg("-f").path_arg(&archive));
        self.executor.run(&remove, budget, cancel).await?;

        debug!(path = %document_root.display(), "Bundle extracted");
        Ok(())
    }

    /// Apply ownership and permissions recursively
    pub async fn set_permissions(
        &self,
        document_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let budget = self.config.timeouts.permissions();
        let owner = format!("{}:{}", self.config.runtime_user, self.config.runtime_group);

        let chown = self.command(
            CommandSpec::new("chown")
                .arg("-R")
                .arg(owner)
                .path_arg(document_root),
        );
        self.executor.run(&chown, budget, cancel).await?;

        let chmod = self.command(
            CommandSpec::new("chmod")
                .arg("-R")
                .arg(self.config.permission_mode.clone())
                .path_arg(document_root),
        );
        self.executor.run(&chmod, budget, cancel).await?;

        Ok(())
    }

    fn command(&self, command: CommandSpec) -> CommandSpec {
        command.wrapped(self.config.privilege_wrapper.as_deref())
    }
}
