//! Provisioning pipeline
//!
//! The [`Provisioner`] is the long-lived service; each request gets a
//! single-use [`Pipeline`] that walks the state machine once:
//!
//! ```text
//! Idle ─▶ CheckingOwnership ─▶ CheckingAddress ─▶ CreatingDirectory ─▶ Downloading
//!  │            │                    │                                     │
//!  │            ▼                    ▼                                     ▼
//!  │         Failed               Failed       Extracting ◀────────────────┘
//!  ▼                                               │
//! AlreadyInstalled     SettingPermissions ◀────────┘
//!                              │
//!                              ▼
//!                      ConfiguringProxy ─▶ [IssuingCertificate] ─▶ Succeeded
//! ```
//!
//! ## Ordering
//!
//! 1. Claim the domain in [`InstallLocks`] (busy → `Failed(InProgress)`)
//! 2. Idempotency gate: document root exists → `AlreadyInstalled`, before any DNS query
//! 3. Ownership and address checks; neither emits an event unless it fails
//! 4. Each stage emits one `Info` event, then runs; the first error ends the run
//! 5. Exactly one terminal event
//!
//! Nothing is retried and nothing is rolled back.

pub mod events;

pub use events::{
    progress_channel, EventKind, FailureReason, ProgressEvent, ProgressSender, ProgressStream,
    RunOutcome, Stage,
};

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::certificate::CertificateIssuer;
use crate::config::HostingConfig;
use crate::domain::DomainName;
use crate::error::{Error, Result};
use crate::installer::BundleInstaller;
use crate::state::{InstallLocks, InstallStore};
use crate::traits::{CommandExecutor, DnsLookup};
use crate::verifier::{DomainVerifier, VerificationState};

/// Stages every installation runs, in order
const INSTALL_STAGES: [Stage; 5] = [
    Stage::CreatingDirectory,
    Stage::Downloading,
    Stage::Extracting,
    Stage::SettingPermissions,
    Stage::ConfiguringProxy,
];

/// Pipeline states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    CheckingOwnership,
    CheckingAddress,
    CreatingDirectory,
    Downloading,
    Extracting,
    SettingPermissions,
    ConfiguringProxy,
    IssuingCertificate,
    Succeeded,
    Failed(FailureReason),
    AlreadyInstalled,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded | PipelineState::Failed(_) | PipelineState::AlreadyInstalled
        )
    }

    fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::CheckingOwnership => PipelineState::CheckingOwnership,
            Stage::CheckingAddress => PipelineState::CheckingAddress,
            Stage::CreatingDirectory => PipelineState::CreatingDirectory,
            Stage::Downloading => PipelineState::Downloading,
            Stage::Extracting => PipelineState::Extracting,
            Stage::SettingPermissions => PipelineState::SettingPermissions,
            Stage::ConfiguringProxy => PipelineState::ConfiguringProxy,
            Stage::IssuingCertificate => PipelineState::IssuingCertificate,
            Stage::Completed => PipelineState::Succeeded,
            Stage::AlreadyInstalled => PipelineState::AlreadyInstalled,
            Stage::Failed => PipelineState::Failed(FailureReason::Unexpected {
                stage: None,
                detail: "failed".to_string(),
            }),
        }
    }
}

/// Per-run choices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Append the certificate stage
    pub issue_certificate: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &HostingConfig) -> Self {
        Self {
            issue_certificate: config.issue_certificate,
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub events: Vec<ProgressEvent>,
    pub outcome: RunOutcome,
}

/// Long-lived provisioning service
///
/// Cheap to clone; clones share the lock set.
#[derive(Clone)]
pub struct Provisioner {
    config: Arc<HostingConfig>,
    verifier: DomainVerifier,
    installer: BundleInstaller,
    vhost: crate::vhost::VirtualHostWriter,
    certificates: CertificateIssuer,
    store: InstallStore,
    locks: InstallLocks,
}

impl Provisioner {
    /// Create a provisioner
    ///
    /// # Parameters
    ///
    /// - `config`: validated hosting configuration
    /// - `lookup`: DNS backend used for verification
    /// - `executor`: runs external commands
    pub fn new(
        config: HostingConfig,
        lookup: Arc<dyn DnsLookup>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let verifier = DomainVerifier::new(
            lookup,
            config.verification_token.clone(),
            config.server_ip,
        );
        let installer = BundleInstaller::new(config.clone(), executor.clone());
        let vhost = crate::vhost::VirtualHostWriter::new(config.clone(), executor.clone());
        let certificates = CertificateIssuer::new(config.clone(), executor, vhost.clone());
        let store = InstallStore::new(config.clone());

        Ok(Self {
            config,
            verifier,
            installer,
            vhost,
            certificates,
            store,
            locks: InstallLocks::new(),
        })
    }

    pub fn config(&self) -> &HostingConfig {
        &self.config
    }

    pub fn verifier(&self) -> &DomainVerifier {
        &self.verifier
    }

    pub fn store(&self) -> &InstallStore {
        &self.store
    }

    pub fn locks(&self) -> &InstallLocks {
        &self.locks
    }

    /// Fresh TXT check
    pub async fn check_ownership_token(&self, domain: &DomainName) -> bool {
        self.verifier.check_ownership_token(domain).await
    }

    /// Fresh A check
    pub async fn check_address_record(&self, domain: &DomainName) -> bool {
        self.verifier.check_address_record(domain).await
    }

    /// Both checks
    pub async fn verification(&self, domain: &DomainName) -> VerificationState {
        self.verifier.verify(domain).await
    }

    /// A single-use pipeline for `domain`
    pub fn pipeline(&self, domain: DomainName, options: PipelineOptions) -> Pipeline {
        Pipeline {
            provisioner: self.clone(),
            domain,
            options,
            state: PipelineState::Idle,
        }
    }

    /// Start a run in the background and return its progress
    ///
    /// Dropping the stream cancels the run.
    pub fn start(&self, domain: DomainName, options: PipelineOptions) -> ProgressStream {
        let (sender, stream) = progress_channel();
        let pipeline = self.pipeline(domain, options);
        tokio::spawn(async move {
            pipeline.run(sender).await;
        });
        stream
    }

    /// Run to the end and collect every event
    pub async fn provision(&self, domain: DomainName, options: PipelineOptions) -> RunReport {
        let (sender, mut stream) = progress_channel();
        let outcome = self.pipeline(domain, options).run(sender).await;

        let mut events = Vec::new();
        while let Some(event) = stream.recv().await {
            events.push(event);
        }
        RunReport { events, outcome }
    }

    /// Issue a certificate for an existing installation
    ///
    /// Runs the ACME client and reloads the proxy. Holds the domain lock for
    /// the duration, like a full run. The report carries exactly one event.
    pub async fn issue_certificate(&self, domain: &DomainName) -> RunReport {
        let Some(_guard) = self.locks.try_acquire(domain) else {
            warn!(%domain, "Certificate requested while a run is in flight");
            return failed_report(domain, FailureReason::InProgress);
        };

        match self.store.lookup(domain).await {
            Ok(Some(_)) => {}
            Ok(None) => return failed_report(domain, FailureReason::NotInstalled),
            Err(e) => {
                return failed_report(
                    domain,
                    FailureReason::Unexpected {
                        stage: None,
                        detail: e.to_string(),
                    },
                );
            }
        }

        match self
            .certificates
            .issue(domain, &CancellationToken::new())
            .await
        {
            Ok(()) => {
                let setup_url = format!("https://{}/", domain);
                RunReport {
                    events: vec![ProgressEvent::success(
                        format!("Certificate issued for {}", domain),
                        Some(setup_url.clone()),
                    )],
                    outcome: RunOutcome::Succeeded { setup_url },
                }
            }
            Err(e) => {
                error!(%domain, error = %e, "Certificate issuance failed");
                failed_report(domain, FailureReason::from_error(Stage::IssuingCertificate, e))
            }
        }
    }
}

fn failed_report(domain: &DomainName, reason: FailureReason) -> RunReport {
    RunReport {
        events: vec![ProgressEvent::failure(reason.describe(domain))],
        outcome: RunOutcome::Failed(reason),
    }
}

/// One provisioning run
pub struct Pipeline {
    provisioner: Provisioner,
    domain: DomainName,
    options: PipelineOptions,
    state: PipelineState,
}

impl Pipeline {
    pub fn domain(&self) -> &DomainName {
        &self.domain
    }

    /// The stages this run will perform after the gates
    pub fn plan(&self) -> Vec<Stage> {
        let mut stages = INSTALL_STAGES.to_vec();
        if self.options.issue_certificate {
            stages.push(Stage::IssuingCertificate);
        }
        stages
    }

    /// Run to a terminal state, reporting through `events`
    pub async fn run(mut self, events: ProgressSender) -> RunOutcome {
        let domain = self.domain.clone();
        info!(%domain, "Provisioning requested");

        let Some(_guard) = self.provisioner.locks.try_acquire(&domain) else {
            warn!(%domain, "Provisioning already in progress");
            return self.fail(&events, FailureReason::InProgress);
        };

        match self.provisioner.store.lookup(&domain).await {
            Ok(Some(record)) => {
                info!(%domain, path = %record.document_root.display(), "Already installed");
                self.transition(PipelineState::AlreadyInstalled);
                events.send(ProgressEvent {
                    stage: Stage::AlreadyInstalled,
                    kind: EventKind::Info,
                    message: format!("{} is already installed.", domain),
                    setup_url: None,
                });
                return RunOutcome::AlreadyInstalled;
            }
            Ok(None) => {}
            Err(e) => {
                return self.fail(
                    &events,
                    FailureReason::Unexpected {
                        stage: None,
                        detail: e.to_string(),
                    },
                );
            }
        }

        self.transition(PipelineState::CheckingOwnership);
        if !self.provisioner.verifier.check_ownership_token(&domain).await {
            let token = self.provisioner.verifier.token().to_string();
            return self.fail(&events, FailureReason::OwnershipNotVerified { token });
        }

        self.transition(PipelineState::CheckingAddress);
        if !self.provisioner.verifier.check_address_record(&domain).await {
            let expected = self.provisioner.verifier.server_ip();
            return self.fail(&events, FailureReason::AddressNotSet { expected });
        }

        let document_root = self.provisioner.config.document_root(&domain);
        let cancel = events.cancellation().clone();

        for stage in self.plan() {
            if events.is_cancelled() {
                return self.fail(&events, FailureReason::Cancelled);
            }

            self.transition(PipelineState::for_stage(stage));
            if !events.send(ProgressEvent::info(stage, self.describe(stage, &document_root))) {
                return self.fail(&events, FailureReason::Cancelled);
            }

            if let Err(e) = self.perform(stage, &document_root, &cancel).await {
                error!(%domain, %stage, error = %e, "Stage failed");
                return self.fail(&events, FailureReason::from_error(stage, e));
            }
        }

        let setup_url = self.provisioner.config.setup_url(&domain);
        self.transition(PipelineState::Succeeded);
        events.send(ProgressEvent::success(
            format!("Installation of {} completed. Finish setup at {}", domain, setup_url),
            Some(setup_url.clone()),
        ));
        info!(%domain, "Provisioning succeeded");
        RunOutcome::Succeeded { setup_url }
    }

    async fn perform(
        &self,
        stage: Stage,
        document_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let provisioner = &self.provisioner;
        match stage {
            Stage::CreatingDirectory => {
                provisioner
                    .installer
                    .create_directory(document_root, cancel)
                    .await
            }
            Stage::Downloading => {
                provisioner
                    .installer
                    .download(document_root, &provisioner.config.bundle_url, cancel)
                    .await
            }
            Stage::Extracting => provisioner.installer.extract(document_root, cancel).await,
            Stage::SettingPermissions => {
                provisioner
                    .installer
                    .set_permissions(document_root, cancel)
                    .await
            }
            Stage::ConfiguringProxy => {
                provisioner
                    .vhost
                    .activate(&self.domain, document_root, cancel)
                    .await
            }
            Stage::IssuingCertificate => {
                provisioner.certificates.issue(&self.domain, cancel).await
            }
            other => Err(Error::Other(format!("{} is not an executable stage", other))),
        }
    }

    fn describe(&self, stage: Stage, document_root: &Path) -> String {
        let config = &self.provisioner.config;
        match stage {
            Stage::CreatingDirectory => {
                format!("Creating directory {}", document_root.display())
            }
            Stage::Downloading => format!("Downloading {}", config.bundle_url),
            Stage::Extracting => format!("Extracting {}", config.archive_name),
            Stage::SettingPermissions => format!(
                "Setting owner {}:{} and mode {}",
                config.runtime_user, config.runtime_group, config.permission_mode
            ),
            Stage::ConfiguringProxy => format!(
                "Configuring {} virtual host for {}",
                config.proxy_service, self.domain
            ),
            Stage::IssuingCertificate => format!("Issuing TLS certificate for {}", self.domain),
            other => other.to_string(),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(domain = %self.domain, from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
    }

    fn fail(&mut self, events: &ProgressSender, reason: FailureReason) -> RunOutcome {
        let message = reason.describe(&self.domain);
        warn!(domain = %self.domain, %message, "Provisioning failed");
        self.transition(PipelineState::Failed(reason.clone()));
        events.send(ProgressEvent::failure(message));
        RunOutcome::Failed(reason)
    }
}
