// # hostprov-core
//
// Core library for provisioning a hosted web application on a single server.
//
// ## Architecture Overview
//
// A provisioning run takes a domain from "DNS points here" to "site is live":
// - **DnsLookup**: Trait for fresh TXT and A lookups (backends live in their own crates)
// - **DomainVerifier**: Ownership token and address checks on top of DnsLookup
// - **CommandExecutor**: Trait for running external programs with a timeout and cancellation
// - **BundleInstaller**: Creates the document root, downloads, extracts and sets permissions
// - **VirtualHostWriter**: Writes and activates the reverse-proxy virtual host
// - **CertificateIssuer**: Optional TLS certificate through an ACME client
// - **Provisioner**: Runs the pipeline and streams progress events
//
// ## Design Principles
//
// 1. **Core-First**: The pipeline knows nothing about HTTP or a specific DNS library
// 2. **Event-Driven**: Every stage reports through an ordered progress stream
// 3. **Idempotency**: An existing document root short-circuits the run
// 4. **One Run Per Domain**: Concurrent runs for the same domain are rejected
// 5. **Library-First**: All core functionality can be used as a library

pub mod certificate;
pub mod config;
pub mod domain;
pub mod error;
pub mod exec;
pub mod installer;
pub mod pipeline;
pub mod state;
pub mod traits;
pub mod verifier;
pub mod vhost;

// Re-export core types for convenience
pub use certificate::CertificateIssuer;
pub use config::{HostingConfig, StepTimeouts};
pub use domain::DomainName;
pub use error::{Error, Result};
pub use exec::SystemExecutor;
pub use installer::BundleInstaller;
pub use pipeline::{
    EventKind, FailureReason, PipelineOptions, ProgressEvent, ProgressStream, Provisioner,
    RunOutcome, RunReport, Stage,
};
pub use state::{InstallLocks, InstallStore};
pub use traits::{CommandExecutor, CommandOutput, CommandSpec, DnsLookup};
pub use verifier::{DnsCheck, DomainVerifier, VerificationState};
pub use vhost::VirtualHostWriter;
