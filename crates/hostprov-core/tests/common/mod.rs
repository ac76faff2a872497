//! Test doubles and common utilities for pipeline contract tests
//!
//! The doubles record what the pipeline asked for without touching DNS or
//! running any program. Filesystem effects land in a temporary directory.

#![allow(dead_code)]

use hostprov_core::error::{Error, Result};
use hostprov_core::traits::{CommandExecutor, CommandOutput, CommandSpec, DnsLookup};
use hostprov_core::{DomainName, HostingConfig, Provisioner};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Token every test domain is expected to publish
pub const TOKEN: &str = "hostprov-verify-7f3a";

/// Address every test domain is expected to point at
pub const SERVER_IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 10);

/// A DnsLookup with fixed answers and call counters
pub struct MockDnsLookup {
    txt: Vec<String>,
    a: Vec<Ipv4Addr>,
    fail: bool,
    /// Call counter for txt_records()
    txt_calls: AtomicUsize,
    /// Call counter for a_records()
    a_calls: AtomicUsize,
}

impl MockDnsLookup {
    /// Answers with the given records
    pub fn new(txt: &[&str], a: &[Ipv4Addr]) -> Self {
        Self {
            txt: txt.iter().map(|s| s.to_string()).collect(),
            a: a.to_vec(),
            fail: false,
            txt_calls: AtomicUsize::new(0),
            a_calls: AtomicUsize::new(0),
        }
    }

    /// Both records published correctly
    pub fn verified() -> Self {
        Self::new(&[&format!("site-verification={}", TOKEN)], &[SERVER_IP])
    }

    /// Every lookup errors
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[], &[])
        }
    }

    pub fn txt_call_count(&self) -> usize {
        self.txt_calls.load(Ordering::SeqCst)
    }

    pub fn a_call_count(&self) -> usize {
        self.a_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.txt_call_count() + self.a_call_count()
    }
}

#[async_trait::async_trait]
impl DnsLookup for MockDnsLookup {
    async fn txt_records(&self, _domain: &DomainName) -> Result<Vec<String>> {
        self.txt_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::dns("SERVFAIL"));
        }
        Ok(self.txt.clone())
    }

    async fn a_records(&self, _domain: &DomainName) -> Result<Vec<Ipv4Addr>> {
        self.a_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::dns("SERVFAIL"));
        }
        Ok(self.a.clone())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// How the recording executor treats one program
#[derive(Debug, Clone)]
enum Behavior {
    /// Exit non-zero with this stderr
    Fail(String),
    /// Never finish on its own; honours timeout and cancellation
    Hang,
}

/// A CommandExecutor that records every command instead of running it
#[derive(Default)]
pub struct RecordingExecutor {
    commands: std::sync::Mutex<Vec<CommandSpec>>,
    behaviors: std::sync::Mutex<Vec<(String, Behavior)>>,
    /// Signalled when a hanging command starts
    pub hang_started: Notify,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `program` exit with status 1 and `stderr`
    pub fn fail_on(self, program: &str, stderr: &str) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .push((program.to_string(), Behavior::Fail(stderr.to_string())));
        self
    }

    /// Make `program` run until it times out or is cancelled
    pub fn hang_on(self, program: &str) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .push((program.to_string(), Behavior::Hang));
        self
    }

    /// Every command executed so far, rendered as a command line
    pub fn command_lines(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    /// Programs executed so far, ignoring any wrapper
    pub fn programs(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| effective_program(c).to_string())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    fn behavior_for(&self, command: &CommandSpec) -> Option<Behavior> {
        let program = effective_program(command);
        self.behaviors
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == program)
            .map(|(_, behavior)| behavior.clone())
    }
}

fn effective_program(command: &CommandSpec) -> &str {
    if command.program == "sudo" {
        command.args.first().map(String::as_str).unwrap_or("sudo")
    } else {
        &command.program
    }
}

#[async_trait::async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.clone());

        match self.behavior_for(command) {
            None => Ok(CommandOutput::success()),
            Some(Behavior::Fail(stderr)) => Ok(CommandOutput::failure(1, stderr)),
            Some(Behavior::Hang) => {
                self.hang_started.notify_one();
                tokio::select! {
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    _ = tokio::time::sleep(timeout) => {
                        Err(Error::timeout(command.program.clone(), timeout))
                    }
                }
            }
        }
    }
}

/// Configuration rooted in a temporary directory
pub fn sandbox_config(dir: &Path) -> HostingConfig {
    let mut config = HostingConfig::new(TOKEN, SERVER_IP);
    config.hosting_root = dir.join("www");
    config.sites_available = dir.join("sites-available");
    config.sites_enabled = dir.join("sites-enabled");
    config
}

/// Provisioner wired to the given doubles
pub fn provisioner(
    config: HostingConfig,
    lookup: &Arc<MockDnsLookup>,
    executor: &Arc<RecordingExecutor>,
) -> Provisioner {
    Provisioner::new(config, lookup.clone(), executor.clone())
        .expect("provisioner construction succeeds")
}

pub fn domain(name: &str) -> DomainName {
    DomainName::parse(name).expect("valid test domain")
}
