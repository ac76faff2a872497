//! Architectural Contract Test: Verification Gates
//!
//! This test verifies that nothing is provisioned for a domain the caller
//! has not proven control of.
//!
//! Constraints verified:
//! - A missing ownership token stops the run before any filesystem effect
//! - A wrong address record stops the run before any filesystem effect
//! - Each gate failure is exactly one Failure event with remediation text
//! - DNS lookup errors count as "not verified"
//!
//! If this test fails, a domain can be provisioned without verification.

mod common;

use common::*;
use hostprov_core::{EventKind, FailureReason, PipelineOptions, RunOutcome, Stage};
use std::net::Ipv4Addr;
use std::sync::Arc;

const OPTIONS: PipelineOptions = PipelineOptions {
    issue_certificate: false,
};

#[tokio::test]
async fn missing_txt_record_stops_before_any_action() {
    // Scenario A: no TXT record carrying the token

    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    let lookup = Arc::new(MockDnsLookup::new(&["v=spf1 -all"], &[SERVER_IP]));
    let executor = Arc::new(RecordingExecutor::new());
    let provisioner = provisioner(config.clone(), &lookup, &executor);
    let domain = domain("example.com");

    let report = provisioner.provision(domain.clone(), OPTIONS).await;

    assert_eq!(report.events.len(), 1, "exactly one event: {:?}", report.events);
    let event = &report.events[0];
    assert_eq!(event.kind, EventKind::Failure);
    assert!(event.message.contains("not verified"));
    assert!(event.message.contains(TOKEN), "remediation names the token");

    assert_eq!(
        report.outcome,
        RunOutcome::Failed(FailureReason::OwnershipNotVerified {
            token: TOKEN.to_string()
        })
    );

    // Address never consulted, nothing executed, nothing created
    assert_eq!(lookup.a_call_count(), 0);
    assert_eq!(executor.call_count(), 0);
    assert!(!config.document_root(&domain).exists());
}

#[tokio::test]
async fn wrong_address_record_stops_before_any_action() {
    // Scenario B: token published, A record points elsewhere

    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    let lookup = Arc::new(MockDnsLookup::new(
        &[TOKEN],
        &[Ipv4Addr::new(198, 51, 100, 7)],
    ));
    let executor = Arc::new(RecordingExecutor::new());
    let provisioner = provisioner(config.clone(), &lookup, &executor);
    let domain = domain("example.com");

    let report = provisioner.provision(domain.clone(), OPTIONS).await;

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::Failure);
    assert_eq!(report.events[0].stage, Stage::Failed);
    assert!(report.events[0].message.contains("Address record not set"));
    assert!(report.events[0].message.contains("203.0.113.10"));

    assert_eq!(
        report.outcome,
        RunOutcome::Failed(FailureReason::AddressNotSet {
            expected: SERVER_IP
        })
    );
    assert_eq!(executor.call_count(), 0);
    assert!(!config.document_root(&domain).exists());
    assert!(!config.available_site(&domain).exists());
}

#[tokio::test]
async fn token_match_is_substring_and_address_match_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(MockDnsLookup::new(
        &["unrelated", &format!("prefix {} suffix", TOKEN)],
        &[Ipv4Addr::new(203, 0, 113, 1), SERVER_IP],
    ));
    let executor = Arc::new(RecordingExecutor::new());
    let provisioner = provisioner(sandbox_config(dir.path()), &lookup, &executor);
    let domain = domain("example.com");

    assert!(provisioner.check_ownership_token(&domain).await);
    assert!(provisioner.check_address_record(&domain).await);

    let state = provisioner.verification(&domain).await;
    assert!(state.is_verified());
}

#[test]
fn lookup_errors_count_as_unverified() {
    tokio_test::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let lookup = Arc::new(MockDnsLookup::failing());
        let executor = Arc::new(RecordingExecutor::new());
        let provisioner = provisioner(sandbox_config(dir.path()), &lookup, &executor);
        let domain = domain("example.com");

        assert!(!provisioner.check_ownership_token(&domain).await);
        assert!(!provisioner.check_address_record(&domain).await);

        let state = provisioner.verification(&domain).await;
        assert!(!state.txt_verified);
        assert!(!state.a_record_verified);
    });
}

#[tokio::test]
async fn every_check_queries_dns_again() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(MockDnsLookup::verified());
    let executor = Arc::new(RecordingExecutor::new());
    let provisioner = provisioner(sandbox_config(dir.path()), &lookup, &executor);
    let domain = domain("example.com");

    for _ in 0..3 {
        assert!(provisioner.check_ownership_token(&domain).await);
    }
    assert_eq!(lookup.txt_call_count(), 3, "results are never cached");
}
