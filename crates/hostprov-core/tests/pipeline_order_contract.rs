//! Architectural Contract Test: Pipeline Ordering
//!
//! This test verifies that a run performs its steps in a fixed order and
//! reports each one before doing it.
//!
//! Constraints verified:
//! - A successful run emits one Info event per step, then one Success
//! - External commands run in step order with explicit arguments
//! - A failure at step k yields k Info events and one Failure, nothing after
//! - Command diagnostics reach the caller verbatim
//! - Timeouts are a distinct failure reason
//!
//! If this test fails, someone has reordered, skipped or silently retried a step.

mod common;

use common::*;
use hostprov_core::{EventKind, FailureReason, PipelineOptions, RunOutcome, Stage};
use std::sync::Arc;

const OPTIONS: PipelineOptions = PipelineOptions {
    issue_certificate: false,
};

#[tokio::test]
async fn successful_run_reports_every_step_in_order() {
    // Scenario C: verified domain, nothing installed yet

    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    let lookup = Arc::new(MockDnsLookup::verified());
    let executor = Arc::new(RecordingExecutor::new());
    let provisioner = provisioner(config.clone(), &lookup, &executor);
    let domain = domain("example.com");

    let report = provisioner.provision(domain.clone(), OPTIONS).await;

    let stages: Vec<Stage> = report.events.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::CreatingDirectory,
            Stage::Downloading,
            Stage::Extracting,
            Stage::SettingPermissions,
            Stage::ConfiguringProxy,
            Stage::Completed,
        ]
    );
    assert!(report.events[..5].iter().all(|e| e.kind == EventKind::Info));

    let last = report.events.last().unwrap();
    assert_eq!(last.kind, EventKind::Success);
    assert_eq!(
        last.setup_url.as_deref(),
        Some("http://example.com/wp-admin/install.php")
    );
    assert!(last.message.contains("http://example.com/wp-admin/install.php"));
    assert_eq!(
        report.outcome,
        RunOutcome::Succeeded {
            setup_url: "http://example.com/wp-admin/install.php".to_string()
        }
    );

    let root = config.document_root(&domain);
    let root = root.display();
    assert_eq!(
        executor.command_lines(),
        vec![
            format!("wget -nv -O {root}/latest.tar.gz https://wordpress.org/latest.tar.gz"),
            format!("tar -xzf {root}/latest.tar.gz -C {root} --strip-components=1"),
            format!("rm -f {root}/latest.tar.gz"),
            format!("chown -R www-data:www-data {root}"),
            format!("chmod -R 755 {root}"),
            "systemctl reload nginx".to_string(),
        ]
    );

    assert!(config.document_root(&domain).is_dir());
    let vhost = std::fs::read_to_string(config.available_site(&domain)).unwrap();
    assert!(vhost.contains("server_name example.com;"));
    assert!(std::fs::symlink_metadata(config.enabled_site(&domain)).is_ok());
    assert!(provisioner.locks().is_empty(), "lock released after the run");
}

#[tokio::test]
async fn download_failure_stops_after_two_events() {
    // Scenario E: the bundle cannot be fetched

    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    let lookup = Arc::new(MockDnsLookup::verified());
    let executor = Arc::new(
        RecordingExecutor::new().fail_on("wget", "wget: unable to resolve host address"),
    );
    let provisioner = provisioner(config.clone(), &lookup, &executor);
    let domain = domain("example.com");

    let report = provisioner.provision(domain.clone(), OPTIONS).await;

    let stages: Vec<Stage> = report.events.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![Stage::CreatingDirectory, Stage::Downloading, Stage::Failed]
    );
    let failure = &report.events[2];
    assert_eq!(failure.kind, EventKind::Failure);
    assert!(
        failure
            .message
            .contains("wget: unable to resolve host address"),
        "diagnostic passed through: {}",
        failure.message
    );

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed(FailureReason::Command { stage: Stage::Downloading, ref program, .. })
            if program == "wget"
    ));

    // Nothing after the failed step, and no rollback of the directory
    assert_eq!(executor.programs(), vec!["wget"]);
    assert!(config.document_root(&domain).is_dir());
    assert!(!config.available_site(&domain).exists());
}

#[tokio::test]
async fn failure_at_each_step_emits_k_infos_then_one_failure() {
    let cases = [
        ("tar", 3, vec!["wget", "tar"]),
        ("chown", 4, vec!["wget", "tar", "rm", "chown"]),
        ("chmod", 4, vec!["wget", "tar", "rm", "chown", "chmod"]),
        (
            "systemctl",
            5,
            vec!["wget", "tar", "rm", "chown", "chmod", "systemctl"],
        ),
    ];

    for (program, infos, expected_programs) in cases {
        let dir = tempfile::tempdir().unwrap();
        let lookup = Arc::new(MockDnsLookup::verified());
        let executor = Arc::new(RecordingExecutor::new().fail_on(program, "boom"));
        let provisioner = provisioner(sandbox_config(dir.path()), &lookup, &executor);

        let report = provisioner.provision(domain("example.com"), OPTIONS).await;

        assert_eq!(report.events.len(), infos + 1, "failing {}", program);
        assert!(
            report.events[..infos]
                .iter()
                .all(|e| e.kind == EventKind::Info)
        );
        assert_eq!(report.events[infos].kind, EventKind::Failure);
        assert_eq!(report.events[infos].message.matches("boom").count(), 1);
        assert_eq!(executor.programs(), expected_programs, "failing {}", program);
    }
}

#[tokio::test]
async fn certificate_variant_appends_one_stage() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(MockDnsLookup::verified());
    let executor = Arc::new(RecordingExecutor::new());
    let provisioner = provisioner(sandbox_config(dir.path()), &lookup, &executor);

    let report = provisioner
        .provision(
            domain("example.com"),
            PipelineOptions {
                issue_certificate: true,
            },
        )
        .await;

    let stages: Vec<Stage> = report.events.iter().map(|e| e.stage).collect();
    assert_eq!(stages.len(), 7);
    assert_eq!(stages[5], Stage::IssuingCertificate);
    assert_eq!(stages[6], Stage::Completed);

    let lines = executor.command_lines();
    assert_eq!(
        lines[lines.len() - 2..],
        [
            "certbot --nginx -d example.com --non-interactive --agree-tos -m admin@example.com"
                .to_string(),
            "systemctl reload nginx".to_string(),
        ]
    );
}

#[tokio::test]
async fn privilege_wrapper_prefixes_every_command() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sandbox_config(dir.path());
    config.privilege_wrapper = Some("sudo".to_string());
    config.staging_dir = Some(dir.path().join("staging"));
    let lookup = Arc::new(MockDnsLookup::verified());
    let executor = Arc::new(RecordingExecutor::new());
    let provisioner = provisioner(config.clone(), &lookup, &executor);
    let domain = domain("example.com");

    let report = provisioner.provision(domain.clone(), OPTIONS).await;

    assert!(matches!(report.outcome, RunOutcome::Succeeded { .. }));
    let root = config.document_root(&domain);
    let root = root.display();
    let staged = config.staged_site(&domain);
    let available = config.available_site(&domain);
    let enabled = config.enabled_site(&domain);
    let pending = config.sites_enabled.join(".example.com.link");
    assert_eq!(
        executor.command_lines(),
        vec![
            format!("sudo mkdir -p {root}"),
            format!("sudo wget -nv -O {root}/latest.tar.gz https://wordpress.org/latest.tar.gz"),
            format!("sudo tar -xzf {root}/latest.tar.gz -C {root} --strip-components=1"),
            format!("sudo rm -f {root}/latest.tar.gz"),
            format!("sudo chown -R www-data:www-data {root}"),
            format!("sudo chmod -R 755 {root}"),
            format!("sudo mv -f {} {}", staged.display(), available.display()),
            format!("sudo ln -sfn {} {}", available.display(), pending.display()),
            format!("sudo mv -Tf {} {}", pending.display(), enabled.display()),
            "sudo systemctl reload nginx".to_string(),
        ]
    );

    // Privileged locations are only touched through the wrapper
    assert!(!config.hosting_root.exists());
    assert!(!config.sites_available.exists());
    assert!(!config.sites_enabled.exists());
}

#[tokio::test]
async fn step_timeout_is_reported_distinctly() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sandbox_config(dir.path());
    config.timeouts.extract_secs = 1;
    let lookup = Arc::new(MockDnsLookup::verified());
    let executor = Arc::new(RecordingExecutor::new().hang_on("tar"));
    let provisioner = provisioner(config, &lookup, &executor);

    let report = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        provisioner.provision(domain("example.com"), OPTIONS),
    )
    .await
    .expect("run ends once the step budget is spent");

    assert_eq!(
        report.outcome,
        RunOutcome::Failed(FailureReason::Timeout {
            stage: Stage::Extracting,
            program: "tar".to_string(),
            after_secs: 1,
        })
    );
    let last = report.events.last().unwrap();
    assert_eq!(last.kind, EventKind::Failure);
    assert!(last.message.contains("timed out"));
    assert_eq!(executor.programs(), vec!["wget", "tar"]);
}
