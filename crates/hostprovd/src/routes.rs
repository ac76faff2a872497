//! HTTP routes
//!
//! Thin adapters from requests to [`Provisioner`] calls. Domains are
//! validated here, before anything reaches the core.

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hostprov_core::{DomainName, PipelineOptions, Provisioner, RunOutcome, RunReport};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};

/// Body of the provisioning endpoints
#[derive(Debug, Deserialize)]
pub struct DomainRequest {
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub domain: DomainName,
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub domain: DomainName,
    pub txt_verified: bool,
    pub a_record_verified: bool,
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub struct InstallResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_url: Option<String>,
}

pub fn router(provisioner: Provisioner) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/verify/txt/:domain", get(verify_txt))
        .route("/verify/a/:domain", get(verify_a))
        .route("/is_verified/:domain", get(is_verified))
        .route("/install", post(install))
        .route("/install/stream", post(install_stream))
        .route("/certificate", post(certificate))
        .with_state(provisioner)
}

fn parse_domain(raw: &str) -> ApiResult<DomainName> {
    DomainName::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

async fn health() -> &'static str {
    "ok"
}

async fn verify_txt(
    State(provisioner): State<Provisioner>,
    Path(domain): Path<String>,
) -> ApiResult<Json<CheckResponse>> {
    let domain = parse_domain(&domain)?;
    let verified = provisioner.check_ownership_token(&domain).await;
    Ok(Json(CheckResponse { domain, verified }))
}

async fn verify_a(
    State(provisioner): State<Provisioner>,
    Path(domain): Path<String>,
) -> ApiResult<Json<CheckResponse>> {
    let domain = parse_domain(&domain)?;
    let verified = provisioner.check_address_record(&domain).await;
    Ok(Json(CheckResponse { domain, verified }))
}

async fn is_verified(
    State(provisioner): State<Provisioner>,
    Path(domain): Path<String>,
) -> ApiResult<Json<VerificationResponse>> {
    let domain = parse_domain(&domain)?;
    let state = provisioner.verification(&domain).await;
    Ok(Json(VerificationResponse {
        domain,
        txt_verified: state.txt_verified,
        a_record_verified: state.a_record_verified,
        verified: state.is_verified(),
    }))
}

/// Run to completion and answer with the terminal result
async fn install(
    State(provisioner): State<Provisioner>,
    Json(request): Json<DomainRequest>,
) -> ApiResult<Json<InstallResponse>> {
    let domain = parse_domain(&request.domain)?;
    info!(%domain, "Install requested");

    let options = PipelineOptions::from_config(provisioner.config());
    let report = provisioner.provision(domain, options).await;
    into_response(report)
}

/// Run in the background and stream every event as one JSON line
///
/// The run is cancelled if the client goes away.
async fn install_stream(
    State(provisioner): State<Provisioner>,
    Json(request): Json<DomainRequest>,
) -> ApiResult<Response> {
    let domain = parse_domain(&request.domain)?;
    info!(%domain, "Streaming install requested");

    let options = PipelineOptions::from_config(provisioner.config());
    let lines = provisioner.start(domain, options).map(|event| {
        debug!(stage = %event.stage, "Streaming event");
        serde_json::to_string(&event).map(|mut line| {
            line.push('\n');
            line
        })
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

async fn certificate(
    State(provisioner): State<Provisioner>,
    Json(request): Json<DomainRequest>,
) -> ApiResult<Json<InstallResponse>> {
    let domain = parse_domain(&request.domain)?;
    info!(%domain, "Certificate requested");
    into_response(provisioner.issue_certificate(&domain).await)
}

fn into_response(report: RunReport) -> ApiResult<Json<InstallResponse>> {
    let message = report
        .events
        .last()
        .map(|event| event.message.clone())
        .unwrap_or_default();

    match report.outcome {
        RunOutcome::Succeeded { setup_url } => Ok(Json(InstallResponse {
            message,
            setup_url: Some(setup_url),
        })),
        RunOutcome::AlreadyInstalled => Ok(Json(InstallResponse {
            message,
            setup_url: None,
        })),
        RunOutcome::Failed(reason) => Err(ApiError::from_failure(&reason, message)),
    }
}
