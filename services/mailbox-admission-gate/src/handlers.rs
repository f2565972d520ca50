// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the admission gate service.
//!
//! `/check` lets a reverse proxy or the mailbox API ask for a decision
//! without embedding the middleware. `/captcha/config` serves the public
//! site key to the UI.

use crate::config::Config;
use crate::gate::{Admission, AdmissionGate};
use crate::identity::IdentityKey;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared application state.
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Public CAPTCHA configuration for the UI.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaConfigResponse {
    pub site_key: String,
    pub required: bool,
}

/// Admission check request (for external callers).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub ip: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub captcha_token: Option<String>,
}

/// Admission check response when the request may proceed.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub verified: bool,
}

#[derive(Debug, Serialize)]
struct BadRequest {
    error: &'static str,
    message: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "mailbox-admission-gate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Public challenge configuration. `required` is false because no caller
/// has been evaluated yet.
pub async fn captcha_config(State(state): State<Arc<AppState>>) -> Json<CaptchaConfigResponse> {
    let descriptor = state.gate.challenge_descriptor();
    Json(CaptchaConfigResponse {
        site_key: descriptor.site_key,
        required: false,
    })
}

/// Run the admission pipeline for a caller described in the request body.
///
/// Counts as an attempt for that caller, exactly like the middleware.
pub async fn check(State(state): State<Arc<AppState>>, Json(req): Json<CheckRequest>) -> Response {
    let ip: IpAddr = match req.ip.trim().parse() {
        Ok(ip) => ip,
        Err(_) => {
            warn!(ip = %req.ip, "Invalid IP address format");
            return (
                StatusCode::BAD_REQUEST,
                Json(BadRequest {
                    error: "INVALID_IP",
                    message: "Invalid IP address format".to_string(),
                }),
            )
                .into_response();
        }
    };

    let key = match req.user_id.as_deref().map(str::trim) {
        Some(user_id) if !user_id.is_empty() => IdentityKey::User(user_id.to_string()),
        _ => IdentityKey::Ip(ip.to_string()),
    };
    debug!(identity = %key, has_token = req.captcha_token.is_some(), "Processing admission check");

    match state
        .gate
        .admit(&key, req.captcha_token.as_deref(), Some(ip))
        .await
    {
        Ok(admission) => Json(CheckResponse {
            allowed: true,
            verified: admission == Admission::Verified,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    state
        .gate
        .metrics()
        .set_tracked_identities(state.gate.store().len().await);

    match state.gate.metrics().render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
