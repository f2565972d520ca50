// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the admission gate.
//!
//! `GateError` values are terminal responses produced by the gate itself;
//! downstream handlers never see them.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Reasons the gate refuses to run the downstream handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("CAPTCHA verification required")]
    ChallengeRequired { site_key: String },

    #[error("CAPTCHA verification failed")]
    VerificationFailed { site_key: String },

    #[error("Too many attempts, retry in {}s", .retry_after.as_secs())]
    HardDenied { retry_after: Duration },
}

/// Failure talking to the CAPTCHA provider. Always folded into a rejection.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("verification timed out after {0:?}")]
    Timeout(Duration),

    #[error("verification service error: {0}")]
    Service(String),
}

/// Challenge response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeBody {
    pub error: &'static str,
    pub captcha_required: bool,
    pub captcha_site_key: String,
}

/// Hard-deny response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedBody {
    pub error: &'static str,
    pub retry_after_secs: u64,
}

impl GateError {
    /// Machine-readable code carried in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChallengeRequired { .. } => "CAPTCHA_REQUIRED",
            Self::VerificationFailed { .. } => "CAPTCHA_INVALID",
            Self::HardDenied { .. } => "RATE_LIMITED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ChallengeRequired { .. } | Self::HardDenied { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::VerificationFailed { .. } => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        match self {
            Self::ChallengeRequired { site_key } | Self::VerificationFailed { site_key } => (
                status,
                Json(ChallengeBody {
                    error: code,
                    captcha_required: true,
                    captcha_site_key: site_key,
                }),
            )
                .into_response(),
            Self::HardDenied { retry_after } => {
                // Rounded up to whole seconds
                let retry_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                (
                    status,
                    [(header::RETRY_AFTER, retry_secs.to_string())],
                    Json(DeniedBody {
                        error: code,
                        retry_after_secs: retry_secs,
                    }),
                )
                    .into_response()
            }
        }
    }
}
