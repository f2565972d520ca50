// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! CAPTCHA challenge coordination.
//!
//! The coordinator hands out public challenge material, checks proof tokens
//! against an external verifier and, on success, resets the caller's
//! counter. Verifier errors and timeouts are rejections: the gate fails
//! closed when the provider is unavailable.

use crate::config::{CaptchaConfig, ConfigError};
use crate::error::VerifyError;
use crate::identity::IdentityKey;
use crate::store::CounterStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// External CAPTCHA verification capability.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    /// Returns `Ok(true)` if the provider accepts `token` for this caller.
    async fn verify(&self, token: &str, remote_ip: Option<IpAddr>) -> Result<bool, VerifyError>;
}

/// Public material a client needs to render the challenge widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDescriptor {
    pub site_key: String,
    pub required: bool,
}

/// Result of checking a proof token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Provider said no
    Invalid,
    /// Empty token submitted
    EmptyToken,
    /// Provider errored or did not answer in time
    Unavailable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::EmptyToken => "empty_token",
            Self::Unavailable => "unavailable",
        }
    }
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Rejected(reason) => reason.as_str(),
        }
    }
}

/// Orchestrates challenge issue, verification and counter reset.
pub struct ChallengeCoordinator {
    site_key: String,
    timeout: Duration,
    verifier: Arc<dyn ChallengeVerifier>,
    store: Arc<CounterStore>,
}

impl ChallengeCoordinator {
    pub fn new(
        site_key: impl Into<String>,
        timeout: Duration,
        verifier: Arc<dyn ChallengeVerifier>,
        store: Arc<CounterStore>,
    ) -> Self {
        Self {
            site_key: site_key.into(),
            timeout,
            verifier,
            store,
        }
    }

    /// Challenge material for a gated caller.
    pub fn descriptor(&self) -> ChallengeDescriptor {
        ChallengeDescriptor {
            site_key: self.site_key.clone(),
            required: true,
        }
    }

    pub fn site_key(&self) -> &str {
        &self.site_key
    }

    /// Check `token` for `key` and reset the identity on success.
    ///
    /// The store is not locked while the provider is consulted.
    pub async fn verify(
        &self,
        key: &IdentityKey,
        token: &str,
        remote_ip: Option<IpAddr>,
    ) -> VerificationOutcome {
        let token = token.trim();
        if token.is_empty() {
            debug!(identity = %key, "Empty CAPTCHA token");
            return VerificationOutcome::Rejected(RejectReason::EmptyToken);
        }

        let result = match tokio::time::timeout(self.timeout, self.verifier.verify(token, remote_ip))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(VerifyError::Timeout(self.timeout)),
        };

        match result {
            Ok(true) => {
                self.store.reset(key).await;
                info!(identity = %key, "CAPTCHA verified, counter reset");
                VerificationOutcome::Verified
            }
            Ok(false) => {
                info!(identity = %key, "CAPTCHA rejected by provider");
                VerificationOutcome::Rejected(RejectReason::Invalid)
            }
            Err(err) => {
                warn!(identity = %key, error = %err, "CAPTCHA verification unavailable, rejecting");
                VerificationOutcome::Rejected(RejectReason::Unavailable)
            }
        }
    }
}

/// Provider reply from a "siteverify" endpoint.
#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Verifier for the reCAPTCHA / hCaptcha / Turnstile "siteverify" API.
pub struct HttpCaptchaVerifier {
    client: reqwest::Client,
    verify_url: Url,
    secret_key: String,
}

impl HttpCaptchaVerifier {
    pub fn new(config: &CaptchaConfig) -> Result<Self, ConfigError> {
        let verify_url = config.parsed_verify_url()?;
        let client = reqwest::Client::builder()
            .timeout(config.verify_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            verify_url,
            secret_key: config.secret_key.clone(),
        })
    }
}

#[async_trait]
impl ChallengeVerifier for HttpCaptchaVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<IpAddr>) -> Result<bool, VerifyError> {
        let remote_ip = remote_ip.map(|ip| ip.to_string());
        let mut form = vec![("secret", self.secret_key.as_str()), ("response", token)];
        if let Some(ip) = remote_ip.as_deref() {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(self.verify_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Service(format!("provider returned {status}")));
        }

        let body: SiteVerifyResponse = response.json().await?;
        if !body.success {
            debug!(error_codes = ?body.error_codes, "Provider rejected token");
        }
        Ok(body.success)
    }
}
