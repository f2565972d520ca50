// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission gate for mailbox-creation endpoints.
//!
//! Every request runs three stages:
//!
//! 1. **count and evaluate**: resolve the caller, count the attempt, decide
//! 2. **challenge**: gated callers without a proof token get the CAPTCHA payload
//! 3. **verify and reset**: a valid proof clears the caller's counter and the
//!    original request proceeds in the same exchange
//!
//! The attempt is counted before anything else, so challenged and denied
//! requests still add pressure.

use crate::challenge::{
    ChallengeCoordinator, ChallengeDescriptor, ChallengeVerifier, VerificationOutcome,
};
use crate::config::{AdmissionPolicy, Config, ConfigError};
use crate::error::GateError;
use crate::evaluator::{self, Verdict};
use crate::identity::{IdentityKey, IdentityResolver, Principal};
use crate::metrics::GateMetrics;
use crate::store::{CounterRecord, CounterStore};
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Header carrying a CAPTCHA proof token.
pub const CAPTCHA_TOKEN_HEADER: &str = "x-captcha-token";

/// Largest request body buffered while looking for a `captchaToken` field.
const MAX_TOKEN_BODY_BYTES: usize = 64 * 1024;

/// How a request got through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Under the challenge threshold
    Allowed,
    /// Gated, but a proof token verified and the counter was reset
    Verified,
}

/// Result of the count-and-evaluate stage.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub record: CounterRecord,
    pub verdict: Verdict,
}

/// Shared admission gate. Construct once at startup and share via `Arc`.
pub struct AdmissionGate {
    policy: AdmissionPolicy,
    resolver: IdentityResolver,
    store: Arc<CounterStore>,
    coordinator: ChallengeCoordinator,
    metrics: GateMetrics,
}

impl AdmissionGate {
    /// Build a gate from configuration and a CAPTCHA verifier.
    pub fn new(config: &Config, verifier: Arc<dyn ChallengeVerifier>) -> Result<Self, ConfigError> {
        config.policy.validate()?;
        let metrics = GateMetrics::new().map_err(|e| ConfigError::Metrics(e.to_string()))?;
        let store = Arc::new(CounterStore::new(&config.policy));
        let coordinator = ChallengeCoordinator::new(
            config.captcha.site_key.clone(),
            config.captcha.verify_timeout(),
            verifier,
            store.clone(),
        );

        Ok(Self {
            policy: config.policy.clone(),
            resolver: IdentityResolver::new(config.identity.trust_forwarded_headers),
            store,
            coordinator,
            metrics,
        })
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Public challenge material, for clients that pre-render the widget.
    pub fn challenge_descriptor(&self) -> ChallengeDescriptor {
        self.coordinator.descriptor()
    }

    /// Stage 1: count the attempt and decide.
    ///
    /// Flags the identity the first time its count reaches the threshold,
    /// including when the verdict is `Deny`.
    pub async fn assess(&self, key: &IdentityKey) -> Assessment {
        let mut record = self.store.observe(key).await;

        if evaluator::needs_gating(&record, &self.policy) && self.store.mark_challenged(key).await {
            info!(identity = %key, count = record.count, "Challenge threshold reached");
            record.captcha_required = true;
        }

        let verdict = evaluator::evaluate(&record, &self.policy);
        self.metrics.record_verdict(verdict);
        debug!(
            identity = %key,
            count = record.count,
            window_attempts = record.window_attempts,
            %verdict,
            "Admission evaluated"
        );

        Assessment { record, verdict }
    }

    /// Stages 2 and 3 for a request whose verdict was `Challenge`.
    pub async fn resolve_challenge(
        &self,
        key: &IdentityKey,
        proof: Option<&str>,
        remote_ip: Option<IpAddr>,
    ) -> Result<Admission, GateError> {
        let site_key = self.coordinator.site_key().to_string();
        let Some(token) = proof.map(str::trim).filter(|t| !t.is_empty()) else {
            debug!(identity = %key, "No CAPTCHA proof, issuing challenge");
            return Err(GateError::ChallengeRequired { site_key });
        };

        let outcome = self.coordinator.verify(key, token, remote_ip).await;
        self.metrics.record_verification(&outcome);
        match outcome {
            VerificationOutcome::Verified => Ok(Admission::Verified),
            VerificationOutcome::Rejected(_) => Err(GateError::VerificationFailed { site_key }),
        }
    }

    /// Run the full pipeline for one request.
    pub async fn admit(
        &self,
        key: &IdentityKey,
        proof: Option<&str>,
        remote_ip: Option<IpAddr>,
    ) -> Result<Admission, GateError> {
        let assessment = self.assess(key).await;
        self.decide(key, &assessment, proof, remote_ip).await
    }

    async fn decide(
        &self,
        key: &IdentityKey,
        assessment: &Assessment,
        proof: Option<&str>,
        remote_ip: Option<IpAddr>,
    ) -> Result<Admission, GateError> {
        match assessment.verdict {
            Verdict::Allow => Ok(Admission::Allowed),
            Verdict::Challenge => self.resolve_challenge(key, proof, remote_ip).await,
            Verdict::Deny => {
                let retry_after = assessment.record.window_remaining(self.store.window());
                warn!(
                    identity = %key,
                    window_attempts = assessment.record.window_attempts,
                    retry_after_secs = retry_after.as_secs(),
                    "Hard ceiling exceeded, denying"
                );
                Err(GateError::HardDenied { retry_after })
            }
        }
    }

    /// Drop expired records and refresh the tracked-identity gauge.
    pub async fn sweep(&self) -> usize {
        let evicted = self.store.evict_expired().await;
        self.metrics.set_tracked_identities(self.store.len().await);
        if evicted > 0 {
            debug!(evicted, "Evicted expired counter records");
        }
        evicted
    }
}

#[derive(Debug, Deserialize)]
struct TokenField {
    #[serde(default, rename = "captchaToken")]
    captcha_token: Option<String>,
}

fn header_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(CAPTCHA_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Pull `captchaToken` out of a JSON body, handing back a request with the
/// same body bytes for the downstream handler. `None` if the body could not
/// be read within the size limit.
async fn body_token(request: Request) -> Option<(Option<String>, Request)> {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_TOKEN_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(error = %err, "Unreadable body while looking for CAPTCHA token");
            return None;
        }
    };

    let token = serde_json::from_slice::<TokenField>(&bytes)
        .ok()
        .and_then(|field| field.captcha_token);
    Some((token, Request::from_parts(parts, Body::from(bytes))))
}

/// Axum middleware guarding mailbox-creation routes.
///
/// ```ignore
/// Router::new()
///     .route("/api/temp-emails", post(create_temp_email))
///     .route_layer(axum::middleware::from_fn_with_state(gate.clone(), admission_middleware))
/// ```
///
/// Authenticated routes should run their auth layer first so a [`Principal`]
/// is present in the request extensions.
pub async fn admission_middleware(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let principal = request.extensions().get::<Principal>().cloned();
    let key = gate
        .resolver
        .resolve(principal.as_ref(), request.headers(), remote);
    let remote_ip = gate.resolver.caller_ip(request.headers(), remote);

    let assessment = gate.assess(&key).await;
    if assessment.verdict != Verdict::Challenge {
        return match gate.decide(&key, &assessment, None, remote_ip).await {
            Ok(_) => next.run(request).await,
            Err(err) => err.into_response(),
        };
    }

    let (proof, request) = match header_token(&request) {
        Some(token) => (Some(token), request),
        None => match body_token(request).await {
            Some(found) => found,
            None => {
                return GateError::ChallengeRequired {
                    site_key: gate.coordinator.site_key().to_string(),
                }
                .into_response()
            }
        },
    };

    match gate.resolve_challenge(&key, proof.as_deref(), remote_ip).await {
        Ok(admission) => {
            debug!(identity = %key, ?admission, "Challenge passed, forwarding");
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
