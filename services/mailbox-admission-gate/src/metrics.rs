// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for admission decisions.

use crate::challenge::VerificationOutcome;
use crate::evaluator::Verdict;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metric handles registered on a private registry.
#[derive(Clone)]
pub struct GateMetrics {
    registry: Registry,
    verdicts: IntCounterVec,
    verifications: IntCounterVec,
    tracked_identities: IntGauge,
}

impl GateMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let verdicts = IntCounterVec::new(
            Opts::new("admission_verdicts_total", "Admission verdicts by outcome"),
            &["verdict"],
        )?;
        let verifications = IntCounterVec::new(
            Opts::new(
                "captcha_verifications_total",
                "CAPTCHA proof checks by outcome",
            ),
            &["outcome"],
        )?;
        let tracked_identities = IntGauge::new(
            "admission_tracked_identities",
            "Identities currently held in the counter store",
        )?;

        registry.register(Box::new(verdicts.clone()))?;
        registry.register(Box::new(verifications.clone()))?;
        registry.register(Box::new(tracked_identities.clone()))?;

        Ok(Self {
            registry,
            verdicts,
            verifications,
            tracked_identities,
        })
    }

    pub fn record_verdict(&self, verdict: Verdict) {
        self.verdicts.with_label_values(&[verdict.as_str()]).inc();
    }

    pub fn record_verification(&self, outcome: &VerificationOutcome) {
        self.verifications
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn set_tracked_identities(&self, count: usize) {
        self.tracked_identities
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn verdict_count(&self, verdict: Verdict) -> u64 {
        self.verdicts.with_label_values(&[verdict.as_str()]).get()
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
