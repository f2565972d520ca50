// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mailbox Admission Gate
//!
//! Abuse control for temporary-mailbox creation endpoints:
//!
//! - Per-caller attempt counting (user id when authenticated, else IP)
//! - CAPTCHA escalation once a caller reaches the challenge threshold
//! - Counter reset when the caller proves itself human, in the same request
//! - Hard ceiling per window that no amount of CAPTCHA solving gets past
//! - Fails closed when the CAPTCHA provider is slow or unavailable
//!
//! State lives in memory only; restarting the process clears all counters.

pub mod challenge;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod store;

pub use challenge::{ChallengeCoordinator, ChallengeVerifier, HttpCaptchaVerifier};
pub use config::{AdmissionPolicy, Config};
pub use error::GateError;
pub use evaluator::Verdict;
pub use gate::{admission_middleware, Admission, AdmissionGate};
pub use identity::{IdentityKey, Principal};
pub use store::{CounterRecord, CounterStore};
