// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission decisions.
//!
//! Precedence, first match wins:
//! 1. Window attempts beyond the hard ceiling -> `Deny`
//! 2. CAPTCHA flag already set -> `Challenge`
//! 3. Count at or above the challenge threshold -> `Challenge`
//! 4. Otherwise -> `Allow`
//!
//! The flag is consulted before the raw count so a caller cannot drift back
//! under the threshold without solving a challenge.

use crate::config::AdmissionPolicy;
use crate::store::CounterRecord;
use std::fmt;

/// Outcome of evaluating a counter record against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Challenge,
    Deny,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Challenge => "challenge",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide what to do with a request given its identity's current record.
pub fn evaluate(record: &CounterRecord, policy: &AdmissionPolicy) -> Verdict {
    if policy.ceiling_enabled() && record.window_attempts > policy.hard_ceiling {
        Verdict::Deny
    } else if record.captcha_required || record.count >= policy.challenge_threshold {
        Verdict::Challenge
    } else {
        Verdict::Allow
    }
}

/// True when the record has just crossed the threshold and still needs its
/// CAPTCHA flag set.
pub fn needs_gating(record: &CounterRecord, policy: &AdmissionPolicy) -> bool {
    !record.captcha_required && record.count >= policy.challenge_threshold
}
