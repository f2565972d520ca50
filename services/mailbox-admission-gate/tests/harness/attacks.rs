// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Abuse patterns for security testing.

/// How an attacker responds to a CAPTCHA demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveBehaviour {
    /// Never submits a token
    Ignore,
    /// Submits a valid token with every request (human or paid solving farm)
    AlwaysSolve,
    /// Submits tokens the provider rejects
    Forge,
}

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of mailbox-creation requests to send
    pub total_requests: usize,
    /// Number of unique addresses to rotate through
    pub unique_ips: usize,
    /// Number of authenticated users; 0 means anonymous requests
    pub unique_users: usize,
    /// Response to challenges
    pub solve: SolveBehaviour,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            unique_users: 0,
            solve: SolveBehaviour::Ignore,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Single address hammering the public creation endpoint.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 200,
            ..Default::default()
        }
    }

    /// Bot wired to a CAPTCHA solving service.
    pub fn solver_loop() -> Self {
        Self {
            total_requests: 200,
            solve: SolveBehaviour::AlwaysSolve,
            ..Default::default()
        }
    }

    /// Bot submitting garbage tokens hoping one sticks.
    pub fn forged_tokens() -> Self {
        Self {
            total_requests: 100,
            solve: SolveBehaviour::Forge,
            ..Default::default()
        }
    }

    /// Many addresses, a handful of requests each.
    pub fn distributed_flood() -> Self {
        Self {
            total_requests: 500,
            unique_ips: 100,
            ..Default::default()
        }
    }

    /// One account rotating through addresses.
    pub fn account_ip_rotation() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 50,
            unique_users: 1,
            ..Default::default()
        }
    }
}

/// Expected outcomes for an attack pattern under a given policy.
pub struct AttackExpectations {
    /// Maximum number of requests that may reach the creation handler
    pub max_admitted: usize,
    /// Description of expected behavior
    pub description: &'static str,
}

impl AttackConfig {
    /// Upper bound on admitted requests for `threshold` / `ceiling`
    /// (ceiling 0 = disabled).
    pub fn expectations(&self, threshold: u32, ceiling: u32) -> AttackExpectations {
        let threshold = threshold as usize;
        let buckets = if self.unique_users > 0 {
            self.unique_users
        } else {
            self.unique_ips
        };

        match self.solve {
            SolveBehaviour::AlwaysSolve if ceiling > 0 => AttackExpectations {
                max_admitted: buckets * ceiling as usize,
                description: "Solving is capped by the per-window ceiling",
            },
            SolveBehaviour::AlwaysSolve => AttackExpectations {
                max_admitted: self.total_requests,
                description: "Without a ceiling, solved challenges always pass",
            },
            SolveBehaviour::Ignore | SolveBehaviour::Forge => AttackExpectations {
                max_admitted: buckets * threshold.saturating_sub(1),
                description: "Each identity gets threshold-1 free attempts",
            },
        }
    }
}
