// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for abuse simulation.

use mailbox_admission_gate::IdentityKey;
use std::net::{IpAddr, Ipv4Addr};

/// Prefix the simulation verifier accepts as a genuine solve.
pub const SOLVED_PREFIX: &str = "solved-";

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Generate a pool of authenticated user identities.
pub fn generate_users(count: usize) -> Vec<IdentityKey> {
    (0..count)
        .map(|i| IdentityKey::User(format!("user-{i:04}")))
        .collect()
}

/// Token that the simulation verifier will accept.
pub fn solved_token(index: usize) -> String {
    format!("{SOLVED_PREFIX}{index}")
}

/// Token that the simulation verifier will reject.
pub fn forged_token(index: usize) -> String {
    format!("forged-{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_generate_users() {
        let users = generate_users(3);
        assert_eq!(users[2].to_string(), "user:user-0002");
    }

    #[test]
    fn test_tokens() {
        assert!(solved_token(1).starts_with(SOLVED_PREFIX));
        assert!(!forged_token(1).starts_with(SOLVED_PREFIX));
    }
}
