// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Caller identity resolution.
//!
//! Authenticated callers are bucketed by user id so that switching networks
//! does not reset their counters. Anonymous callers are bucketed by network
//! address.

use axum::http::HeaderMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Authenticated principal, inserted into request extensions by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Key under which a caller's admission state is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Authenticated user id
    User(String),
    /// Network address (or `unknown` when none could be determined)
    Ip(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Ip(addr) => write!(f, "ip:{addr}"),
        }
    }
}

/// Derives identity keys from request metadata.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    trust_forwarded_headers: bool,
}

impl IdentityResolver {
    pub fn new(trust_forwarded_headers: bool) -> Self {
        Self {
            trust_forwarded_headers,
        }
    }

    /// Resolve the caller's identity key. Never fails.
    pub fn resolve(
        &self,
        principal: Option<&Principal>,
        headers: &HeaderMap,
        remote: Option<SocketAddr>,
    ) -> IdentityKey {
        if let Some(principal) = principal.filter(|p| !p.user_id.trim().is_empty()) {
            return IdentityKey::User(principal.user_id.trim().to_string());
        }

        let addr = self
            .caller_address(headers, remote)
            .unwrap_or_else(|| "unknown".to_string());
        debug!(%addr, "Resolved anonymous caller");
        IdentityKey::Ip(addr)
    }

    /// Network address of the caller, forwarded headers first when trusted.
    ///
    /// Also used as the `remoteip` hint for CAPTCHA verification.
    pub fn caller_address(&self, headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<String> {
        if self.trust_forwarded_headers {
            if let Some(addr) = forwarded_for(headers) {
                return Some(addr);
            }
        }
        remote.map(|r| r.ip().to_string())
    }

    /// Caller address parsed as an IP, if it is one.
    pub fn caller_ip(&self, headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<IpAddr> {
        self.caller_address(headers, remote)
            .and_then(|addr| addr.parse().ok())
    }
}

/// First entry of X-Forwarded-For, falling back to X-Real-IP.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let first_forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    first_forwarded.or_else(real_ip).map(normalize_address)
}

/// Canonicalise textual IPs so `::FFFF:1.2.3.4`-style variants share a bucket.
fn normalize_address(addr: &str) -> String {
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Ok(ip) => ip.to_string(),
        Err(_) => addr.to_lowercase(),
    }
}
