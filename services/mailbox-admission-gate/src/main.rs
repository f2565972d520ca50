// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mailbox Admission Gate Service
//!
//! Decision service for temporary-mailbox creation requests. The mailbox API
//! (or a reverse proxy in front of it) calls `/check` before creating a
//! mailbox; the service counts the attempt, escalates to a CAPTCHA past the
//! threshold and refuses outright past the hard ceiling.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `CHALLENGE_THRESHOLD`: Attempts before a CAPTCHA is required (default: 5)
//! - `HARD_CEILING`: Attempts per window before a hard deny, 0 disables (default: 50)
//! - `WINDOW_SECS`: Counting window (default: 3600)
//! - `CAPTCHA_SITE_KEY` / `CAPTCHA_SECRET_KEY`: Provider keys
//! - `CAPTCHA_VERIFY_URL`: Provider siteverify endpoint
//! - `CAPTCHA_TIMEOUT_MS`: Verification timeout (default: 5000)
//! - `TRUST_FORWARDED_HEADERS`: Honour X-Forwarded-For (default: true)

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mailbox_admission_gate::{
    config::Config,
    handlers::{captcha_config, check, health, metrics, AppState},
    AdmissionGate, HttpCaptchaVerifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;
    info!(
        bind_addr = %config.bind_addr,
        challenge_threshold = config.policy.challenge_threshold,
        hard_ceiling = config.policy.hard_ceiling,
        window_secs = config.policy.window_secs,
        "Starting mailbox admission gate"
    );
    if config.captcha.site_key.is_empty() || config.captcha.secret_key.is_empty() {
        warn!("CAPTCHA keys not configured; every challenge will be rejected");
    }

    let verifier = Arc::new(HttpCaptchaVerifier::new(&config.captcha)?);
    let gate = Arc::new(AdmissionGate::new(&config, verifier)?);

    let state = Arc::new(AppState {
        gate: gate.clone(),
        config: config.clone(),
    });

    // Spawn cleanup task
    let cleanup_interval = config.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            gate.sweep().await;
        }
    });

    // Build router
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/captcha/config", get(captcha_config))
        .route("/check", post(check));
    if config.metrics.enabled {
        app = app.route(&config.metrics.path, get(metrics));
    }
    let app = app
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
