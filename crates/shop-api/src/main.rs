//! # Digital Shop
//!
//! Storefront back-end for digital goods paid through Midtrans Snap.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export JWT_SECRET=change-me
//! export MIDTRANS_SERVER_KEY=SB-Mid-server-...
//! export MIDTRANS_CLIENT_KEY=SB-Mid-client-...
//! export FILES_BASE_URL=https://files.example.com
//!
//! # Run the server
//! digital-shop
//! ```

use shop_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    tracing_subscriber::registry()
        .with(filter)
        .with(json_logs.then(|| fmt::layer().json()))
        .with((!json_logs).then(|| fmt::layer()))
        .init();

    // Print banner
    print_banner();

    // Initialize application state
    let state = AppState::from_env().await?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Payment provider: {}", state.gateway.provider_name());
    info!("Order transition policy: {:?}", state.config.transition_policy);

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("Digital Shop starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Checkout: POST http://{}/api/payment/create-transaction", addr);
        info!("Notification: POST http://{}/api/payment/notification", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  Digital Shop
  ━━━━━━━━━━━━━━━━━━━━━━━
  Orders, payments, downloads
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
