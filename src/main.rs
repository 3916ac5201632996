use std::sync::Arc;

use clap::Parser;
use pixauth::cli::{Args, build_auth_config, build_flow, init_logging, open_database};
use pixauth::clock::{Clock, SystemClock};
use pixauth::rate_limit::RateLimitConfig;
use pixauth::{ServerConfig, init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(auth) = build_auth_config(&args) else {
        std::process::exit(1);
    };

    let Some(flow) = build_flow(&args, &auth) else {
        std::process::exit(1);
    };
    info!(providers = ?flow.provider_names(), "OAuth providers registered");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let Some(db) = open_database(&args.database, clock.clone(), auth.store_timeout).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    init_cleanup(&db).await;

    let config = ServerConfig {
        db,
        auth,
        clock,
        flow,
        secure_cookies: args.secure_cookies,
        rate_limits: RateLimitConfig::new(args.client_ip_header),
    };

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
