//! REST server for the HR dashboard
//!
//! Proxies the spreadsheet scripts and serves the page reports.
//!
//! Usage:
//!   ./target/release/api_server [--port PORT]
//!
//! Configuration comes from the environment (and `.env`): `HTTP_PORT` and
//! `HR_<SOURCE>_URL` for each sheet. `--port` wins over `HTTP_PORT`.

use anyhow::Result;
use clap::Parser;
use hr_dashboard::api::{create_router, DashboardService};
use hr_dashboard::config::{self, Config};
use hr_dashboard::models::Source;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "api_server")]
#[command(about = "HR dashboard API: sheet proxy and report endpoints")]
struct Args {
    /// Port to listen on (overrides HTTP_PORT)
    #[arg(long)]
    port: Option<u16>,
}

fn print_banner(port: u16, config: &Config) {
    println!("============================================================");
    println!("              HR DASHBOARD API SERVER");
    println!("============================================================");
    println!();
    println!("  Port:     {}", port);
    println!("  REST:     http://localhost:{}/api/", port);
    println!();
    println!("Sheet proxies:");
    for source in Source::ALL {
        let state = if config.source(source).url.is_some() {
            "configured"
        } else {
            "NOT CONFIGURED"
        };
        println!("  GET {:<28}{}", source.api_path(), state);
    }
    println!("  POST /api/admin/upload          Forward to a script URL");
    println!();
    println!("Reports:");
    println!("  GET  /api/reports/dashboard     Home page figures");
    for page in ["attendance", "performance", "recruitment", "sortie", "turnover", "workforce"] {
        println!("  GET  /api/reports/{:<14}Page report", page);
    }
    println!("  POST /api/reports/sector        Roster analytics");
    println!();
    println!("============================================================");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let args = Args::parse();
    let config = config::load()?;
    let port = args.port.unwrap_or(config.http_port);

    print_banner(port, &config);

    let service = Arc::new(DashboardService::new(config));
    let app = create_router(service);

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    tracing::info!("Starting REST server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
