// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! NasPi — home NAS control panel backend
//!
//! Manages a small catalog of containerized services (media server, ad-blocking
//! DNS, ...) deployed as Portainer stacks:
//! - Reconciles the catalog against live Portainer stacks on every query
//! - Installs, removes, starts and stops catalog services
//! - Connects to Portainer lazily, tolerating it still booting

mod api;
mod auth;
mod bootstrap;
mod catalog;
mod config;
mod error;
mod lifecycle;
mod portainer;
mod reconcile;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use crate::bootstrap::{BootstrapGuard, RetryPolicy};
use crate::catalog::ServiceCatalog;
use crate::config::Settings;
use crate::lifecycle::LifecycleController;
use crate::portainer::HttpTransport;

/// NasPi — NAS service manager
#[derive(Parser)]
#[command(name = "naspi", version, about = "Home NAS control panel backend")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("naspi=info,actix_web=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    // A bad catalog is a deployment mistake; refuse to start
    let catalog = ServiceCatalog::load(settings.catalog_path.as_deref()).map_err(|e| {
        tracing::error!("❌ {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })?;
    let catalog = Arc::new(catalog);

    info!("");
    info!("  📦 NasPi v{}", env!("CARGO_PKG_VERSION"));
    info!("  ──────────────────────────────────");
    info!("  Services:   {}", catalog.definitions().iter().map(|d| d.key.as_str()).collect::<Vec<_>>().join(", "));
    info!("  Portainer:  {}", settings.portainer_url.as_deref().unwrap_or("(not configured)"));
    info!("  Admin key:  {}", if settings.admin_api_key.is_some() { "configured" } else { "missing — admin routes disabled" });
    info!("  API:        http://{}:{}", cli.bind, cli.port);
    info!("");

    let factory_settings = settings.clone();
    let factory_catalog = catalog.clone();
    let services = BootstrapGuard::new(RetryPolicy::default(), move || {
        let settings = factory_settings.clone();
        let catalog = factory_catalog.clone();
        async move {
            let portainer = settings.portainer()?;
            let transport = Arc::new(HttpTransport::new(&portainer)?);
            LifecycleController::connect(transport, &portainer, catalog).await
        }
    });

    let app_state = web::Data::new(api::AppState {
        catalog,
        services,
        admin_api_key: settings.admin_api_key.clone(),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(api::configure)
    })
    .bind(format!("{}:{}", cli.bind, cli.port))?
    .run()
    .await
}
