use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::api::{self, AppState};
use super::db::{DbHandle, SigningDb};
use super::verification::{
    HttpSmsSender, LogSmsSender, SmsSender, VerificationService, VerificationSettings,
};
use crate::config::{SigningToml, SmsGateway, SmsSection};

/// Configuration for the signing server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&SigningToml::default())
    }
}

impl From<&SigningToml> for ServerConfig {
    fn from(config: &SigningToml) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.database.path.clone(),
            dev_mode: config.server.dev_mode,
        }
    }
}

/// Build the application router. Dev mode allows any origin.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let mut app = api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Pick the SMS gateway named in the configuration.
pub fn build_sms_sender(sms: &SmsSection) -> Result<Arc<dyn SmsSender>> {
    match sms.gateway {
        SmsGateway::Log => Ok(Arc::new(LogSmsSender)),
        SmsGateway::Http => {
            let Some(endpoint) = sms.endpoint.as_deref() else {
                bail!("sms.endpoint is required when sms.gateway = \"http\"");
            };
            Ok(Arc::new(HttpSmsSender::new(endpoint, sms.api_key())))
        }
    }
}

/// Start the signing server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig, settings: &SigningToml) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = SigningDb::new(&config.db_path)
        .context("Failed to initialize signing database")?
        .with_session_ttl(settings.session.ttl_hours);
    let purged = db.purge_sessions(settings.session.ttl_hours)?;
    if purged > 0 {
        info!(purged, "expired sessions removed");
    }

    let sender = build_sms_sender(&settings.sms)?;
    let verification = Arc::new(VerificationService::new(
        sender,
        VerificationSettings::from(&settings.sms),
    )?);
    let state = Arc::new(AppState::new(DbHandle::new(db), verification, settings));
    let app = build_router(state, config.dev_mode);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        %local_addr,
        gateway = %settings.sms.gateway,
        db = %config.db_path.display(),
        "civic-sign listening"
    );
    println!("civic-sign running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
