//! Server and database commands: `civic-sign serve`, `civic-sign init-db`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use civic_sign::config::SigningToml;
use civic_sign::signing::db::SigningDb;
use civic_sign::signing::server::{ServerConfig, start_server};

use super::resolve_db_path;

pub async fn cmd_serve(
    project_dir: &Path,
    mut settings: SigningToml,
    port: Option<u16>,
    db_path: Option<&Path>,
    dev: bool,
) -> Result<()> {
    if let Some(port) = port {
        settings.server.port = port;
    }
    if dev {
        settings.server.dev_mode = true;
    }
    for warning in settings.validate() {
        warn!(%warning, "configuration problem");
    }

    let mut config = ServerConfig::from(&settings);
    config.db_path = resolve_db_path(project_dir, &settings, db_path);
    start_server(config, &settings).await
}

pub fn cmd_init_db(project_dir: &Path, settings: &SigningToml, db_path: Option<&Path>) -> Result<()> {
    let db_path = resolve_db_path(project_dir, settings, db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    SigningDb::new(&db_path)?;
    println!("Signing database initialized at {}", db_path.display());
    Ok(())
}
