//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `serve`         | `Serve`, `InitDb`                                  |
//! | `seed`          | `Seed`                                             |
//! | `config`        | `Config`                                           |

pub mod config;
pub mod seed;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::Result;
use civic_sign::config::{SigningToml, get_config_dir};

pub use config::cmd_config;
pub use seed::cmd_seed;
pub use serve::{cmd_init_db, cmd_serve};

/// File configuration with environment overrides applied.
pub fn load_settings(project_dir: &Path) -> Result<SigningToml> {
    let mut settings = SigningToml::load_or_default(&get_config_dir(project_dir))?;
    settings.apply_env()?;
    Ok(settings)
}

/// Database location: the CLI flag wins over configuration, and relative
/// paths are taken from the project directory.
pub fn resolve_db_path(
    project_dir: &Path,
    settings: &SigningToml,
    cli_override: Option<&Path>,
) -> PathBuf {
    let path = cli_override.unwrap_or(&settings.database.path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}
