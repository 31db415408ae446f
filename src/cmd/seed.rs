//! Fixture loading: `civic-sign seed <file.toml>`.
//!
//! ```toml
//! [[initiative_types]]
//! title = "Municipal"
//! collects_extra_fields = true
//! requires_sms_verification = true
//! extra_fields_legal_text = "Data is kept until the initiative closes."
//!
//! [[initiatives]]
//! title = "More bike lanes"
//! initiative_type = "Municipal"
//! state = "published"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use civic_sign::config::SigningToml;
use civic_sign::signing::db::SigningDb;
use civic_sign::signing::models::InitiativeState;

use super::resolve_db_path;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub initiative_types: Vec<SeedInitiativeType>,
    #[serde(default)]
    pub initiatives: Vec<SeedInitiative>,
}

#[derive(Debug, Deserialize)]
pub struct SeedInitiativeType {
    pub title: String,
    #[serde(default)]
    pub collects_extra_fields: bool,
    #[serde(default)]
    pub requires_sms_verification: bool,
    #[serde(default)]
    pub extra_fields_legal_text: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedInitiative {
    pub title: String,
    /// Title of an initiative type, from this file or already stored
    pub initiative_type: String,
    #[serde(default = "default_state")]
    pub state: InitiativeState,
}

fn default_state() -> InitiativeState {
    InitiativeState::Published
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub types_created: usize,
    pub types_updated: usize,
    pub initiatives_created: usize,
}

impl SeedFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse seed file")
    }

    /// Upsert types by title, then insert initiatives.
    pub fn apply(&self, db: &SigningDb) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for t in &self.initiative_types {
            match db.find_initiative_type_by_title(&t.title)? {
                Some(existing) => {
                    db.update_initiative_type_requirements(
                        existing.id,
                        t.collects_extra_fields,
                        t.requires_sms_verification,
                    )?;
                    db.update_initiative_type_legal_text(existing.id, &t.extra_fields_legal_text)?;
                    summary.types_updated += 1;
                }
                None => {
                    db.create_initiative_type(
                        &t.title,
                        t.collects_extra_fields,
                        t.requires_sms_verification,
                        &t.extra_fields_legal_text,
                    )?;
                    summary.types_created += 1;
                }
            }
        }

        for i in &self.initiatives {
            let initiative_type = db
                .find_initiative_type_by_title(&i.initiative_type)?
                .with_context(|| {
                    format!(
                        "Initiative '{}' names unknown initiative type '{}'",
                        i.title, i.initiative_type
                    )
                })?;
            let created = db.create_initiative(&i.title, initiative_type.id, i.state)?;
            info!(initiative_id = created.id, title = %created.title, "initiative seeded");
            summary.initiatives_created += 1;
        }

        Ok(summary)
    }
}

pub fn cmd_seed(
    project_dir: &Path,
    settings: &SigningToml,
    file: &Path,
    db_path: Option<&Path>,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read seed file: {}", file.display()))?;
    let seed = SeedFile::parse(&content)?;

    let db_path = resolve_db_path(project_dir, settings, db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = SigningDb::new(&db_path)?;
    let summary = seed.apply(&db)?;

    println!(
        "Seeded {} initiative types ({} updated) and {} initiatives into {}",
        summary.types_created,
        summary.types_updated,
        summary.initiatives_created,
        db_path.display()
    );
    Ok(())
}
