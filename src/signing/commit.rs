use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use super::db::{DbHandle, RecordOutcome};
use super::models::{EXTRA_FIELD_NAMES, ExtraFields, FieldError, InitiativeType};
use crate::errors::CommitError;

/// Records signatures durably.
///
/// The database uniqueness constraint is the only arbiter between concurrent
/// commits for the same (initiative, signer) pair; this service never checks
/// first and then inserts.
#[derive(Clone)]
pub struct VoteCommitService {
    db: DbHandle,
}

impl VoteCommitService {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Record `signer_id`'s signature on `initiative_id`. Extra fields are
    /// validated and stored only when the initiative type collects them.
    pub async fn commit(
        &self,
        initiative_id: i64,
        signer_id: &str,
        extra_fields: Option<ExtraFields>,
    ) -> Result<i64, CommitError> {
        let signer = signer_id.to_string();
        let outcome = self
            .db
            .call(move |db| {
                let Some(current) = db.current_initiative(initiative_id)? else {
                    return Ok(Err(CommitError::InitiativeNotFound { id: initiative_id }));
                };

                let mut reasons = Vec::new();
                if !current.initiative.accepts_signatures() {
                    reasons.push(FieldError::new("base", "initiative is not accepting signatures"));
                }
                let fields = if current.initiative_type.collects_extra_fields {
                    let fields = extra_fields.unwrap_or_default();
                    if let Err(field_errors) =
                        validate_extra_fields(&current.initiative_type, &fields)
                    {
                        reasons.extend(field_errors);
                    }
                    Some(fields)
                } else {
                    None
                };
                if !reasons.is_empty() {
                    return Ok(Err(CommitError::ValidationFailed(reasons)));
                }

                match db.record_signature(initiative_id, &signer, fields.as_ref())? {
                    RecordOutcome::Recorded(signature) => Ok(Ok(signature.id)),
                    RecordOutcome::Duplicate => Ok(Err(CommitError::AlreadySigned {
                        initiative_id,
                        signer_id: signer,
                    })),
                }
            })
            .await
            .map_err(CommitError::Database)?;

        match &outcome {
            Ok(signature_id) => {
                info!(initiative_id, %signer_id, signature_id, "signature recorded")
            }
            Err(CommitError::AlreadySigned { .. }) => {
                info!(initiative_id, %signer_id, "duplicate signature rejected")
            }
            Err(e) => warn!(initiative_id, %signer_id, error = %e, "signature rejected"),
        }
        outcome
    }
}

/// Check personal data against the fields an initiative type collects.
/// Types that don't collect extra fields accept anything (it is discarded).
pub fn validate_extra_fields(
    initiative_type: &InitiativeType,
    fields: &ExtraFields,
) -> Result<(), Vec<FieldError>> {
    if !initiative_type.collects_extra_fields {
        return Ok(());
    }

    let mut errors = Vec::new();
    for key in fields.keys() {
        if !EXTRA_FIELD_NAMES.contains(&key.as_str()) {
            errors.push(FieldError::new(key, "is not a recognized field"));
        }
    }

    for name in EXTRA_FIELD_NAMES {
        let value = fields.get(*name).map(|v| v.trim()).unwrap_or_default();
        if value.is_empty() {
            errors.push(FieldError::new(name, "can't be blank"));
            continue;
        }
        let problem = match *name {
            "date_of_birth" => check_date_of_birth(value),
            "document_number" => check_document_number(value),
            "postal_code" => check_postal_code(value),
            _ => None,
        };
        if let Some(message) = problem {
            errors.push(FieldError::new(name, message));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_date_of_birth(value: &str) -> Option<&'static str> {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) if date > Utc::now().date_naive() => Some("can't be in the future"),
        Ok(_) => None,
        Err(_) => Some("must be a date in YYYY-MM-DD format"),
    }
}

fn check_document_number(value: &str) -> Option<&'static str> {
    let valid = (4..=20).contains(&value.len()) && value.chars().all(|c| c.is_ascii_alphanumeric());
    (!valid).then_some("must be 4 to 20 letters or digits")
}

fn check_postal_code(value: &str) -> Option<&'static str> {
    let valid = (3..=10).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-');
    (!valid).then_some("is invalid")
}

#[cfg(test)]
pub(crate) fn valid_extra_fields() -> ExtraFields {
    [
        ("name_and_surname", "Ada Lovelace"),
        ("document_number", "12345678Z"),
        ("date_of_birth", "1990-04-12"),
        ("postal_code", "08001"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
