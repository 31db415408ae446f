use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Personal data collected for initiative types that require it.
pub type ExtraFields = BTreeMap<String, String>;

/// Personal data fields a signer must provide when the initiative type
/// collects extra fields.
pub const EXTRA_FIELD_NAMES: &[&str] = &[
    "name_and_surname",
    "document_number",
    "date_of_birth",
    "postal_code",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiativeType {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub collects_extra_fields: bool,
    #[serde(default)]
    pub requires_sms_verification: bool,
    #[serde(default)]
    pub extra_fields_legal_text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitiativeState {
    Created,
    Validating,
    Discarded,
    Published,
    Rejected,
    Accepted,
}

impl InitiativeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Validating => "validating",
            Self::Discarded => "discarded",
            Self::Published => "published",
            Self::Rejected => "rejected",
            Self::Accepted => "accepted",
        }
    }
}

impl FromStr for InitiativeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "validating" => Ok(Self::Validating),
            "discarded" => Ok(Self::Discarded),
            "published" => Ok(Self::Published),
            "rejected" => Ok(Self::Rejected),
            "accepted" => Ok(Self::Accepted),
            _ => Err(format!("Invalid initiative state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiative {
    pub id: i64,
    pub title: String,
    pub type_id: i64,
    pub state: InitiativeState,
    pub online_votes: i64,
    pub created_at: String,
}

impl Initiative {
    pub fn accepts_signatures(&self) -> bool {
        self.state == InitiativeState::Published
    }
}

/// An initiative together with the type configuration that drives its
/// signing plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentInitiative {
    pub initiative: Initiative,
    pub initiative_type: InitiativeType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub id: i64,
    pub initiative_id: i64,
    pub signer_id: String,
    pub extra_fields: Option<ExtraFields>,
    pub created_at: String,
}

/// One stage of the signing wizard. The declaration order is the fixed
/// order steps appear in any plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    FillPersonalData,
    SmsPhoneNumber,
    SmsCode,
    Finish,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FillPersonalData => "fill-personal-data",
            Self::SmsPhoneNumber => "sms-phone-number",
            Self::SmsCode => "sms-code",
            Self::Finish => "finish",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fill-personal-data" => Ok(Self::FillPersonalData),
            "sms-phone-number" => Ok(Self::SmsPhoneNumber),
            "sms-code" => Ok(Self::SmsCode),
            "finish" => Ok(Self::Finish),
            _ => Err(format!("Invalid step: {}", s)),
        }
    }
}

/// In-progress signature for one (initiative, signer) pair.
///
/// Stored as a flat JSON record in the signer's session between requests,
/// so it holds only plain data: the SMS challenge is referenced by its opaque
/// token, never by the code itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureAttempt {
    pub initiative_id: i64,
    pub signer_id: String,
    #[serde(default)]
    pub extra_fields: ExtraFields,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub sms_code_reference: Option<String>,
    pub current_step: Step,
    /// Plan in force when the attempt started.
    #[serde(default)]
    pub plan: Vec<Step>,
    pub started_at: DateTime<Utc>,
}

impl SignatureAttempt {
    pub fn new(initiative_id: i64, signer_id: &str, plan: &[Step]) -> Self {
        Self {
            initiative_id,
            signer_id: signer_id.to_string(),
            extra_fields: ExtraFields::new(),
            phone_number: None,
            sms_code_reference: None,
            current_step: plan.first().copied().unwrap_or(Step::Finish),
            plan: plan.to_vec(),
            started_at: Utc::now(),
        }
    }

    /// Key shared by the session slot and the verification service's
    /// challenge book.
    pub fn key(&self) -> String {
        attempt_key(self.initiative_id, &self.signer_id)
    }
}

pub fn attempt_key(initiative_id: i64, signer_id: &str) -> String {
    format!("initiative_signature:{}:{}", initiative_id, signer_id)
}

/// An issued SMS challenge as seen outside the verification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsChallenge {
    pub phone_number: String,
    pub code_reference: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_round_trips_through_path_segment() {
        for step in [
            Step::FillPersonalData,
            Step::SmsPhoneNumber,
            Step::SmsCode,
            Step::Finish,
        ] {
            assert_eq!(Step::from_str(step.as_str()).unwrap(), step);
        }
        assert!(Step::from_str("fill_personal_data").is_err());
    }

    #[test]
    fn step_serializes_as_kebab_case() {
        let json = serde_json::to_string(&Step::SmsPhoneNumber).unwrap();
        assert_eq!(json, "\"sms-phone-number\"");
    }

    #[test]
    fn initiative_type_flags_default_to_false() {
        let t: InitiativeType = serde_json::from_str(r#"{"id": 1, "title": "Local"}"#).unwrap();
        assert!(!t.collects_extra_fields);
        assert!(!t.requires_sms_verification);
        assert!(t.extra_fields_legal_text.is_empty());
    }

    #[test]
    fn only_published_initiatives_accept_signatures() {
        let mut initiative = Initiative {
            id: 1,
            title: "Parks".into(),
            type_id: 1,
            state: InitiativeState::Published,
            online_votes: 0,
            created_at: "2026-01-01 00:00:00".into(),
        };
        assert!(initiative.accepts_signatures());
        initiative.state = InitiativeState::Accepted;
        assert!(!initiative.accepts_signatures());
    }

    #[test]
    fn new_attempt_starts_at_first_planned_step() {
        let attempt = SignatureAttempt::new(3, "signer", &[Step::SmsPhoneNumber, Step::SmsCode, Step::Finish]);
        assert_eq!(attempt.current_step, Step::SmsPhoneNumber);
        assert!(attempt.extra_fields.is_empty());
        assert_eq!(attempt.key(), "initiative_signature:3:signer");
    }
}
