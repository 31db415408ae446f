use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::commit::{VoteCommitService, validate_extra_fields};
use super::db::DbHandle;
use super::models::{CurrentInitiative, ExtraFields, FieldError, SignatureAttempt, Step};
use super::planner::{StepPlan, StepPlanner};
use super::session::{Session, WizardStateStore};
use super::verification::VerificationService;
use crate::errors::{CommitError, SigningError, VerificationError};

/// What the signer submitted for a step.
#[derive(Debug, Clone)]
pub enum StepInput {
    PersonalData(ExtraFields),
    PhoneNumber(String),
    Code(String),
    Confirm,
}

impl StepInput {
    pub fn step(&self) -> Step {
        match self {
            StepInput::PersonalData(_) => Step::FillPersonalData,
            StepInput::PhoneNumber(_) => Step::SmsPhoneNumber,
            StepInput::Code(_) => Step::SmsCode,
            StepInput::Confirm => Step::Finish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Ok,
    /// Input was rejected; the step is shown again.
    Invalid,
    /// A collaborator (the SMS gateway) failed; retrying may help.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Notice,
    PersonalDataInvalid,
    InvalidPhoneFormat,
    SmsUnavailable,
    CodeMismatch,
    ChallengeExpired,
    SignatureRejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub retryable: bool,
}

impl Alert {
    fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
        }
    }

    fn from_verification(err: &VerificationError) -> Self {
        let kind = match err {
            VerificationError::InvalidPhoneFormat { .. } => AlertKind::InvalidPhoneFormat,
            VerificationError::CodeMismatch => AlertKind::CodeMismatch,
            VerificationError::ChallengeExpired | VerificationError::AttemptsExhausted { .. } => {
                AlertKind::ChallengeExpired
            }
            VerificationError::DispatchTimeout { .. } | VerificationError::DispatchFailed(_) => {
                AlertKind::SmsUnavailable
            }
        };
        Self {
            kind,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Everything a view needs to draw one wizard step.
#[derive(Debug, Clone, Serialize)]
pub struct StepPage {
    pub initiative_id: i64,
    pub initiative_title: String,
    pub step: Step,
    pub plan: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_text: Option<String>,
    pub extra_fields: ExtraFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<Alert>,
    pub status: PageStatus,
}

#[derive(Debug, Clone)]
pub enum WizardOutcome {
    /// Go to this step.
    Redirect(Step),
    /// Show a step.
    Page(StepPage),
    /// Signature recorded; the attempt is gone.
    Completed { signature_id: i64, online_votes: i64 },
    /// The signer had already signed; the attempt is gone.
    AlreadySigned,
}

/// Resolved state for one request.
struct WizardContext {
    current: CurrentInitiative,
    plan: StepPlan,
    attempt: SignatureAttempt,
}

/// Drives a signer through the planned steps for an initiative.
///
/// Only this type mutates signature attempts in the session or calls the
/// verification and commit services. Every entry point rebuilds the plan
/// from the initiative's current type configuration and checks the stored
/// attempt against it before doing anything else.
pub struct SignatureWizard {
    db: DbHandle,
    verification: Arc<VerificationService>,
    commits: VoteCommitService,
    store: WizardStateStore,
}

impl SignatureWizard {
    pub fn new(db: DbHandle, verification: Arc<VerificationService>) -> Self {
        Self {
            commits: VoteCommitService::new(db.clone()),
            db,
            verification,
            store: WizardStateStore,
        }
    }

    /// Where the signer currently stands.
    pub async fn index(
        &self,
        session: &mut Session,
        signer_id: &str,
        initiative_id: i64,
    ) -> Result<WizardOutcome, SigningError> {
        let ctx = self.resolve(session, signer_id, initiative_id).await?;
        Ok(WizardOutcome::Redirect(ctx.attempt.current_step))
    }

    /// Render `step` if it is the current one, otherwise point at the current one.
    pub async fn show(
        &self,
        session: &mut Session,
        signer_id: &str,
        initiative_id: i64,
        step: Step,
    ) -> Result<WizardOutcome, SigningError> {
        let ctx = self.resolve(session, signer_id, initiative_id).await?;
        if step != ctx.attempt.current_step {
            return Ok(WizardOutcome::Redirect(ctx.attempt.current_step));
        }
        let alert = session
            .take_flash(&ctx.attempt.key())
            .map(|message| Alert::new(AlertKind::Notice, message));
        Ok(WizardOutcome::Page(self.page(
            &ctx,
            ctx.attempt.current_step,
            PageStatus::Ok,
            Vec::new(),
            alert,
        )))
    }

    /// Handle a submission for the step `input` belongs to.
    pub async fn submit(
        &self,
        session: &mut Session,
        signer_id: &str,
        initiative_id: i64,
        input: StepInput,
    ) -> Result<WizardOutcome, SigningError> {
        let ctx = self.resolve(session, signer_id, initiative_id).await?;
        let current = ctx.attempt.current_step;
        let step = input.step();
        // the one permitted step back: asking for a new code from the code step
        let rerequest = step == Step::SmsPhoneNumber && current == Step::SmsCode;
        if step != current && !rerequest {
            debug!(initiative_id, %signer_id, %step, %current, "submission for non-current step");
            return Ok(WizardOutcome::Redirect(current));
        }

        match input {
            StepInput::PersonalData(fields) => self.fill_personal_data(session, ctx, fields),
            StepInput::PhoneNumber(phone) => self.sms_phone_number(session, ctx, &phone).await,
            StepInput::Code(code) => self.sms_code(session, ctx, &code),
            StepInput::Confirm => self.finish(session, ctx).await,
        }
    }

    /// One-click signing for initiatives whose plan is only the final
    /// confirmation. Anything longer goes through the wizard.
    pub async fn quick_sign(
        &self,
        session: &mut Session,
        signer_id: &str,
        initiative_id: i64,
    ) -> Result<WizardOutcome, SigningError> {
        let ctx = self.resolve(session, signer_id, initiative_id).await?;
        if !ctx.plan.is_single_step() {
            return Ok(WizardOutcome::Redirect(ctx.attempt.current_step));
        }
        self.finish(session, ctx).await
    }

    /// Drop the signer's attempt and any live SMS challenge.
    pub fn abandon(&self, session: &mut Session, signer_id: &str, initiative_id: i64) -> bool {
        if let Some(attempt) = self.store.load(session, signer_id, initiative_id) {
            self.verification.invalidate(&attempt.key());
        }
        let cleared = self.store.clear(session, signer_id, initiative_id);
        if cleared {
            info!(initiative_id, %signer_id, "signature attempt abandoned");
        }
        cleared
    }

    async fn resolve(
        &self,
        session: &mut Session,
        signer_id: &str,
        initiative_id: i64,
    ) -> Result<WizardContext, SigningError> {
        let current = self
            .db
            .call(move |db| db.current_initiative(initiative_id))
            .await
            .map_err(SigningError::Database)?
            .ok_or(SigningError::InitiativeNotFound { id: initiative_id })?;
        if !current.initiative.accepts_signatures() {
            return Err(SigningError::NotPermitted { id: initiative_id });
        }

        let plan = StepPlanner::plan(&current.initiative_type);
        let stored = self.store.load_or_start(
            session,
            signer_id,
            initiative_id,
            plan.first(),
            plan.steps(),
        )?;
        let attempt = if plan.contains(stored.current_step) && stored.plan == plan.steps() {
            stored
        } else {
            warn!(
                initiative_id,
                %signer_id,
                stored_step = %stored.current_step,
                "stale signature attempt, restarting from first step"
            );
            self.verification.invalidate(&stored.key());
            self.store
                .start(session, signer_id, initiative_id, plan.first(), plan.steps())?
        };

        Ok(WizardContext {
            current,
            plan,
            attempt,
        })
    }

    fn advance(
        &self,
        session: &mut Session,
        mut ctx: WizardContext,
        from: Step,
    ) -> Result<WizardOutcome, SigningError> {
        let next = ctx.plan.next_after(from).unwrap_or(Step::Finish);
        ctx.attempt.current_step = next;
        self.store.save(session, &ctx.attempt)?;
        debug!(
            initiative_id = ctx.attempt.initiative_id,
            signer_id = %ctx.attempt.signer_id,
            %from,
            %next,
            "signature step completed"
        );
        Ok(WizardOutcome::Redirect(next))
    }

    fn fill_personal_data(
        &self,
        session: &mut Session,
        mut ctx: WizardContext,
        fields: ExtraFields,
    ) -> Result<WizardOutcome, SigningError> {
        let fields: ExtraFields = fields
            .into_iter()
            .map(|(k, v)| (k, v.trim().to_string()))
            .collect();

        if let Err(errors) = validate_extra_fields(&ctx.current.initiative_type, &fields) {
            let mut page = self.page(
                &ctx,
                Step::FillPersonalData,
                PageStatus::Invalid,
                errors,
                Some(Alert::new(
                    AlertKind::PersonalDataInvalid,
                    "Some personal data is missing or invalid",
                )),
            );
            page.extra_fields = fields;
            return Ok(WizardOutcome::Page(page));
        }

        ctx.attempt.extra_fields = fields;
        self.advance(session, ctx, Step::FillPersonalData)
    }

    async fn sms_phone_number(
        &self,
        session: &mut Session,
        mut ctx: WizardContext,
        phone_number: &str,
    ) -> Result<WizardOutcome, SigningError> {
        let key = ctx.attempt.key();
        self.verification.invalidate(&key);
        ctx.attempt.sms_code_reference = None;
        ctx.attempt.phone_number = None;
        ctx.attempt.current_step = Step::SmsPhoneNumber;

        match self.verification.request_challenge(&key, phone_number).await {
            Ok(challenge) => {
                ctx.attempt.phone_number = Some(challenge.phone_number);
                ctx.attempt.sms_code_reference = Some(challenge.code_reference);
                self.advance(session, ctx, Step::SmsPhoneNumber)
            }
            Err(e) => {
                self.store.save(session, &ctx.attempt)?;
                let (status, errors) = if e.is_retryable() {
                    (PageStatus::Unavailable, Vec::new())
                } else {
                    (
                        PageStatus::Invalid,
                        vec![FieldError::new("phone_number", "is invalid")],
                    )
                };
                Ok(WizardOutcome::Page(self.page(
                    &ctx,
                    Step::SmsPhoneNumber,
                    status,
                    errors,
                    Some(Alert::from_verification(&e)),
                )))
            }
        }
    }

    fn sms_code(
        &self,
        session: &mut Session,
        mut ctx: WizardContext,
        code: &str,
    ) -> Result<WizardOutcome, SigningError> {
        let Some(reference) = ctx.attempt.sms_code_reference.clone() else {
            ctx.attempt.current_step = Step::SmsPhoneNumber;
            self.store.save(session, &ctx.attempt)?;
            session.set_flash(&ctx.attempt.key(), "Request a verification code first");
            return Ok(WizardOutcome::Redirect(Step::SmsPhoneNumber));
        };

        match self.verification.confirm_challenge(&reference, code) {
            Ok(()) => {
                ctx.attempt.sms_code_reference = None;
                self.advance(session, ctx, Step::SmsCode)
            }
            Err(e @ VerificationError::AttemptsExhausted { .. }) => {
                info!(
                    initiative_id = ctx.attempt.initiative_id,
                    signer_id = %ctx.attempt.signer_id,
                    "verification attempts exhausted, new code required"
                );
                ctx.attempt.sms_code_reference = None;
                ctx.attempt.current_step = Step::SmsPhoneNumber;
                self.store.save(session, &ctx.attempt)?;
                session.set_flash(&ctx.attempt.key(), e.to_string());
                Ok(WizardOutcome::Redirect(Step::SmsPhoneNumber))
            }
            Err(e) => Ok(WizardOutcome::Page(self.page(
                &ctx,
                Step::SmsCode,
                PageStatus::Invalid,
                vec![FieldError::new("code", "is invalid")],
                Some(Alert::from_verification(&e)),
            ))),
        }
    }

    async fn finish(
        &self,
        session: &mut Session,
        mut ctx: WizardContext,
    ) -> Result<WizardOutcome, SigningError> {
        let initiative_id = ctx.attempt.initiative_id;
        let signer_id = ctx.attempt.signer_id.clone();
        let extra_fields = ctx
            .plan
            .contains(Step::FillPersonalData)
            .then(|| ctx.attempt.extra_fields.clone());

        match self.commits.commit(initiative_id, &signer_id, extra_fields).await {
            Ok(signature_id) => {
                self.store.clear(session, &signer_id, initiative_id);
                let online_votes = self
                    .db
                    .call(move |db| db.get_initiative(initiative_id))
                    .await
                    .map_err(SigningError::Database)?
                    .map(|i| i.online_votes)
                    .unwrap_or_default();
                Ok(WizardOutcome::Completed {
                    signature_id,
                    online_votes,
                })
            }
            Err(CommitError::AlreadySigned { .. }) => {
                self.verification.invalidate(&ctx.attempt.key());
                self.store.clear(session, &signer_id, initiative_id);
                Ok(WizardOutcome::AlreadySigned)
            }
            Err(CommitError::ValidationFailed(reasons)) => {
                let first = ctx.plan.first();
                warn!(
                    initiative_id,
                    %signer_id,
                    rewind_to = %first,
                    "signature rejected, returning to first step"
                );
                ctx.attempt.current_step = first;
                ctx.attempt.sms_code_reference = None;
                self.store.save(session, &ctx.attempt)?;
                Ok(WizardOutcome::Page(self.page(
                    &ctx,
                    first,
                    PageStatus::Invalid,
                    reasons,
                    Some(Alert::new(
                        AlertKind::SignatureRejected,
                        "The signature could not be recorded, please review your data",
                    )),
                )))
            }
            Err(CommitError::InitiativeNotFound { id }) => {
                Err(SigningError::InitiativeNotFound { id })
            }
            Err(CommitError::Database(e)) => Err(SigningError::Database(e)),
        }
    }

    fn page(
        &self,
        ctx: &WizardContext,
        step: Step,
        status: PageStatus,
        errors: Vec<FieldError>,
        alert: Option<Alert>,
    ) -> StepPage {
        let legal_text = (step == Step::FillPersonalData)
            .then(|| ctx.current.initiative_type.extra_fields_legal_text.clone());
        let phone_number = match step {
            Step::SmsCode | Step::Finish => ctx.attempt.phone_number.as_deref().map(mask_phone),
            _ => None,
        };
        StepPage {
            initiative_id: ctx.current.initiative.id,
            initiative_title: ctx.current.initiative.title.clone(),
            step,
            plan: ctx.plan.steps().to_vec(),
            legal_text,
            extra_fields: ctx.attempt.extra_fields.clone(),
            phone_number,
            errors,
            alert,
            status,
        }
    }
}

/// Hide all but the last three digits of a phone number.
fn mask_phone(phone_number: &str) -> String {
    let visible = 3.min(phone_number.len());
    let split = phone_number.len() - visible;
    let (hidden, shown) = phone_number.split_at(split);
    let masked: String = hidden
        .chars()
        .map(|c| if c.is_ascii_digit() { '*' } else { c })
        .collect();
    format!("{}{}", masked, shown)
}
