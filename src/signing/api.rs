use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{error, warn};

use super::db::DbHandle;
use super::models::{ExtraFields, Step};
use super::planner::StepPlanner;
use super::session::Session;
use super::verification::VerificationService;
use super::wizard::{PageStatus, SignatureWizard, StepInput, WizardOutcome};
use crate::config::SigningToml;
use crate::errors::SigningError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub wizard: SignatureWizard,
    pub cookie_name: String,
    pub secure_cookie: bool,
    pub signer_header: String,
}

impl AppState {
    pub fn new(db: DbHandle, verification: Arc<VerificationService>, config: &SigningToml) -> Self {
        Self {
            wizard: SignatureWizard::new(db.clone(), verification),
            db,
            cookie_name: config.session.cookie_name.clone(),
            secure_cookie: config.session.secure_cookie,
            signer_header: config.auth.signer_header.to_ascii_lowercase(),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

/// Body of a step submission. Each step reads only its own field.
#[derive(Debug, Default, Deserialize)]
pub struct StepForm {
    #[serde(default)]
    pub extra_fields: ExtraFields,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl StepForm {
    fn into_input(self, step: Step) -> StepInput {
        match step {
            Step::FillPersonalData => StepInput::PersonalData(self.extra_fields),
            Step::SmsPhoneNumber => StepInput::PhoneNumber(self.phone_number.unwrap_or_default()),
            Step::SmsCode => StepInput::Code(self.code.unwrap_or_default()),
            Step::Finish => StepInput::Confirm,
        }
    }
}

/// Identity of the signer, taken from the header set by the upstream
/// authentication layer.
pub struct Signer(pub String);

impl FromRequestParts<SharedState> for Signer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(state.signer_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Signer(v.to_string()))
            .ok_or_else(|| SigningError::Unauthenticated.into())
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<SigningError> for ApiError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::InitiativeNotFound { .. } => ApiError::NotFound(err.to_string()),
            SigningError::NotPermitted { .. } => ApiError::Forbidden(err.to_string()),
            SigningError::Unauthenticated => ApiError::Unauthorized(err.to_string()),
            SigningError::BadRequest(msg) => ApiError::BadRequest(msg),
            SigningError::Database(e) | SigningError::Other(e) => {
                error!(error = %format!("{:#}", e), "request failed");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/initiatives/{id}", get(get_initiative))
        .route(
            "/initiatives/{id}/signatures",
            get(wizard_index).post(quick_sign).delete(abandon),
        )
        .route(
            "/initiatives/{id}/signatures/{step}",
            get(show_step).post(submit_step),
        )
}

// ── Helpers ───────────────────────────────────────────────────────────

fn parse_step(raw: &str) -> Result<Step, ApiError> {
    Step::from_str(raw).map_err(|_| ApiError::NotFound(format!("Unknown step: {}", raw)))
}

pub fn step_path(initiative_id: i64, step: Step) -> String {
    format!("/initiatives/{}/signatures/{}", initiative_id, step)
}

fn session_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Session named by the request cookie, or a fresh one when the cookie is
/// missing or points at nothing usable.
async fn load_session(state: &SharedState, headers: &HeaderMap) -> Result<Session, ApiError> {
    let Some(id) = session_cookie(headers, &state.cookie_name).map(str::to_string) else {
        return Ok(Session::new());
    };
    let lookup = id.clone();
    let stored = state
        .db
        .call(move |db| db.load_session(&lookup))
        .await
        .map_err(SigningError::Database)?;

    match stored.map(|json| Session::from_json(&id, &json)) {
        Some(Ok(session)) => Ok(session),
        Some(Err(e)) => {
            warn!(session_id = %id, error = %e, "discarding unreadable session");
            Ok(Session::new())
        }
        None => Ok(Session::new()),
    }
}

/// Write a modified session back and attach its cookie. An emptied session
/// is deleted and its cookie expired.
async fn with_session(
    state: &SharedState,
    session: Session,
    mut response: Response,
) -> Result<Response, ApiError> {
    if !session.is_dirty() {
        return Ok(response);
    }

    let id = session.id().to_string();
    let attributes = if state.secure_cookie {
        "Path=/; HttpOnly; SameSite=Lax; Secure"
    } else {
        "Path=/; HttpOnly; SameSite=Lax"
    };
    let cookie = if session.is_empty() {
        let target = id.clone();
        state
            .db
            .call(move |db| db.delete_session(&target))
            .await
            .map_err(SigningError::Database)?;
        format!("{}=; {}; Max-Age=0", state.cookie_name, attributes)
    } else {
        let data = session.to_json().map_err(SigningError::Other)?;
        let target = id.clone();
        state
            .db
            .call(move |db| db.save_session(&target, &data))
            .await
            .map_err(SigningError::Database)?;
        format!("{}={}; {}", state.cookie_name, id, attributes)
    };

    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::Internal(format!("Invalid session cookie: {}", e)))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

fn outcome_response(initiative_id: i64, outcome: WizardOutcome) -> Response {
    match outcome {
        WizardOutcome::Redirect(step) => {
            let location = step_path(initiative_id, step);
            (
                StatusCode::SEE_OTHER,
                [(header::LOCATION, location.clone())],
                Json(serde_json::json!({"redirect_to": location})),
            )
                .into_response()
        }
        WizardOutcome::Page(page) => {
            let status = match page.status {
                PageStatus::Ok => StatusCode::OK,
                PageStatus::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
                PageStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            };
            (status, Json(page)).into_response()
        }
        WizardOutcome::Completed {
            signature_id,
            online_votes,
        } => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "status": "completed",
                "signature_id": signature_id,
                "online_votes": online_votes,
            })),
        )
            .into_response(),
        WizardOutcome::AlreadySigned => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "already_signed",
                "error": "You have already signed this initiative",
            })),
        )
            .into_response(),
    }
}

async fn respond(
    state: &SharedState,
    session: Session,
    initiative_id: i64,
    outcome: WizardOutcome,
) -> Result<Response, ApiError> {
    with_session(state, session, outcome_response(initiative_id, outcome)).await
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn get_initiative(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .db
        .call(move |db| db.current_initiative(id))
        .await
        .map_err(SigningError::Database)?
        .ok_or(SigningError::InitiativeNotFound { id })?;
    let plan = StepPlanner::plan(&current.initiative_type);
    let accepts_signatures = current.initiative.accepts_signatures();
    Ok(Json(serde_json::json!({
        "initiative": current.initiative,
        "initiative_type": current.initiative_type,
        "accepts_signatures": accepts_signatures,
        "plan": plan.steps(),
    })))
}

async fn wizard_index(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Signer(signer): Signer,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut session = load_session(&state, &headers).await?;
    let outcome = state.wizard.index(&mut session, &signer, id).await?;
    respond(&state, session, id, outcome).await
}

async fn quick_sign(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Signer(signer): Signer,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut session = load_session(&state, &headers).await?;
    let outcome = state.wizard.quick_sign(&mut session, &signer, id).await?;
    respond(&state, session, id, outcome).await
}

async fn abandon(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Signer(signer): Signer,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut session = load_session(&state, &headers).await?;
    state.wizard.abandon(&mut session, &signer, id);
    with_session(&state, session, StatusCode::NO_CONTENT.into_response()).await
}

async fn show_step(
    State(state): State<SharedState>,
    Path((id, step)): Path<(i64, String)>,
    Signer(signer): Signer,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let step = parse_step(&step)?;
    let mut session = load_session(&state, &headers).await?;
    let outcome = state.wizard.show(&mut session, &signer, id, step).await?;
    respond(&state, session, id, outcome).await
}

async fn submit_step(
    State(state): State<SharedState>,
    Path((id, step)): Path<(i64, String)>,
    Signer(signer): Signer,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let step = parse_step(&step)?;
    let form: StepForm = if body.iter().all(u8::is_ascii_whitespace) {
        StepForm::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| SigningError::BadRequest(format!("Invalid step body: {}", e)))?
    };

    let mut session = load_session(&state, &headers).await?;
    let outcome = state
        .wizard
        .submit(&mut session, &signer, id, form.into_input(step))
        .await?;
    respond(&state, session, id, outcome).await
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::signing::db::SigningDb;
    use crate::signing::models::InitiativeState;
    use crate::signing::verification::VerificationSettings;
    use crate::signing::verification::testing::RecordingSmsSender;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        db: DbHandle,
        sender: Arc<RecordingSmsSender>,
        initiative_id: i64,
    }

    fn test_app(collects: bool, sms: bool) -> TestApp {
        test_app_with(collects, sms, RecordingSmsSender::default(), VerificationSettings::default())
    }

    fn test_app_with(
        collects: bool,
        sms: bool,
        sender: RecordingSmsSender,
        settings: VerificationSettings,
    ) -> TestApp {
        let db = SigningDb::new_in_memory().unwrap();
        let t = db.create_initiative_type("Type", collects, sms, "").unwrap();
        let i = db
            .create_initiative("Cleaner beaches", t.id, InitiativeState::Published)
            .unwrap();
        let db = DbHandle::new(db);
        let sender = Arc::new(sender);
        let verification = Arc::new(VerificationService::new(sender.clone(), settings).unwrap());
        let state = Arc::new(AppState::new(
            db.clone(),
            verification,
            &SigningToml::default(),
        ));
        TestApp {
            router: api_router().with_state(state),
            db,
            sender,
            initiative_id: i.id,
        }
    }

    impl TestApp {
        async fn request(
            &self,
            method: &str,
            uri: &str,
            cookie: Option<&str>,
            body: Option<serde_json::Value>,
        ) -> Response {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .header("x-signer-id", "alice");
            if let Some(cookie) = cookie {
                builder = builder.header("cookie", cookie);
            }
            let body = match body {
                Some(json) => {
                    builder = builder.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            self.router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap()
        }

        fn signatures(&self) -> String {
            format!("/initiatives/{}/signatures", self.initiative_id)
        }

        fn step(&self, step: &str) -> String {
            format!("{}/{}", self.signatures(), step)
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    /// `name=value` part of the response's session cookie.
    fn cookie(response: &Response) -> String {
        let raw = response.headers()[header::SET_COOKIE].to_str().unwrap();
        raw.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app(false, false);
        let response = app.request("GET", "/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_get_initiative_includes_plan() {
        let app = test_app(true, true);
        let uri = format!("/initiatives/{}", app.initiative_id);
        let response = app.request("GET", &uri, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["initiative"]["title"], "Cleaner beaches");
        assert_eq!(json["initiative"]["online_votes"], 0);
        assert_eq!(json["accepts_signatures"], true);
        assert_eq!(
            json["plan"],
            serde_json::json!(["fill-personal-data", "sms-phone-number", "sms-code", "finish"])
        );
    }

    #[tokio::test]
    async fn test_get_initiative_not_found() {
        let app = test_app(false, false);
        let response = app.request("GET", "/initiatives/999", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_signer_is_unauthorized() {
        let app = test_app(false, false);
        let request = Request::builder()
            .uri(app.signatures())
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_step_is_not_found() {
        let app = test_app(false, false);
        let response = app.request("GET", &app.step("payment"), None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unpublished_initiative_is_forbidden() {
        let app = test_app(false, false);
        let id = app.initiative_id;
        app.db
            .call(move |db| db.update_initiative_state(id, InitiativeState::Validating))
            .await
            .unwrap();
        let response = app.request("GET", &app.signatures(), None, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_index_redirects_and_sets_cookie() {
        let app = test_app(true, false);
        let response = app.request("GET", &app.signatures(), None, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), app.step("fill-personal-data"));
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("civic_sign_session="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(!set_cookie.contains("Secure"));
        assert_eq!(
            body_json(response).await["redirect_to"],
            app.step("fill-personal-data")
        );
    }

    #[tokio::test]
    async fn test_secure_cookie_setting_marks_cookie() {
        let db = SigningDb::new_in_memory().unwrap();
        let t = db.create_initiative_type("Type", false, true, "").unwrap();
        let i = db
            .create_initiative("Cleaner beaches", t.id, InitiativeState::Published)
            .unwrap();
        let verification = Arc::new(
            VerificationService::new(
                Arc::new(RecordingSmsSender::default()),
                VerificationSettings::default(),
            )
            .unwrap(),
        );
        let mut config = SigningToml::default();
        config.session.secure_cookie = true;
        let state = Arc::new(AppState::new(DbHandle::new(db), verification, &config));

        let response = api_router()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/initiatives/{}/signatures", i.id))
                    .header("x-signer-id", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.ends_with("; Secure"));
    }

    #[tokio::test]
    async fn test_sms_flow_over_http() {
        let app = test_app(false, true);
        let response = app.request("GET", &app.signatures(), None, None).await;
        let session = cookie(&response);
        assert_eq!(location(&response), app.step("sms-phone-number"));

        let response = app
            .request(
                "POST",
                &app.step("sms-phone-number"),
                Some(&session),
                Some(serde_json::json!({"phone_number": "+34 600 000 001"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), app.step("sms-code"));

        let response = app
            .request("GET", &app.step("sms-code"), Some(&session), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_json(response).await;
        assert_eq!(page["step"], "sms-code");
        assert_eq!(page["phone_number"], "+********001");
        assert!(page.get("code").is_none());

        let code = app.sender.last_code().unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };
        let response = app
            .request(
                "POST",
                &app.step("sms-code"),
                Some(&session),
                Some(serde_json::json!({"code": wrong})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let page = body_json(response).await;
        assert_eq!(page["step"], "sms-code");
        assert_eq!(page["alert"]["kind"], "code_mismatch");

        let response = app
            .request(
                "POST",
                &app.step("sms-code"),
                Some(&session),
                Some(serde_json::json!({"code": code})),
            )
            .await;
        assert_eq!(location(&response), app.step("finish"));

        let response = app
            .request("POST", &app.step("finish"), Some(&session), None)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["status"], "completed");
        assert_eq!(json["online_votes"], 1);

        let response = app
            .request("POST", &app.step("finish"), Some(&session), None)
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["status"], "already_signed");
    }

    #[tokio::test]
    async fn test_progress_lives_in_the_session() {
        let app = test_app(false, true);
        let response = app
            .request(
                "POST",
                &app.step("sms-phone-number"),
                None,
                Some(serde_json::json!({"phone_number": "+34600000001"})),
            )
            .await;
        let session = cookie(&response);
        assert_eq!(location(&response), app.step("sms-code"));

        let response = app
            .request("GET", &app.signatures(), Some(&session), None)
            .await;
        assert_eq!(location(&response), app.step("sms-code"));

        // without the cookie the signer starts over
        let response = app.request("GET", &app.signatures(), None, None).await;
        assert_eq!(location(&response), app.step("sms-phone-number"));
    }

    #[tokio::test]
    async fn test_quick_sign_single_step() {
        let app = test_app(false, false);
        let response = app.request("POST", &app.signatures(), None, None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["online_votes"], 1);

        let response = app.request("POST", &app.signatures(), None, None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_quick_sign_redirects_into_wizard() {
        let app = test_app(true, false);
        let response = app.request("POST", &app.signatures(), None, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), app.step("fill-personal-data"));
    }

    #[tokio::test]
    async fn test_invalid_personal_data_is_unprocessable() {
        let app = test_app(true, false);
        let response = app
            .request(
                "POST",
                &app.step("fill-personal-data"),
                None,
                Some(serde_json::json!({"extra_fields": {"name_and_surname": "Ada"}})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let page = body_json(response).await;
        assert_eq!(page["step"], "fill-personal-data");
        assert_eq!(page["errors"].as_array().unwrap().len(), 3);
        assert_eq!(page["extra_fields"]["name_and_surname"], "Ada");
    }

    #[tokio::test]
    async fn test_gateway_timeout_is_service_unavailable() {
        let app = test_app_with(
            false,
            true,
            RecordingSmsSender::slow(Duration::from_millis(300)),
            VerificationSettings {
                dispatch_timeout: Duration::from_millis(10),
                ..VerificationSettings::default()
            },
        );
        let response = app
            .request(
                "POST",
                &app.step("sms-phone-number"),
                None,
                Some(serde_json::json!({"phone_number": "+34600000001"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let page = body_json(response).await;
        assert_eq!(page["alert"]["retryable"], true);
        assert_eq!(page["alert"]["kind"], "sms_unavailable");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = test_app(false, true);
        let request = Request::builder()
            .method("POST")
            .uri(app.step("sms-phone-number"))
            .header("x-signer-id", "alice")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_abandon_clears_session() {
        let app = test_app(false, true);
        let response = app.request("GET", &app.signatures(), None, None).await;
        let session = cookie(&response);

        let response = app
            .request("DELETE", &app.signatures(), Some(&session), None)
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));

        let id = session.split_once('=').unwrap().1.to_string();
        let stored = app.db.call(move |db| db.load_session(&id)).await.unwrap();
        assert!(stored.is_none());
    }

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; civic_sign_session=abc-123"),
        );
        assert_eq!(session_cookie(&headers, "civic_sign_session"), Some("abc-123"));
        assert_eq!(session_cookie(&headers, "missing"), None);
    }
}
