//! A small accounts API built on common-api.
//!
//! Every route answers with the common envelope. The global pipeline parses
//! JSON bodies, resolves the session key and loads the current user; each
//! group of routes adds its own guard on top.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use common_api::prelude::*;
use common_api::{
    EnvelopeError, FieldSerializer, FormField, IdentitySource, PhoneNumberValidator,
    RequestStage, StageOutcome, StaticIdentity, UsernameValidator,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Value, json};

/// Accounts listed per page by `GET /users`.
pub const PER_PAGE: u64 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub phone: String,
    pub superuser: bool,
}

impl Account {
    pub fn new(username: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            phone: phone.into(),
            superuser: false,
        }
    }

    pub fn superuser(mut self) -> Self {
        self.superuser = true;
        self
    }
}

/// In-memory accounts and sessions.
#[derive(Debug, Default)]
pub struct AppState {
    accounts: Mutex<Vec<Account>>,
    sessions: Mutex<HashMap<String, String>>,
    next_session: AtomicU64,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: Mutex::new(accounts.into_iter().collect()),
            ..Default::default()
        }
    }

    fn accounts(&self) -> MutexGuard<'_, Vec<Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn account(&self, username: &str) -> Option<Account> {
        self.accounts()
            .iter()
            .find(|a| a.username == username)
            .cloned()
    }

    fn open_session(&self, username: &str) -> String {
        let key = format!(
            "session-{}",
            self.next_session.fetch_add(1, Ordering::Relaxed) + 1
        );
        self.sessions().insert(key.clone(), username.to_string());
        key
    }

    fn session_account(&self, key: &str) -> Option<Account> {
        let username = self.sessions().get(key).cloned()?;
        self.account(&username)
    }
}

/// Loads [`CurrentUser`] from the resolved session key.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    state: Arc<AppState>,
}

impl SessionAuth {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl RequestStage for SessionAuth {
    fn name(&self) -> &str {
        "session_auth"
    }

    fn apply<'a>(&'a self, mut req: Request<Body>) -> BoxFuture<'a, StageOutcome> {
        let account = req
            .extensions()
            .get::<SessionKey>()
            .and_then(|key| key.0.as_deref())
            .and_then(|key| self.state.session_account(key));

        let user = match account {
            Some(account) => {
                tracing::debug!(username = %account.username, "session user loaded");
                CurrentUser::new(StaticIdentity {
                    authenticated: true,
                    superuser: account.superuser,
                })
            }
            None => CurrentUser::anonymous(),
        };
        req.extensions_mut().insert(user);
        futures::future::ready(ControlFlow::Continue(req)).boxed()
    }
}

/// Unexpected failures, answered with a generic error envelope.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        let mut envelope = Envelope::new();
        envelope.add_error_message("Server Error", "Something went wrong, please try again.");
        envelope
            .respond_with(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn signup_form() -> JsonForm {
    JsonForm::new()
        .field(
            FormField::new("username")
                .required(true)
                .validator(UsernameValidator),
        )
        .field(
            FormField::new("phone")
                .required(true)
                .validator(PhoneNumberValidator),
        )
}

fn account_serializer() -> FieldSerializer<Account> {
    FieldSerializer::new()
        .field("username", |a: &Account| a.username.clone().into())
        .field("phone", |a: &Account| a.phone.clone().into())
        .field("is_superuser", |a: &Account| a.superuser.into())
}

/// Envelope reporting the caller's login state.
fn identity_envelope(user: &CurrentUser) -> Result<Envelope, EnvelopeError> {
    Envelope::builder()
        .identity_source(user.source())
        .append_identity(true)
        .build()
}

async fn signup(State(state): State<Arc<AppState>>, JsonData(data): JsonData) -> EnvelopeResponse {
    let mut envelope = Envelope::new();
    let Some(fields) = data.as_object() else {
        envelope.add_error_message("Invalid Request", "Expected a JSON object.");
        return envelope.respond();
    };

    let mut form = signup_form();
    if !form.validate(fields) {
        envelope
            .add_error_message("Signup Failed", "Please correct the highlighted fields.")
            .attach_form_errors(&form);
        return envelope.respond();
    }

    let cleaned = form.cleaned_data();
    let username = cleaned
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let phone = cleaned
        .get("phone")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut accounts = state.accounts();
    if accounts.iter().any(|a| a.username == username) {
        envelope.add_error_message("Signup Failed", format!("`{username}` is already taken."));
        return envelope.respond();
    }
    accounts.push(Account::new(username, phone));
    tracing::info!(username, "account created");

    envelope.add_success_message("Welcome", format!("Account `{username}` created."));
    envelope.respond()
}

async fn login(
    State(state): State<Arc<AppState>>,
    JsonData(data): JsonData,
    form: FormFields,
) -> Result<EnvelopeResponse, AppError> {
    let username = data
        .get("username")
        .and_then(Value::as_str)
        .or_else(|| form.get("username"))
        .unwrap_or_default();

    let mut envelope = Envelope::new();
    if state.account(username).is_none() {
        envelope.add_error_message("Login Failed", "Unknown username.");
        return Ok(envelope.respond());
    }

    let key = state.open_session(username);
    envelope.set_field("sessionid", key.as_str())?;
    envelope.add_success_message("Logged In", format!("Welcome back, {username}."));
    Ok(envelope
        .respond()
        .header("set-cookie", format!("sessionid={key}; HttpOnly; Path=/")))
}

async fn logout(State(state): State<Arc<AppState>>, session: SessionKey) -> EnvelopeResponse {
    if let Some(key) = session.0 {
        state.sessions().remove(&key);
    }
    let mut envelope = Envelope::new();
    envelope.add_info_message("Logged Out", "See you soon.");
    envelope
        .respond()
        .header("set-cookie", "sessionid=; Max-Age=0; Path=/")
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<String>,
}

impl ListQuery {
    /// Requested page; missing or unparsable values mean the first page.
    fn page(&self) -> u64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }
}

async fn users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
    user: CurrentUser,
) -> Result<EnvelopeResponse, AppError> {
    let accounts = state.accounts().clone();
    let total = accounts.len() as u64;
    let page = Page::for_results(query.page(), total, PER_PAGE);

    let start = ((page.number() - 1) * PER_PAGE) as usize;
    let listed = accounts.iter().skip(start).take(PER_PAGE as usize);

    let mut envelope = identity_envelope(&user)?;
    envelope.attach_page(&total, &page);
    let users = account_serializer().serialize_all(listed);
    envelope.set_field("users", users)?;
    Ok(envelope.respond())
}

async fn admin_stats(State(state): State<Arc<AppState>>) -> Result<EnvelopeResponse, AppError> {
    let accounts = state.accounts();
    let mut envelope = Envelope::new();
    envelope.set_field("accounts", accounts.len())?;
    let superusers = accounts.iter().filter(|a| a.superuser).count();
    envelope.set_field("superusers", superusers)?;
    envelope.set_field("sessions", state.sessions().len())?;
    Ok(envelope.respond())
}

async fn ping() -> EnvelopeResponse {
    let mut envelope = Envelope::new();
    envelope.add_info_message("Pong", "The service is up.");
    envelope.respond()
}

fn guarded(name: &str, guard: impl Guard) -> PipelineLayer {
    PipelineLayer::new(Pipeline::new().stage(GuardStage::new(name, guard)))
}

/// The accounts API.
pub fn app(state: Arc<AppState>) -> Router {
    let anonymous = Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route_layer(guarded("logout_required", LogoutRequired::default()));

    let members = Router::new()
        .route("/logout", post(logout))
        .route("/users", get(users))
        .route_layer(guarded("login_required", LoginRequired::default()));

    let staff = Router::new().route("/admin/stats", get(admin_stats)).route_layer(guarded(
        "staff_only",
        GuardChain::new().guard(AjaxOnly::default()).guard(UserPassesTest::new(
            |user: &dyn IdentitySource| user.is_superuser(),
            json!({"detail": "Superuser access required."}),
        )),
    ));

    let open = Router::new()
        .route("/ping", any(ping))
        .route_layer(guarded("allowed_methods", AllowedMethods::default()));

    let pipeline = Pipeline::new()
        .stage(JsonBodyNormalizer::new())
        .stage(SessionKeyStage::new())
        .stage(SessionAuth::new(state.clone()));

    Router::new()
        .merge(anonymous)
        .merge(members)
        .merge(staff)
        .merge(open)
        .layer(PipelineLayer::new(pipeline))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
    use tower::ServiceExt;

    fn seeded() -> Arc<AppState> {
        Arc::new(AppState::with_accounts([
            Account::new("admin.root", "555-123-4567").superuser(),
            Account::new("alice_01", "(555) 222-3333"),
            Account::new("bob.smith", "+1 555 444 5555"),
        ]))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let cookie = resp
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, cookie, serde_json::from_slice(&bytes).unwrap())
    }

    async fn login_as(app: &Router, username: &str) -> String {
        let req = post_json("/login", json!({"username": username}));
        let (_, _, body) = call(app, req).await;
        body["sessionid"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_signup_reports_field_errors() {
        let app = app(seeded());
        let (status, _, body) = call(
            &app,
            post_json("/signup", json!({"username": "_bad", "phone": ""})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_errors"], json!(true));
        assert_eq!(
            body["messages"]["error"][0]["title"],
            json!("Signup Failed")
        );
        assert_eq!(
            body["field_errors"]["username"][0]["code"],
            json!("invalid")
        );
        assert_eq!(body["field_errors"]["phone"][0]["code"], json!("required"));
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let app = app(Arc::new(AppState::new()));
        let req = post_json(
            "/signup",
            json!({"username": "carol.k", "phone": "555.666.7777"}),
        );
        let (_, _, body) = call(&app, req).await;
        assert_eq!(body["has_errors"], json!(false));
        assert_eq!(body["messages"]["success"][0]["title"], json!("Welcome"));

        let req = post_json("/login", json!({"username": "carol.k"}));
        let (_, cookie, body) = call(&app, req).await;
        assert_eq!(body["messages"]["success"][0]["title"], json!("Logged In"));
        assert!(cookie.unwrap().starts_with("sessionid=session-1"));
    }

    #[tokio::test]
    async fn test_login_accepts_urlencoded_form() {
        let app = app(seeded());
        let req = Request::builder()
            .method("POST")
            .uri("/login")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=alice_01"))
            .unwrap();
        let (_, cookie, _) = call(&app, req).await;
        assert!(cookie.is_some());
    }

    #[tokio::test]
    async fn test_users_requires_login() {
        let app = app(seeded());
        let (status, _, body) = call(&app, get_request("/users")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["messages"]["warning"],
            json!([{
                "title": "Not Logged In",
                "message": "Please Make sure you are logged in.",
                "type": "warning"
            }])
        );
    }

    #[tokio::test]
    async fn test_users_paginates_with_identity() {
        let app = app(seeded());
        let key = login_as(&app, "alice_01").await;

        let req = Request::builder()
            .uri("/users?page=2")
            .header(COOKIE, format!("sessionid={key}"))
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = call(&app, req).await;

        assert_eq!(body["is_logged_in"], json!(true));
        assert_eq!(body["is_superuser"], json!(false));
        assert_eq!(body["has_pagination_data"], json!(true));
        assert_eq!(
            body["pagination"],
            json!({
                "total_results": 3,
                "has_next_page": false,
                "has_previous_page": true,
                "previous_page_number": 1
            })
        );
        assert_eq!(
            body["users"],
            json!([{"username": "bob.smith", "phone": "+1 555 444 5555", "is_superuser": false}])
        );
    }

    #[tokio::test]
    async fn test_users_with_bad_page_falls_back_to_first() {
        let app = app(seeded());
        let key = login_as(&app, "alice_01").await;

        let req = Request::builder()
            .uri("/users?page=abc")
            .header(COOKIE, format!("sessionid={key}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = call(&app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_errors"], json!(false));
        assert_eq!(body["pagination"]["has_previous_page"], json!(false));
        assert_eq!(body["pagination"]["next_page_number"], json!(2));
        assert_eq!(body["users"][0]["username"], json!("admin.root"));
    }

    #[tokio::test]
    async fn test_logged_in_user_cannot_sign_up() {
        let app = app(seeded());
        let key = login_as(&app, "alice_01").await;

        let mut req = post_json(
            "/signup",
            json!({"username": "dave_x", "phone": "555-000-1111"}),
        );
        req.headers_mut()
            .insert(COOKIE, format!("sessionid={key}").parse().unwrap());
        let (_, _, body) = call(&app, req).await;
        assert_eq!(
            body["messages"]["warning"][0]["title"],
            json!("Already Logged In")
        );
    }

    #[tokio::test]
    async fn test_logout_with_session_key_in_body() {
        let app = app(seeded());
        let key = login_as(&app, "bob.smith").await;

        let logout = || post_json("/logout", json!({"sessionid": key}));
        let (_, _, body) = call(&app, logout()).await;
        assert_eq!(body["messages"]["info"][0]["title"], json!("Logged Out"));

        let (_, _, body) = call(&app, logout()).await;
        assert_eq!(
            body["messages"]["warning"][0]["title"],
            json!("Not Logged In")
        );
    }

    #[tokio::test]
    async fn test_admin_stats_guards() {
        let app = app(seeded());

        let (_, _, body) = call(&app, get_request("/admin/stats")).await;
        assert_eq!(
            body["messages"]["warning"][0]["title"],
            json!("Not Allowed")
        );

        let key = login_as(&app, "alice_01").await;
        let req = Request::builder()
            .uri("/admin/stats")
            .header("x-requested-with", "XMLHttpRequest")
            .header(COOKIE, format!("sessionid={key}"))
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = call(&app, req).await;
        assert_eq!(body, json!({"detail": "Superuser access required."}));

        let key = login_as(&app, "admin.root").await;
        let req = Request::builder()
            .uri("/admin/stats")
            .header("x-requested-with", "XMLHttpRequest")
            .header(COOKIE, format!("sessionid={key}"))
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = call(&app, req).await;
        assert_eq!(body["accounts"], json!(3));
        assert_eq!(body["superusers"], json!(1));
    }

    #[tokio::test]
    async fn test_ping_allowed_methods() {
        let app = app(seeded());

        let req = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let (_, _, body) = call(&app, req).await;
        assert_eq!(body["messages"]["info"][0]["title"], json!("Pong"));

        let req = Request::builder()
            .method("DELETE")
            .uri("/ping")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["messages"]["warning"][0]["message"],
            json!("Available Methods are \"GET, POST\" only")
        );
    }
}
