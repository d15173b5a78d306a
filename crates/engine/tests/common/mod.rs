//! Shared mock service and run helpers for engine integration tests.
//!
//! The mock is a small axum service speaking enough of the managed-service
//! REST dialect to exercise every check group. Defaults describe a fully
//! conformant service; tests flip one knob at a time to provoke findings.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use conformance_engine::{Engine, Sut};
use conformance_ledger::{BufferTextSink, CsvTabularSink, RunReport, VerdictLedger};
use conformance_types::SutConfig;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// admin:secret
const GOOD_BASIC: &str = "Basic YWRtaW46c2VjcmV0";

/// Tunable mock service. The default configuration is fully conformant.
pub struct MockSut {
    pub version_body: Value,
    pub accounts_allow_post: bool,
    pub include_systems_count: bool,
    /// When set, account creation stores this RoleId instead of the one the
    /// request carried, breaking the creation round-trip on purpose.
    pub forced_role_id: Option<String>,
    /// When set, session creation stalls this long before answering. Longer
    /// than the client timeout, this simulates an unreachable endpoint.
    pub session_post_delay: Option<Duration>,
    /// When true, the Systems collection answers its first GET (discovery)
    /// and stalls past the client timeout on every later one.
    pub systems_stall_after_first: bool,
}

impl Default for MockSut {
    fn default() -> Self {
        Self {
            version_body: json!({"v1": "/redfish/v1/"}),
            accounts_allow_post: true,
            include_systems_count: true,
            forced_role_id: None,
            session_post_delay: None,
            systems_stall_after_first: false,
        }
    }
}

#[derive(Clone)]
struct Account {
    user_name: String,
    role_id: String,
    locked: bool,
    version: u64,
}

struct Inner {
    accounts: BTreeMap<u64, Account>,
    next_account: u64,
    sessions: BTreeMap<u64, String>,
    next_session: u64,
    systems_hits: u64,
}

#[derive(Clone)]
struct ServerState {
    options: Arc<MockSut>,
    inner: Arc<Mutex<Inner>>,
}

impl MockSut {
    /// Binds the mock on an ephemeral port and returns its base URL.
    pub async fn spawn(self) -> String {
        let mut accounts = BTreeMap::new();
        accounts.insert(
            1,
            Account {
                user_name: "admin".to_string(),
                role_id: "Administrator".to_string(),
                locked: false,
                version: 1,
            },
        );
        let state = ServerState {
            options: Arc::new(self),
            inner: Arc::new(Mutex::new(Inner {
                accounts,
                next_account: 2,
                sessions: BTreeMap::new(),
                next_session: 1,
                systems_hits: 0,
            })),
        };

        let app = Router::new()
            .route("/redfish", get(version_document))
            .route("/redfish/v1/", get(service_root))
            .route("/redfish/v1/odata", get(odata_document))
            .route("/redfish/v1/$metadata", get(metadata_document))
            .route("/redfish/v1/AccountService", get(account_service))
            .route(
                "/redfish/v1/AccountService/Accounts",
                get(accounts_collection).post(create_account),
            )
            .route(
                "/redfish/v1/AccountService/Accounts/:id",
                get(get_account).patch(patch_account).delete(delete_account),
            )
            .route("/redfish/v1/SessionService", get(session_service))
            .route(
                "/redfish/v1/SessionService/Sessions",
                get(sessions_collection).post(create_session),
            )
            .route(
                "/redfish/v1/SessionService/Sessions/:id",
                get(get_session).delete(delete_session),
            )
            .route("/redfish/v1/Systems", get(systems_collection))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }
}

fn basic_ok(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(GOOD_BASIC)
}

fn token_ok(state: &ServerState, headers: &HeaderMap) -> bool {
    let Some(token) = headers.get("x-auth-token").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    state
        .inner
        .lock()
        .unwrap()
        .sessions
        .values()
        .any(|t| t == token)
}

async fn version_document(State(state): State<ServerState>) -> Response {
    Json(state.options.version_body.clone()).into_response()
}

async fn service_root(headers: HeaderMap) -> Response {
    if headers
        .get("odata-version")
        .and_then(|v| v.to_str().ok())
        == Some("3.0")
    {
        return StatusCode::PRECONDITION_FAILED.into_response();
    }
    if headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|a| a.contains("xml"))
        .unwrap_or(false)
    {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    let payload = json!({
        "@odata.id": "/redfish/v1/",
        "@odata.type": "#ServiceRoot.v1_5_0.ServiceRoot",
        "Id": "RootService",
        "Name": "Root Service",
        "AccountService": {"@odata.id": "/redfish/v1/AccountService"},
        "SessionService": {"@odata.id": "/redfish/v1/SessionService"},
        "Systems": {"@odata.id": "/redfish/v1/Systems"},
        "Links": {
            "Sessions": {"@odata.id": "/redfish/v1/SessionService/Sessions"}
        }
    });
    (
        StatusCode::OK,
        [(header::ALLOW, "GET, HEAD".to_string())],
        Json(payload),
    )
        .into_response()
}

async fn odata_document() -> Response {
    Json(json!({
        "@odata.context": "/redfish/v1/$metadata",
        "value": [
            {"name": "Service", "kind": "Singleton", "url": "/redfish/v1/"},
            {"name": "Systems", "kind": "Singleton", "url": "/redfish/v1/Systems"}
        ]
    }))
    .into_response()
}

async fn metadata_document() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml".to_string())],
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<edmx:Edmx xmlns:edmx=\"http://docs.oasis-open.org/odata/ns/edmx\" ",
            "Version=\"4.0\"></edmx:Edmx>"
        ),
    )
        .into_response()
}

async fn account_service() -> Response {
    let payload = json!({
        "@odata.id": "/redfish/v1/AccountService",
        "@odata.type": "#AccountService.v1_0_0.AccountService",
        "Id": "AccountService",
        "Name": "Account Service",
        "Accounts": {"@odata.id": "/redfish/v1/AccountService/Accounts"}
    });
    (
        StatusCode::OK,
        [(header::ALLOW, "GET".to_string())],
        Json(payload),
    )
        .into_response()
}

async fn session_service() -> Response {
    let payload = json!({
        "@odata.id": "/redfish/v1/SessionService",
        "@odata.type": "#SessionService.v1_0_0.SessionService",
        "Id": "SessionService",
        "Name": "Session Service",
        "Sessions": {"@odata.id": "/redfish/v1/SessionService/Sessions"}
    });
    (
        StatusCode::OK,
        [(header::ALLOW, "GET".to_string())],
        Json(payload),
    )
        .into_response()
}

fn account_payload(id: u64, account: &Account) -> Value {
    json!({
        "@odata.id": format!("/redfish/v1/AccountService/Accounts/{id}"),
        "@odata.type": "#ManagerAccount.v1_0_0.ManagerAccount",
        "Id": id.to_string(),
        "Name": "User Account",
        "UserName": account.user_name,
        "RoleId": account.role_id,
        "Locked": account.locked,
    })
}

async fn accounts_collection(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    if !basic_ok(&headers) && !token_ok(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let inner = state.inner.lock().unwrap();
    let members: Vec<Value> = inner
        .accounts
        .keys()
        .map(|id| json!({"@odata.id": format!("/redfish/v1/AccountService/Accounts/{id}")}))
        .collect();
    let allow = if state.options.accounts_allow_post {
        "GET, POST"
    } else {
        "GET"
    };
    let payload = json!({
        "@odata.id": "/redfish/v1/AccountService/Accounts",
        "@odata.type": "#ManagerAccountCollection.ManagerAccountCollection",
        "Name": "Accounts Collection",
        "Members": members,
        "Members@odata.count": members.len(),
    });
    (
        StatusCode::OK,
        [(header::ALLOW, allow.to_string())],
        Json(payload),
    )
        .into_response()
}

async fn create_account(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.options.accounts_allow_post {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET".to_string())],
        )
            .into_response();
    }
    if !basic_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(user_name) = body.get("UserName").and_then(Value::as_str) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let requested_role = body
        .get("RoleId")
        .and_then(Value::as_str)
        .unwrap_or("ReadOnly")
        .to_string();
    let role_id = state
        .options
        .forced_role_id
        .clone()
        .unwrap_or(requested_role);

    let mut inner = state.inner.lock().unwrap();
    let id = inner.next_account;
    inner.next_account += 1;
    let account = Account {
        user_name: user_name.to_string(),
        role_id,
        locked: false,
        version: 1,
    };
    inner.accounts.insert(id, account.clone());
    (
        StatusCode::CREATED,
        [(
            header::LOCATION,
            format!("/redfish/v1/AccountService/Accounts/{id}"),
        )],
        Json(account_payload(id, &account)),
    )
        .into_response()
}

async fn get_account(
    State(state): State<ServerState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    if !basic_ok(&headers) && !token_ok(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let inner = state.inner.lock().unwrap();
    let Some(account) = inner.accounts.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let etag = format!("\"{}-{}\"", id, account.version);
    if headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        == Some(etag.as_str())
    {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }
    (
        StatusCode::OK,
        [
            (header::ALLOW, "GET, PATCH, DELETE".to_string()),
            (header::ETAG, etag),
        ],
        Json(account_payload(id, account)),
    )
        .into_response()
}

async fn patch_account(
    State(state): State<ServerState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !basic_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(patch) = body.as_object() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    // Writes to read-only properties are rejected outright.
    let writable = ["UserName", "Password", "RoleId", "Locked", "Enabled"];
    if patch.keys().any(|k| !writable.contains(&k.as_str())) {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let mut inner = state.inner.lock().unwrap();
    let Some(account) = inner.accounts.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(user_name) = patch.get("UserName").and_then(Value::as_str) {
        account.user_name = user_name.to_string();
    }
    if let Some(role_id) = patch.get("RoleId").and_then(Value::as_str) {
        account.role_id = role_id.to_string();
    }
    if let Some(locked) = patch.get("Locked").and_then(Value::as_bool) {
        account.locked = locked;
    }
    account.version += 1;
    Json(account_payload(id, account)).into_response()
}

async fn delete_account(
    State(state): State<ServerState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    if !basic_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut inner = state.inner.lock().unwrap();
    match inner.accounts.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn session_payload(id: u64) -> Value {
    json!({
        "@odata.id": format!("/redfish/v1/SessionService/Sessions/{id}"),
        "@odata.type": "#Session.v1_0_0.Session",
        "Id": id.to_string(),
        "Name": "User Session",
        "UserName": "admin",
    })
}

async fn sessions_collection(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    if !basic_ok(&headers) && !token_ok(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let inner = state.inner.lock().unwrap();
    let members: Vec<Value> = inner
        .sessions
        .keys()
        .map(|id| json!({"@odata.id": format!("/redfish/v1/SessionService/Sessions/{id}")}))
        .collect();
    let payload = json!({
        "@odata.id": "/redfish/v1/SessionService/Sessions",
        "@odata.type": "#SessionCollection.SessionCollection",
        "Name": "Session Collection",
        "Members": members,
        "Members@odata.count": members.len(),
    });
    (
        StatusCode::OK,
        [(header::ALLOW, "GET, POST".to_string())],
        Json(payload),
    )
        .into_response()
}

async fn create_session(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    if let Some(delay) = state.options.session_post_delay {
        tokio::time::sleep(delay).await;
    }
    let user = body.get("UserName").and_then(Value::as_str);
    let password = body.get("Password").and_then(Value::as_str);
    if user != Some("admin") || password != Some("secret") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut inner = state.inner.lock().unwrap();
    let id = inner.next_session;
    inner.next_session += 1;
    let token = format!("token-{id}");
    inner.sessions.insert(id, token.clone());
    (
        StatusCode::CREATED,
        [
            (
                header::LOCATION,
                format!("/redfish/v1/SessionService/Sessions/{id}"),
            ),
            (
                header::HeaderName::from_static("x-auth-token"),
                token,
            ),
        ],
        Json(session_payload(id)),
    )
        .into_response()
}

async fn get_session(
    State(state): State<ServerState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    if !basic_ok(&headers) && !token_ok(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let inner = state.inner.lock().unwrap();
    if !inner.sessions.contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        StatusCode::OK,
        [(header::ALLOW, "GET, DELETE".to_string())],
        Json(session_payload(id)),
    )
        .into_response()
}

async fn delete_session(
    State(state): State<ServerState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    if !basic_ok(&headers) && !token_ok(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut inner = state.inner.lock().unwrap();
    match inner.sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn systems_collection(State(state): State<ServerState>) -> Response {
    if state.options.systems_stall_after_first {
        let hits = {
            let mut inner = state.inner.lock().unwrap();
            inner.systems_hits += 1;
            inner.systems_hits
        };
        if hits > 1 {
            tokio::time::sleep(Duration::from_millis(1500)).await;
        }
    }
    let mut payload = json!({
        "@odata.id": "/redfish/v1/Systems",
        "@odata.type": "#ComputerSystemCollection.ComputerSystemCollection",
        "Name": "Computer System Collection",
        "Members": [{"@odata.id": "/redfish/v1/Systems/437XR1138R2"}],
        "Members@odata.count": 1,
    });
    if !state.options.include_systems_count {
        payload
            .as_object_mut()
            .unwrap()
            .remove("Members@odata.count");
    }
    (
        StatusCode::OK,
        [(header::ALLOW, "GET".to_string())],
        Json(payload),
    )
        .into_response()
}

/// Writes a schema bundle matching the mock's resource types. The returned
/// guard owns the corpus directory for the test's lifetime.
pub fn write_schema_corpus() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let bundle = json!({
        "namespaces": [
            {
                "name": "ServiceRoot.v1_5_0",
                "types": [{
                    "name": "ServiceRoot",
                    "properties": [
                        {"name": "Id"}, {"name": "Name"},
                        {"name": "AccountService"}, {"name": "SessionService"},
                        {"name": "Systems"}, {"name": "Links"}
                    ]
                }]
            },
            {
                "name": "AccountService.v1_0_0",
                "types": [{
                    "name": "AccountService",
                    "properties": [
                        {"name": "Id"}, {"name": "Name"}, {"name": "Accounts"}
                    ]
                }]
            },
            {
                "name": "SessionService.v1_0_0",
                "types": [{
                    "name": "SessionService",
                    "properties": [
                        {"name": "Id"}, {"name": "Name"}, {"name": "Sessions"}
                    ]
                }]
            },
            {
                "name": "ManagerAccount.v1_0_0",
                "types": [{
                    "name": "ManagerAccount",
                    "properties": [
                        {
                            "name": "Id",
                            "annotations": {"OData.Permissions": "OData.Permission/Read"}
                        },
                        {"name": "Name"}, {"name": "UserName"},
                        {"name": "RoleId"}, {"name": "Locked"}
                    ]
                }]
            },
            {
                "name": "ManagerAccountCollection",
                "types": [{
                    "name": "ManagerAccountCollection",
                    "properties": [{"name": "Name"}, {"name": "Members"}]
                }]
            },
            {
                "name": "SessionCollection",
                "types": [{
                    "name": "SessionCollection",
                    "properties": [{"name": "Name"}, {"name": "Members"}]
                }]
            },
            {
                "name": "ComputerSystemCollection",
                "types": [{
                    "name": "ComputerSystemCollection",
                    "properties": [{"name": "Name"}, {"name": "Members"}]
                }]
            }
        ]
    });
    std::fs::write(
        dir.path().join("bundle.json"),
        serde_json::to_string_pretty(&bundle).unwrap(),
    )
    .unwrap();
    dir
}

/// Spawns the mock, runs the full engine against it, and returns the report.
pub async fn run_against(
    mock: MockSut,
    allow_destructive_probes: bool,
    schema_dir: Option<PathBuf>,
) -> RunReport {
    let base_url = mock.spawn().await;
    let config = SutConfig {
        display_name: "mock-sut".to_string(),
        base_url,
        username: "admin".to_string(),
        password: "secret".to_string(),
        allow_destructive_probes,
        schema_dir,
        timeout_seconds: 1,
    };
    let sut = Sut::connect(config).await.unwrap();
    let report_dir = tempfile::tempdir().unwrap();
    let mut ledger = VerdictLedger::open(
        "mock-sut",
        Box::new(BufferTextSink::default()),
        Box::new(CsvTabularSink::new(report_dir.path().join("report.csv"))),
    );
    Engine::run(&sut, &mut ledger).await;
    ledger.close_run()
}
