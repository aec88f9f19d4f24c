use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::{ArgAction, Parser};
use disqualified_officers_api::{
    ApiError, DisqualifiedOfficersApi, UpsertOutcome, API_CONTRACT_VERSION,
};
use disqualified_officers_core::{
    InternalCorporateDisqualification, InternalNaturalDisqualification, OfficerType,
};
use disqualified_officers_notify::{HttpChangeNotifier, StreamHookGate};
use disqualified_officers_store_sqlite::SqliteDisqualificationStore;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

const REQUEST_ID_HEADER: &str = "x-request-id";
const DELTA_AT_HEADER: &str = "x-delta-at";
const ERIC_IDENTITY_HEADER: &str = "eric-identity";
const ERIC_IDENTITY_TYPE_HEADER: &str = "eric-identity-type";
const ERIC_PRIVILEGES_HEADER: &str = "eric-authorised-key-privileges";
const INTERNAL_APP_PRIVILEGE: &str = "internal-app";

#[derive(Clone)]
struct ServiceState {
    api: DisqualifiedOfficersApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Parser)]
#[command(name = "disqualified-officers-service")]
#[command(about = "HTTP service for disqualified officer records")]
struct Args {
    #[arg(long, env = "DISQUALIFIED_OFFICERS_DB", default_value = "./disqualified_officers.sqlite3")]
    db: PathBuf,
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1:8081")]
    bind: SocketAddr,
    #[arg(long, env = "CHS_KAFKA_API_URL", default_value = "http://localhost:8888")]
    chs_kafka_api_url: String,
    #[arg(long, env = "CHS_KAFKA_API_ENABLED", default_value_t = false, action = ArgAction::Set)]
    stream_hook_enabled: bool,
    #[arg(long, default_value_t = 5_000)]
    notify_timeout_ms: u64,
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Internal,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<ApiError> for ServiceError {
    fn from(value: ApiError) -> Self {
        let status = match &value {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                return ServiceState::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error",
                );
            }
        };
        ServiceState::error(status, value.to_string())
    }
}

impl ServiceState {
    fn error(status: StatusCode, message: impl Into<String>) -> ServiceError {
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            api_contract_version: API_CONTRACT_VERSION,
            error: message.into(),
        }
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/disqualified-officers/healthcheck", get(healthcheck))
        .route("/disqualified-officers/openapi", get(openapi))
        .route("/disqualified-officers/:officer_type/:officer_id", get(get_officer))
        .route(
            "/disqualified-officers/:officer_type/:officer_id/internal",
            axum::routing::put(upsert_officer).delete(delete_officer),
        )
        .with_state(state)
}

fn build_state(args: &Args) -> Result<ServiceState> {
    let store = SqliteDisqualificationStore::open(&args.db)
        .with_context(|| format!("failed to open store at {}", args.db.display()))?;
    let notifier = StreamHookGate::new(
        HttpChangeNotifier::new(
            &args.chs_kafka_api_url,
            Duration::from_millis(args.notify_timeout_ms),
        ),
        args.stream_hook_enabled,
    );
    Ok(ServiceState { api: DisqualifiedOfficersApi::new(Arc::new(store), Arc::new(notifier)) })
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let state = build_state(&args)?;
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(
        bind = %args.bind,
        db = %args.db.display(),
        stream_hook_enabled = args.stream_hook_enabled,
        "disqualified officers service listening"
    );
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn get_officer(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path((officer_type, officer_id)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    authorise(&headers, Access::Read)?;
    let context_id = header_value(&headers, REQUEST_ID_HEADER)
        .unwrap_or_else(|| ulid::Ulid::new().to_string());
    let officer_type = OfficerType::parse(&officer_type)
        .map_err(|err| ServiceState::error(StatusCode::NOT_FOUND, err.to_string()))?;

    let api = state.api;
    run_blocking(context_id, "get", move || match officer_type {
        OfficerType::Natural => api.get_natural(&officer_id).map(|data| Json(data).into_response()),
        OfficerType::Corporate => {
            api.get_corporate(&officer_id).map(|data| Json(data).into_response())
        }
    })
    .await
}

async fn upsert_officer(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path((officer_type, officer_id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, ServiceError> {
    authorise(&headers, Access::Internal)?;
    let context_id = required_request_id(&headers)?;
    let officer_type = OfficerType::parse(&officer_type).map_err(|err| {
        tracing::error!(context_id = %context_id, error = %err, "rejected upsert");
        ServiceState::error(StatusCode::BAD_REQUEST, err.to_string())
    })?;
    let Json(body) = body.map_err(|rejection| {
        tracing::error!(context_id = %context_id, error = %rejection.body_text(), "malformed upsert body");
        ServiceState::error(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;

    let api = state.api;
    let request_context = context_id.clone();
    let work: Box<dyn FnOnce() -> Result<UpsertOutcome, ApiError> + Send> = match officer_type {
        OfficerType::Natural => {
            let request: InternalNaturalDisqualification = decode_body(&context_id, body)?;
            Box::new(move || api.upsert_natural(&request_context, &officer_id, request))
        }
        OfficerType::Corporate => {
            let request: InternalCorporateDisqualification = decode_body(&context_id, body)?;
            Box::new(move || api.upsert_corporate(&request_context, &officer_id, request))
        }
    };
    run_blocking(context_id, "upsert", work).await?;
    Ok(StatusCode::OK)
}

async fn delete_officer(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path((officer_type, officer_id)): Path<(String, String)>,
) -> Result<StatusCode, ServiceError> {
    authorise(&headers, Access::Internal)?;
    let context_id = required_request_id(&headers)?;
    let delta_at = header_value(&headers, DELTA_AT_HEADER);

    let api = state.api;
    let request_context = context_id.clone();
    run_blocking(context_id, "delete", move || {
        api.delete(&request_context, &officer_type, &officer_id, delta_at.as_deref())
    })
    .await?;
    Ok(StatusCode::OK)
}

fn decode_body<T>(context_id: &str, body: Value) -> Result<T, ServiceError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(body).map_err(|err| {
        tracing::error!(context_id, error = %err, "invalid upsert body");
        ServiceState::error(StatusCode::BAD_REQUEST, format!("invalid request body: {err}"))
    })
}

/// Run blocking store and notifier work off the async runtime, inside a span
/// tagged with the request id.
async fn run_blocking<T, F>(
    context_id: String,
    operation: &'static str,
    work: F,
) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    let span = tracing::info_span!("request", request_id = %context_id, operation);
    let started = Instant::now();
    let joined = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        tracing::debug!("request started");
        work()
    })
    .await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let outcome = joined.map_err(|err| {
        tracing::error!(request_id = %context_id, operation, error = %err, "request worker failed");
        ServiceState::error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    })?;

    match outcome {
        Ok(value) => {
            tracing::info!(request_id = %context_id, operation, latency_ms, "request completed");
            Ok(value)
        }
        Err(err) => {
            let error = ServiceError::from(err);
            tracing::info!(
                request_id = %context_id,
                operation,
                status = error.status.as_u16(),
                latency_ms,
                "request failed"
            );
            Err(error)
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn required_request_id(headers: &HeaderMap) -> Result<String, ServiceError> {
    header_value(headers, REQUEST_ID_HEADER).ok_or_else(|| {
        tracing::error!("missing {REQUEST_ID_HEADER} header");
        ServiceState::error(StatusCode::BAD_REQUEST, format!("missing {REQUEST_ID_HEADER} header"))
    })
}

/// Gateway identity checks. Every caller needs an identity and a recognised
/// identity type; internal writes additionally need an API key carrying the
/// `internal-app` privilege.
fn authorise(headers: &HeaderMap, access: Access) -> Result<(), ServiceError> {
    let identity = header_value(headers, ERIC_IDENTITY_HEADER);
    let identity_type =
        header_value(headers, ERIC_IDENTITY_TYPE_HEADER).map(|value| value.to_ascii_lowercase());

    let Some(identity_type) = identity_type.filter(|value| value == "key" || value == "oauth2")
    else {
        tracing::warn!("rejected request without a recognised identity type");
        return Err(ServiceState::error(StatusCode::UNAUTHORIZED, "unauthorised"));
    };
    if identity.is_none() {
        tracing::warn!("rejected request without an identity");
        return Err(ServiceState::error(StatusCode::UNAUTHORIZED, "unauthorised"));
    }

    if access == Access::Internal {
        let privileged = identity_type == "key"
            && header_value(headers, ERIC_PRIVILEGES_HEADER).is_some_and(|privileges| {
                privileges.split(',').any(|privilege| privilege.trim() == INTERNAL_APP_PRIVILEGE)
            });
        if !privileged {
            tracing::warn!(identity_type = %identity_type, "rejected internal request without internal-app privilege");
            return Err(ServiceState::error(StatusCode::FORBIDDEN, "forbidden"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use axum::body::{to_bytes, Body};
    use disqualified_officers_core::{
        DisqualificationRecord, DisqualificationStore, OfficerId, StoreError,
    };
    use disqualified_officers_notify::{ChangeNotifier, NotifyError, ResourceChangedRequest};
    use http::Request;
    use tower::ServiceExt;

    const INTERNAL_HEADERS: [(&str, &str); 4] = [
        ("x-request-id", "ctx-test"),
        ("ERIC-Identity", "tester"),
        ("ERIC-Identity-Type", "key"),
        ("ERIC-Authorised-Key-Privileges", "internal-app"),
    ];

    const READ_HEADERS: [(&str, &str); 2] =
        [("ERIC-Identity", "tester"), ("ERIC-Identity-Type", "oauth2")];

    fn unique_temp_db_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("disqualified-officers-service-{}.sqlite3", ulid::Ulid::new()))
    }

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<ResourceChangedRequest>>,
        failure: Option<NotifyError>,
    }

    impl RecordingNotifier {
        fn calls(&self) -> Vec<ResourceChangedRequest> {
            match self.calls.lock() {
                Ok(calls) => calls.clone(),
                Err(_) => panic!("notifier lock poisoned"),
            }
        }
    }

    impl ChangeNotifier for RecordingNotifier {
        fn notify(&self, request: &ResourceChangedRequest) -> Result<(), NotifyError> {
            if let Some(failure) = &self.failure {
                return Err(failure.clone());
            }
            match self.calls.lock() {
                Ok(mut calls) => calls.push(request.clone()),
                Err(_) => panic!("notifier lock poisoned"),
            }
            Ok(())
        }
    }

    struct UnavailableStore;

    impl DisqualificationStore for UnavailableStore {
        fn find_by_id(
            &self,
            _id: &OfficerId,
        ) -> Result<Option<DisqualificationRecord>, StoreError> {
            Err(StoreError::Transient("database is locked".to_string()))
        }

        fn save(&self, _record: &DisqualificationRecord) -> Result<(), StoreError> {
            Err(StoreError::Transient("database is locked".to_string()))
        }

        fn delete_by_id(&self, _id: &OfficerId) -> Result<(), StoreError> {
            Err(StoreError::Transient("database is locked".to_string()))
        }
    }

    fn sqlite_state(notifier: Arc<RecordingNotifier>) -> ServiceState {
        sqlite_state_at(unique_temp_db_path(), notifier)
    }

    fn sqlite_state_at(db_path: PathBuf, notifier: Arc<RecordingNotifier>) -> ServiceState {
        let store = match SqliteDisqualificationStore::open(db_path) {
            Ok(store) => store,
            Err(err) => panic!("failed to open test store: {err}"),
        };
        ServiceState { api: DisqualifiedOfficersApi::new(Arc::new(store), notifier) }
    }

    fn request(
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        builder.body(body).unwrap_or_else(|err| panic!("failed to build request: {err}"))
    }

    async fn send(state: &ServiceState, request: Request<Body>) -> Response {
        match app(state.clone()).oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router request failed: {err}"),
        }
    }

    async fn response_json(response: Response) -> Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    fn natural_body(delta_at: &str) -> Value {
        serde_json::json!({
            "external_data": {
                "surname": "Smith",
                "forename": "Jane",
                "date_of_birth": "1970-01-02",
                "person_number": "12345",
                "etag": "caller-etag",
                "disqualifications": [{
                    "disqualification_type": "order",
                    "disqualified_from": "2020-01-01",
                    "disqualified_until": "2030-01-01",
                    "reason": {"act": "company-directors-disqualification-act-1986", "section": "6"}
                }],
                "permissions_to_act": [{
                    "company_names": ["ACME LTD"],
                    "purpose": "internal only"
                }]
            },
            "internal_data": {
                "officer_disq_id": "disq-1",
                "officer_detail_id": "detail-1",
                "officer_id_raw": "raw-1",
                "delta_at": delta_at
            }
        })
    }

    fn corporate_body(delta_at: &str) -> Value {
        serde_json::json!({
            "external_data": {
                "name": "ACME LTD",
                "company_number": "01234567",
                "disqualifications": []
            },
            "internal_data": { "delta_at": delta_at }
        })
    }

    // Test IDs: TSVC-001
    #[tokio::test]
    async fn healthcheck_reports_up_without_identity() {
        let state = sqlite_state(Arc::new(RecordingNotifier::default()));
        let response =
            send(&state, request("GET", "/disqualified-officers/healthcheck", &[], None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        assert_eq!(value["status"], "UP");
    }

    // Test IDs: TSVC-002
    #[tokio::test]
    async fn openapi_endpoint_returns_bundled_document() {
        let state = sqlite_state(Arc::new(RecordingNotifier::default()));
        let response =
            send(&state, request("GET", "/disqualified-officers/openapi", &[], None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("openapi: 3.1.0"));
        assert!(body.contains("/disqualified-officers/{officer_type}/{officer_id}/internal"));
    }

    // Test IDs: TSVC-003
    #[tokio::test]
    async fn upsert_then_get_returns_redacted_resource() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = sqlite_state(Arc::clone(&notifier));

        let response = send(
            &state,
            request(
                "PUT",
                "/disqualified-officers/natural/CH100/internal",
                &INTERNAL_HEADERS,
                Some(&natural_body("2024-01-01T00:00:00Z")),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(notifier.calls().len(), 1);
        assert_eq!(notifier.calls()[0].context_id, "ctx-test");

        let response = send(
            &state,
            request("GET", "/disqualified-officers/natural/CH100", &READ_HEADERS, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        assert_eq!(value["surname"], "Smith");
        assert_eq!(value["date_of_birth"], "1970-01-02");
        assert!(value.get("person_number").is_none());
        assert!(value["permissions_to_act"][0].get("purpose").is_none());
        assert_ne!(value["etag"], "caller-etag");

        let response = send(
            &state,
            request("GET", "/disqualified-officers/corporate/CH100", &READ_HEADERS, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let value = response_json(response).await;
        assert_eq!(
            value.get("service_contract_version").and_then(Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(
            value.get("api_contract_version").and_then(Value::as_str),
            Some(API_CONTRACT_VERSION)
        );
    }

    #[tokio::test]
    async fn put_of_other_officer_type_is_rejected() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = sqlite_state(Arc::clone(&notifier));

        let response = send(
            &state,
            request(
                "PUT",
                "/disqualified-officers/natural/X9/internal",
                &INTERNAL_HEADERS,
                Some(&natural_body("2024-01-01T00:00:00Z")),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &state,
            request(
                "PUT",
                "/disqualified-officers/corporate/X9/internal",
                &INTERNAL_HEADERS,
                Some(&corporate_body("2024-02-01T00:00:00Z")),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(notifier.calls().len(), 1);

        let response = send(
            &state,
            request("GET", "/disqualified-officers/natural/X9", &READ_HEADERS, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn corrupt_stored_rows_are_internal_errors() {
        let db_path = unique_temp_db_path();
        let notifier = Arc::new(RecordingNotifier::default());
        let state = sqlite_state_at(db_path.clone(), Arc::clone(&notifier));
        let uri = "/disqualified-officers/natural/CH100/internal";

        let response = send(
            &state,
            request("PUT", uri, &INTERNAL_HEADERS, Some(&natural_body("2024-01-01T00:00:00Z"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let conn = match rusqlite::Connection::open(&db_path) {
            Ok(conn) => conn,
            Err(err) => panic!("failed to open test database: {err}"),
        };
        if let Err(err) = conn.execute(
            "UPDATE disqualifications SET data_json = ?1 WHERE officer_id = ?2",
            rusqlite::params!["{not json", "CH100"],
        ) {
            panic!("failed to corrupt fixture row: {err}");
        }

        let response = send(
            &state,
            request("GET", "/disqualified-officers/natural/CH100", &READ_HEADERS, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let value = response_json(response).await;
        assert_eq!(value["error"], "internal server error");

        let response = send(
            &state,
            request("PUT", uri, &INTERNAL_HEADERS, Some(&natural_body("2024-02-01T00:00:00Z"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let mut delete_headers = INTERNAL_HEADERS.to_vec();
        delete_headers.push(("X-DELTA-AT", "20250101000000000000"));
        let response = send(&state, request("DELETE", uri, &delete_headers, None)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(notifier.calls().len(), 1);

        let _ = std::fs::remove_file(db_path);
    }

    // Test IDs: TSVC-004
    #[tokio::test]
    async fn identity_headers_gate_access() {
        let state = sqlite_state(Arc::new(RecordingNotifier::default()));

        let response =
            send(&state, request("GET", "/disqualified-officers/natural/CH100", &[], None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &state,
            request(
                "GET",
                "/disqualified-officers/natural/CH100",
                &[("ERIC-Identity", "tester"), ("ERIC-Identity-Type", "robot")],
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &state,
            request(
                "PUT",
                "/disqualified-officers/natural/CH100/internal",
                &[("x-request-id", "ctx"), ("ERIC-Identity", "tester"), ("ERIC-Identity-Type", "oauth2")],
                Some(&natural_body("2024-01-01T00:00:00Z")),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &state,
            request(
                "DELETE",
                "/disqualified-officers/natural/CH100/internal",
                &[
                    ("x-request-id", "ctx"),
                    ("ERIC-Identity", "tester"),
                    ("ERIC-Identity-Type", "KEY"),
                    ("ERIC-Authorised-Key-Privileges", "sensitive-data"),
                ],
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &state,
            request("GET", "/disqualified-officers/natural/CH100", &READ_HEADERS, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // Test IDs: TSVC-005
    #[tokio::test]
    async fn malformed_upserts_are_bad_requests() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = sqlite_state(Arc::clone(&notifier));
        let uri = "/disqualified-officers/natural/CH100/internal";

        let response = send(
            &state,
            request("PUT", uri, &INTERNAL_HEADERS[1..], Some(&natural_body("2024-01-01T00:00:00Z"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut invalid_delta = natural_body("2024-01-01T00:00:00Z");
        invalid_delta["internal_data"]["delta_at"] = Value::String("yesterday".to_string());
        let response =
            send(&state, request("PUT", uri, &INTERNAL_HEADERS, Some(&invalid_delta))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut raw = request("PUT", uri, &INTERNAL_HEADERS, None);
        raw.headers_mut().insert(
            "content-type",
            http::HeaderValue::from_static("application/json"),
        );
        *raw.body_mut() = Body::from("{not json");
        let response = send(&state, raw).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &state,
            request(
                "PUT",
                "/disqualified-officers/alien/CH100/internal",
                &INTERNAL_HEADERS,
                Some(&natural_body("2024-01-01T00:00:00Z")),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(notifier.calls().is_empty());
    }

    // Test IDs: TSVC-006
    #[tokio::test]
    async fn delete_statuses_follow_reconciliation_rules() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = sqlite_state(Arc::clone(&notifier));
        let uri = "/disqualified-officers/corporate/CH200/internal";

        let response = send(
            &state,
            request("PUT", uri, &INTERNAL_HEADERS, Some(&corporate_body("2024-09-25T17:10:03.950844Z"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let mut stale_headers = INTERNAL_HEADERS.to_vec();
        stale_headers.push(("X-DELTA-AT", "20220925171003950844"));
        let response = send(&state, request("DELETE", uri, &stale_headers, None)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&state, request("DELETE", uri, &INTERNAL_HEADERS, None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut fresh_headers = INTERNAL_HEADERS.to_vec();
        fresh_headers.push(("X-DELTA-AT", "20240925171003950844"));
        let response = send(
            &state,
            request("DELETE", "/disqualified-officers/natural/CH200/internal", &fresh_headers, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &state,
            request("DELETE", "/disqualified-officers/alien/CH200/internal", &fresh_headers, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&state, request("DELETE", uri, &fresh_headers, None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&state, request("DELETE", uri, &fresh_headers, None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let calls = notifier.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].is_delete && calls[1].snapshot.is_some());
        assert!(calls[2].is_delete && calls[2].snapshot.is_none());
    }

    // Test IDs: TSVC-007
    #[tokio::test]
    async fn dependency_failures_map_to_gateway_statuses() {
        let store_down = ServiceState {
            api: DisqualifiedOfficersApi::new(
                Arc::new(UnavailableStore),
                Arc::new(RecordingNotifier::default()),
            ),
        };
        let response = send(
            &store_down,
            request(
                "PUT",
                "/disqualified-officers/natural/CH100/internal",
                &INTERNAL_HEADERS,
                Some(&natural_body("2024-01-01T00:00:00Z")),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let unavailable = sqlite_state(Arc::new(RecordingNotifier {
            failure: Some(NotifyError::ServiceUnavailable("503".to_string())),
            ..RecordingNotifier::default()
        }));
        let response = send(
            &unavailable,
            request(
                "PUT",
                "/disqualified-officers/natural/CH100/internal",
                &INTERNAL_HEADERS,
                Some(&natural_body("2024-01-01T00:00:00Z")),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let unexpected = sqlite_state(Arc::new(RecordingNotifier {
            failure: Some(NotifyError::Unexpected("418".to_string())),
            ..RecordingNotifier::default()
        }));
        let response = send(
            &unexpected,
            request(
                "PUT",
                "/disqualified-officers/natural/CH100/internal",
                &INTERNAL_HEADERS,
                Some(&natural_body("2024-01-01T00:00:00Z")),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let value = response_json(response).await;
        assert_eq!(value["error"], "internal server error");
    }

    #[test]
    fn args_read_flags_with_defaults() {
        let args = match Args::try_parse_from([
            "disqualified-officers-service",
            "--db",
            "/tmp/officers.sqlite3",
            "--stream-hook-enabled",
            "true",
        ]) {
            Ok(args) => args,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        assert_eq!(args.db, PathBuf::from("/tmp/officers.sqlite3"));
        assert!(args.stream_hook_enabled);
        assert_eq!(args.notify_timeout_ms, 5_000);
    }
}
