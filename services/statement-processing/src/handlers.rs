//! HTTP handlers for statement uploads, quota status, and metrics.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use fintrack_models::{ExtractedTransaction, NewTransaction};
use fintrack_utils::{
    validate_file_size, validate_file_type, validate_uuid, AppConfig, ErrorResponse, FintrackError,
    FintrackResult, QuotaStatus, RateLimiter, PDF_PROCESSING, PDF_PROCESSING_CHECK,
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::extraction::{FileError, StatementExtractor};
use crate::metrics::ExtractionMetrics;
use crate::uploads::UploadStore;

pub const USER_ID_HEADER: &str = "x-user-id";
const ALLOWED_TYPES: &[&str] = &["pdf"];

#[derive(Clone)]
pub struct AppState {
    pub extractor: StatementExtractor,
    pub uploads: Arc<UploadStore>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: ExtractionMetrics,
    pub config: Arc<AppConfig>,
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_request_size;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/statements/upload", post(upload_statement))
        .route("/api/v1/statements/upload/batch", post(upload_statements))
        .route("/api/v1/statements/quota", get(get_quota))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST])
                        .allow_headers([
                            header::CONTENT_TYPE,
                            header::AUTHORIZATION,
                            HeaderName::from_static(USER_ID_HEADER),
                        ]),
                )
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// `FintrackError` rendered as an `ErrorResponse` body.
#[derive(Debug)]
pub struct ApiError(FintrackError);

impl From<FintrackError> for ApiError {
    fn from(error: FintrackError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(self.0))).into_response()
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "statement-processing",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

fn caller_id(headers: &HeaderMap) -> FintrackResult<Uuid> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| FintrackError::validation(USER_ID_HEADER, "Missing user id header"))?;
    validate_uuid(raw)
}

/// A validated file field from a multipart body.
struct UploadedFile {
    name: String,
    data: Vec<u8>,
}

async fn next_file(multipart: &mut Multipart) -> FintrackResult<Option<UploadedFile>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FintrackError::validation("file", format!("Failed to read upload: {}", e)))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| FintrackError::validation("file", format!("Failed to read file data: {}", e)))?;

        return Ok(Some(UploadedFile {
            name,
            data: data.to_vec(),
        }));
    }
    Ok(None)
}

fn check_file(config: &AppConfig, file: &UploadedFile) -> FintrackResult<()> {
    validate_file_type(&file.name, ALLOWED_TYPES)?;
    validate_file_size(file.data.len() as u64, config.server.max_request_size as u64)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub transactions: Vec<ExtractedTransaction>,
    pub records: Vec<NewTransaction>,
    pub count: usize,
    pub status: String,
}

impl UploadResponse {
    fn new(transactions: Vec<ExtractedTransaction>) -> Self {
        let records = transactions.iter().map(ExtractedTransaction::to_record).collect();
        let status = if transactions.is_empty() {
            "unable_to_extract"
        } else {
            "processed"
        };

        Self {
            count: transactions.len(),
            records,
            transactions,
            status: status.to_string(),
        }
    }
}

/// Upload and extract a single statement
///
/// POST /api/v1/statements/upload
async fn upload_statement(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let user_id = caller_id(&headers)?;
    let file = next_file(&mut multipart)
        .await?
        .ok_or_else(|| FintrackError::validation("file", "No file provided"))?;
    check_file(&state.config, &file)?;

    let path = state.uploads.store(&file.data, &file.name).await?;
    info!(%user_id, file = %file.name, bytes = file.data.len(), "Statement uploaded");

    let transactions = state
        .extractor
        .extract_from_file(&path, user_id)
        .await?
        .ok_or_else(|| {
            FintrackError::statement_processing("File does not appear to be a bank statement")
        })?;

    Ok(Json(UploadResponse::new(transactions)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadResponse {
    #[serde(flatten)]
    pub result: UploadResponse,
    pub files_processed: usize,
    pub errors: Vec<FileError>,
}

/// Upload and extract several statements at once
///
/// POST /api/v1/statements/upload/batch
async fn upload_statements(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<BatchUploadResponse>, ApiError> {
    let user_id = caller_id(&headers)?;

    let mut stored: Vec<PathBuf> = Vec::new();
    let mut names: HashMap<String, String> = HashMap::new();
    let mut errors = Vec::new();

    loop {
        let file = match next_file(&mut multipart).await {
            Ok(Some(file)) => file,
            Ok(None) => break,
            Err(e) => {
                remove_all(&state.uploads, &stored).await;
                return Err(e.into());
            }
        };

        if let Err(e) = check_file(&state.config, &file) {
            errors.push(FileError {
                file: file.name,
                message: e.to_string(),
            });
            continue;
        }

        match state.uploads.store(&file.data, &file.name).await {
            Ok(path) => {
                names.insert(path.display().to_string(), file.name);
                stored.push(path);
            }
            Err(e) => {
                remove_all(&state.uploads, &stored).await;
                return Err(e.into());
            }
        }
    }

    if stored.is_empty() && errors.is_empty() {
        return Err(FintrackError::validation("file", "No files provided").into());
    }

    info!(%user_id, files = stored.len(), rejected = errors.len(), "Statement batch uploaded");

    let batch = match state.extractor.extract_from_files(stored.clone(), user_id).await {
        Ok(batch) => batch,
        Err(e) => {
            remove_all(&state.uploads, &stored).await;
            return Err(e.into());
        }
    };

    errors.extend(batch.errors.into_iter().map(|error| FileError {
        file: names.get(&error.file).cloned().unwrap_or(error.file),
        message: error.message,
    }));

    Ok(Json(BatchUploadResponse {
        result: UploadResponse::new(batch.transactions),
        files_processed: batch.files_processed,
        errors,
    }))
}

async fn remove_all(uploads: &UploadStore, paths: &[PathBuf]) {
    for path in paths {
        uploads.remove(path).await;
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub pdf_processing: QuotaStatus,
    pub batch_check: QuotaStatus,
    pub ai_enabled: bool,
}

/// GET /api/v1/statements/quota
async fn get_quota(State(state): State<AppState>) -> Json<QuotaResponse> {
    let limits = &state.config.rate_limits;
    Json(QuotaResponse {
        pdf_processing: state
            .limiter
            .snapshot(PDF_PROCESSING, limits.pdf_processing_limit),
        batch_check: state
            .limiter
            .snapshot(PDF_PROCESSING_CHECK, limits.batch_check_limit),
        ai_enabled: state.extractor.ai_enabled(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_processor::{PdfContent, PdfMetadata, PdfTextSource};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct PlainText;

    #[async_trait]
    impl PdfTextSource for PlainText {
        async fn extract(&self, data: Vec<u8>) -> FintrackResult<PdfContent> {
            Ok(PdfContent {
                text: String::from_utf8_lossy(&data).into_owned(),
                page_count: 1,
                metadata: PdfMetadata::default(),
            })
        }
    }

    const BOUNDARY: &str = "fintrack-test-boundary";
    const STATEMENT: &str = "Account Statement for period ending 03/31/2024\n\
        Beginning Balance $500.00\n\
        03/14/2024 STARBUCKS #4521 -$6.75\n\
        Ending Balance $493.25\n";

    fn state(dir: &std::path::Path) -> AppState {
        let config = Arc::new(AppConfig::default());
        let limiter = Arc::new(RateLimiter::new());
        let metrics = ExtractionMetrics::new();
        let uploads = Arc::new(UploadStore::new(
            dir,
            Duration::from_secs(3600),
            Duration::from_secs(86400),
        ));
        let extractor = StatementExtractor::from_config(
            &config,
            Arc::new(PlainText),
            None,
            limiter.clone(),
            uploads.clone(),
            metrics.clone(),
        );

        AppState {
            extractor,
            uploads,
            limiter,
            metrics,
            config,
        }
    }

    fn multipart_body(files: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                 Content-Type: application/pdf\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn upload_request(uri: &str, user: Option<Uuid>, files: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user.to_string());
        }
        builder.body(Body::from(multipart_body(files))).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = tempfile::tempdir().unwrap();
        let response = create_router(state(tmp.path()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_extracts_with_patterns() {
        let tmp = tempfile::tempdir().unwrap();
        let request = upload_request(
            "/api/v1/statements/upload",
            Some(Uuid::new_v4()),
            &[("march.pdf", STATEMENT)],
        );
        let response = create_router(state(tmp.path())).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["status"], "processed");
        assert_eq!(body["records"][0]["categoryId"], 1);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_statement() {
        let tmp = tempfile::tempdir().unwrap();
        let request = upload_request(
            "/api/v1/statements/upload",
            Some(Uuid::new_v4()),
            &[("note.pdf", "too short")],
        );
        let response = create_router(state(tmp.path())).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["code"], "STATEMENT_PROCESSING_ERROR");
    }

    #[tokio::test]
    async fn test_upload_requires_user_id() {
        let tmp = tempfile::tempdir().unwrap();
        let request = upload_request("/api/v1/statements/upload", None, &[("a.pdf", STATEMENT)]);
        let response = create_router(state(tmp.path())).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejects_wrong_file_type() {
        let tmp = tempfile::tempdir().unwrap();
        let request = upload_request(
            "/api/v1/statements/upload",
            Some(Uuid::new_v4()),
            &[("statement.csv", STATEMENT)],
        );
        let response = create_router(state(tmp.path())).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_quota_exhausted_returns_429_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let limit = state.config.rate_limits.batch_check_limit;
        let window = Duration::from_millis(state.config.rate_limits.batch_check_window_ms);
        assert!(state.limiter.try_acquire(PDF_PROCESSING_CHECK, limit, window, limit - 1));

        let files = [("a.pdf", STATEMENT), ("b.pdf", STATEMENT), ("c.pdf", STATEMENT)];
        let request = upload_request("/api/v1/statements/upload/batch", Some(Uuid::new_v4()), &files);
        let response = create_router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(response).await;
        assert_eq!(body["code"], "QUOTA_INSUFFICIENT");
        assert_eq!(body["details"]["required"], 2);
        assert_eq!(body["details"]["remaining"], 1);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_batch_reports_per_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let files = [("a.pdf", STATEMENT), ("b.pdf", STATEMENT), ("c.txt", STATEMENT)];
        let request = upload_request("/api/v1/statements/upload/batch", Some(Uuid::new_v4()), &files);
        let response = create_router(state(tmp.path())).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["filesProcessed"], 2);
        assert_eq!(body["errors"][0]["file"], "c.txt");
    }

    #[tokio::test]
    async fn test_quota_endpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let response = create_router(state(tmp.path()))
            .oneshot(
                Request::builder()
                    .uri("/api/v1/statements/quota")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["pdfProcessing"]["remaining"], 10);
        assert_eq!(body["batchCheck"]["key"], PDF_PROCESSING_CHECK);
        assert_eq!(body["aiEnabled"], false);
    }
}
