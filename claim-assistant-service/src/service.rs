use std::sync::Arc;

use anyhow::Context as _;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use claim_context::{
    BillCheck, BillDocument, ClaimConfig, ClaimError, ClaimSession, ConversationManager,
    DocumentExtractor, PolicyCatalog, PolicySummary, format_for_display,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::models::{
    BillQuery, BillResponse, BillStatusResponse, ChatRequest, ChatResponse, ExtractBillRequest,
    HistoryResponse, InsurerPlans, PolicyResponse,
};

/// Upload bodies carry the bill as base64, a third larger than the file.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// Status and body for a library error.
fn claim_error(message: &str, e: &ClaimError) -> ApiError {
    let status = match e {
        ClaimError::NotFound { .. } => StatusCode::NOT_FOUND,
        ClaimError::DataFormat(_) | ClaimError::Extraction { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ClaimError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        ClaimError::Model(_) => StatusCode::BAD_GATEWAY,
    };

    let mut body = json!({
        "error": message,
        "details": e.to_string(),
    });
    if let ClaimError::Extraction { partial, .. } = e {
        if !partial.is_empty() {
            body["partial_text"] = json!(partial);
        }
    }
    (status, Json(body))
}

/// One process-wide claim session; the mutex makes each action a
/// single-writer critical section.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<PolicyCatalog>,
    pub manager: Arc<ConversationManager>,
    pub extractor: Arc<DocumentExtractor>,
    pub session: Arc<Mutex<ClaimSession>>,
}

impl AppState {
    pub fn new(
        catalog: PolicyCatalog,
        manager: ConversationManager,
        extractor: DocumentExtractor,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            manager: Arc::new(manager),
            extractor: Arc::new(extractor),
            session: Arc::new(Mutex::new(ClaimSession::new())),
        }
    }
}

/// Loads the policy catalog and wires the model clients. A missing or
/// malformed catalog is an error; a missing credential is not.
pub fn create_app_state(config: &ClaimConfig) -> anyhow::Result<AppState> {
    let catalog = PolicyCatalog::load(&config.policy_path).with_context(|| {
        format!(
            "failed to load policy catalog from {}",
            config.policy_path.display()
        )
    })?;

    let extractor = DocumentExtractor::from_config(config);
    info!(
        policies = catalog.len(),
        chat_model = %config.chat_model,
        vision_model = %config.vision_model,
        pdf_support = extractor.supports_pdf(),
        "Application state created"
    );

    Ok(AppState::new(
        catalog,
        ConversationManager::from_config(config),
        extractor,
    ))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/policies", get(list_policies))
        .route("/policies/{insurer}/{plan}", get(get_policy))
        .route("/bill", get(get_bill))
        .route(
            "/bill/extract",
            post(extract_bill).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/bill/clear", post(clear_bill))
        .route("/chat", post(chat))
        .route("/chat/reset", post(reset_chat))
        .route("/chat/history", get(chat_history))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags every request with a fresh correlation id and runs it inside a span
/// carrying that id.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Claim Assistant Service",
        "version": "1.0.0",
        "description": "Policy-aware assistant for medical insurance bills",
        "endpoints": {
            "GET /policies": "List insurers and their plans",
            "GET /policies/{insurer}/{plan}": "Policy record and summary",
            "POST /bill/extract": "Extract text from a bill (PDF, JPEG or PNG) and keep it",
            "GET /bill": "Current bill text, checked against a policy when insurer and plan are given",
            "POST /bill/clear": "Forget the current bill text",
            "POST /chat": "Ask the assistant about the bill",
            "POST /chat/reset": "Start a new conversation",
            "GET /chat/history": "Conversation as displayed",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_policies(State(state): State<AppState>) -> Json<Vec<InsurerPlans>> {
    let policies = state
        .catalog
        .insurers()
        .map(|insurer| InsurerPlans {
            insurer: insurer.to_string(),
            plans: state.catalog.plans(insurer).map(str::to_string).collect(),
        })
        .collect();
    Json(policies)
}

async fn get_policy(
    State(state): State<AppState>,
    Path((insurer, plan)): Path<(String, String)>,
) -> ApiResult<PolicyResponse> {
    let policy = state
        .catalog
        .lookup(&insurer, &plan)
        .map_err(|e| claim_error("Policy not found", &e))?;

    Ok(Json(PolicyResponse {
        policy: policy.clone(),
        summary: PolicySummary::from(policy),
    }))
}

async fn extract_bill(
    State(state): State<AppState>,
    Json(request): Json<ExtractBillRequest>,
) -> ApiResult<BillResponse> {
    info!(file_name = %request.file_name, "Bill extraction requested");

    if request.file_name.trim().is_empty() {
        return Err(bad_request_error("file_name is required"));
    }
    let bytes = STANDARD
        .decode(request.data_base64.trim())
        .map_err(|_| bad_request_error("data_base64 is not valid base64"))?;

    let mut document = BillDocument::new(request.file_name, bytes);
    if let Some(content_type) = request.content_type {
        document = document.with_content_type(content_type);
    }

    let mut session = state.session.lock().await;
    let bill_text = session
        .extract_bill(&state.extractor, &document)
        .await
        .map_err(|e| {
            error!(document = %document.name, error = %e, "Bill extraction failed");
            claim_error("Bill extraction failed", &e)
        })?
        .to_string();

    Ok(Json(BillResponse {
        chars: bill_text.chars().count(),
        bill_text,
    }))
}

async fn get_bill(
    State(state): State<AppState>,
    Query(query): Query<BillQuery>,
) -> ApiResult<BillStatusResponse> {
    let bill_text = state.session.lock().await.bill_text().to_string();

    let check = match (query.insurer, query.plan) {
        (Some(insurer), Some(plan)) => {
            let policy = state
                .catalog
                .lookup(&insurer, &plan)
                .map_err(|e| claim_error("Policy not found", &e))?;
            Some(BillCheck::run(&bill_text, policy))
        }
        (None, None) => None,
        _ => return Err(bad_request_error("insurer and plan must be given together")),
    };

    Ok(Json(BillStatusResponse { bill_text, check }))
}

async fn clear_bill(State(state): State<AppState>) -> Json<Value> {
    state.session.lock().await.clear_bill();
    Json(json!({ "status": "cleared" }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(bad_request_error("message is required"));
    }

    let policy = state
        .catalog
        .lookup(&request.insurer, &request.plan)
        .map_err(|e| claim_error("Policy not found", &e))?;

    let mut session = state.session.lock().await;
    let reply = session
        .send(&state.manager, policy, message)
        .await
        .map_err(|e| {
            error!(
                insurer = %request.insurer,
                plan = %request.plan,
                error = %e,
                "Chat turn failed"
            );
            claim_error("Chat turn failed", &e)
        })?;

    Ok(Json(ChatResponse {
        formatted: format_for_display(&reply),
        reply,
    }))
}

async fn reset_chat(State(state): State<AppState>) -> Json<Value> {
    state.session.lock().await.reset();
    Json(json!({ "status": "reset" }))
}

async fn chat_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let messages = state.session.lock().await.display_messages();
    Json(HistoryResponse { messages })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex as StdMutex;

    use axum::body::{Body, to_bytes};
    use claim_context::{ChatModel, Message, ModelResponse, Role, async_trait};
    use tower::ServiceExt;

    use super::*;

    const CATALOG: &str = r#"{
        "Star Health": {
            "Comprehensive": {
                "insurer": "Star Health",
                "plan": "Comprehensive",
                "sum_insured": 500000,
                "room": {"type": "Single Private AC", "cap_per_day": 5000, "proportionate_deduction": true},
                "copay": {"percentage": 10},
                "non_payables": ["registration", "admin fee"]
            },
            "Basic": {
                "insurer": "Star Health",
                "plan": "Basic",
                "sum_insured": 200000
            }
        }
    }"#;

    /// Replies with a fixed text, or fails, and counts calls.
    struct FakeModel {
        reply: Option<String>,
        calls: StdMutex<Vec<Vec<Message>>>,
    }

    impl FakeModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        async fn invoke(&self, messages: &[Message]) -> claim_context::Result<ModelResponse> {
            self.calls.lock().unwrap().push(messages.to_vec());
            match &self.reply {
                Some(reply) => Ok(ModelResponse::Text(reply.clone())),
                None => Err(ClaimError::Model("upstream unavailable".to_string())),
            }
        }
    }

    fn state_with(chat: Arc<FakeModel>, vision: Arc<FakeModel>) -> AppState {
        AppState::new(
            PolicyCatalog::from_json_str(CATALOG).unwrap(),
            ConversationManager::new(chat),
            DocumentExtractor::without_pdf_support(vision),
        )
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn png_base64() -> String {
        let mut buffer = Vec::new();
        image::DynamicImage::new_rgb8(2, 2)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        STANDARD.encode(buffer)
    }

    #[tokio::test]
    async fn health_and_root() {
        let app = build_router(state_with(FakeModel::replying(""), FakeModel::replying("")));

        let response = app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn policies_are_listed_in_source_order() {
        let app = build_router(state_with(FakeModel::replying(""), FakeModel::replying("")));

        let response = app.oneshot(get_request("/policies")).await.unwrap();
        assert_eq!(
            body_json(response).await,
            json!([{"insurer": "Star Health", "plans": ["Comprehensive", "Basic"]}])
        );
    }

    #[tokio::test]
    async fn policy_detail_and_unknown_plan() {
        let app = build_router(state_with(FakeModel::replying(""), FakeModel::replying("")));

        let response = app
            .clone()
            .oneshot(get_request("/policies/Star%20Health/Comprehensive"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["policy"]["sum_insured"], 500000);
        assert_eq!(body["summary"]["sum_insured"], "₹500,000.00");
        assert_eq!(body["summary"]["room_cap"], "₹5,000.00");

        let response = app
            .oneshot(get_request("/policies/Star%20Health/Platinum"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn extracted_bill_feeds_chat_and_history() {
        let chat = FakeModel::replying("1. Insurance pays: ₹300.00 2. You pay: ₹150.00");
        let vision = FakeModel::replying("Registration 100\nAdmin fee 50\nNet Payable 450");
        let app = build_router(state_with(chat.clone(), vision.clone()));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/bill/extract",
                json!({"file_name": "bill.png", "data_base64": png_base64()}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(vision.call_count(), 1);

        let response = app
            .clone()
            .oneshot(get_request("/bill?insurer=Star%20Health&plan=Comprehensive"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["check"]["total_payable"], 450.0);
        assert_eq!(body["check"]["non_payables"]["total"], 150.0);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/chat",
                json!({
                    "insurer": "Star Health",
                    "plan": "Comprehensive",
                    "message": " how much? "
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["formatted"], "1. Insurance pays: ₹300.00\n2. You pay: ₹150.00");

        let sent = chat.calls.lock().unwrap()[0].clone();
        assert!(sent[0].text().contains("BILL:\nRegistration 100"));
        assert_eq!(sent[1], Message::user("how much?"));

        let response = app.oneshot(get_request("/chat/history")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], json!(Role::User));
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_a_model_call() {
        let chat = FakeModel::replying("unused");
        let app = build_router(state_with(chat.clone(), FakeModel::replying("")));

        let response = app
            .oneshot(json_request(
                "POST",
                "/chat",
                json!({"insurer": "Star Health", "plan": "Basic", "message": "   "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn model_failure_maps_to_bad_gateway() {
        let app = build_router(state_with(FakeModel::failing(), FakeModel::replying("")));

        let response = app
            .oneshot(json_request(
                "POST",
                "/chat",
                json!({"insurer": "Star Health", "plan": "Basic", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(response).await["details"],
            "Model invocation failed: upstream unavailable"
        );
    }

    /// Pixel noise so PNG compression cannot shrink it.
    fn large_png_base64() -> String {
        let mut seed: u32 = 0x2545_f491;
        let noise = image::RgbImage::from_fn(1000, 1000, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let [r, g, b, _] = seed.to_le_bytes();
            image::Rgb([r, g, b])
        });
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(noise)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        STANDARD.encode(buffer)
    }

    #[tokio::test]
    async fn large_bill_scans_are_accepted() {
        let vision = FakeModel::replying("Net Payable 450");
        let app = build_router(state_with(FakeModel::replying(""), vision.clone()));

        let data = large_png_base64();
        assert!(data.len() > 2 * 1024 * 1024);

        let response = app
            .oneshot(json_request(
                "POST",
                "/bill/extract",
                json!({"file_name": "phone-photo.png", "data_base64": data}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["bill_text"], "Net Payable 450");
        assert_eq!(vision.call_count(), 1);
    }

    #[tokio::test]
    async fn bad_uploads_are_rejected() {
        let app = build_router(state_with(FakeModel::replying(""), FakeModel::replying("")));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/bill/extract",
                json!({"file_name": "bill.png", "data_base64": "***"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "POST",
                "/bill/extract",
                json!({"file_name": "notes.txt", "data_base64": STANDARD.encode("hello")}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn reset_and_clear_actions() {
        let app = build_router(state_with(
            FakeModel::replying("Hi!"),
            FakeModel::replying("Total 10"),
        ));

        app.clone()
            .oneshot(json_request(
                "POST",
                "/bill/extract",
                json!({
                    "file_name": "bill.png",
                    "content_type": "image/png",
                    "data_base64": png_base64()
                }),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(json_request(
                "POST",
                "/chat",
                json!({"insurer": "Star Health", "plan": "Basic", "message": "hello"}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/chat/reset", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(get_request("/chat/history")).await.unwrap();
        let history = body_json(response).await;
        assert_eq!(history["messages"], json!([]));

        let bill = body_json(app.clone().oneshot(get_request("/bill")).await.unwrap()).await;
        assert_eq!(bill["bill_text"], "Total 10");

        app.clone().oneshot(json_request("POST", "/bill/clear", json!({}))).await.unwrap();
        let bill = body_json(app.oneshot(get_request("/bill")).await.unwrap()).await;
        assert_eq!(bill["bill_text"], "");
        assert!(bill.get("check").is_none());
    }
}
