// Raisket Engine - JSON API
// Products, reviews and calculators over HTTP (axum)

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use raisket_engine::calculators::{
    amortization_schedule, amortize, compute_bonus, project, BonusParameters, BonusQuote,
    CompoundInterestParameters, Installment, LoanParameters, LoanQuote, YearSnapshot,
};
use raisket_engine::{
    logging, EngineConfig, EngineError, ModerationAction, NewReview, ProductCategory,
    ReviewService, SqliteStore, VERSION,
};

/// Listen address override
const ADDR_ENV_VAR: &str = "RAISKET_ADDR";
const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    config: Arc<EngineConfig>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(ApiResponse::ok(data))).into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::failure(message))).into_response()
}

fn engine_failure(e: EngineError) -> Response {
    match e {
        EngineError::NotFound { .. } => fail(StatusCode::NOT_FOUND, e.to_string()),
        EngineError::InvalidInput(_) => fail(StatusCode::BAD_REQUEST, e.to_string()),
        other => {
            error!(error = %other, "request failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn lock_store(state: &AppState) -> Result<MutexGuard<'_, SqliteStore>, Response> {
    state.store.lock().map_err(|_| {
        error!("store mutex poisoned");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable")
    })
}

// ============================================================================
// Request / Response bodies
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    products: i64,
    institutions: i64,
}

#[derive(Deserialize)]
struct ProductQuery {
    category: Option<String>,
}

#[derive(Deserialize)]
struct LoanRequest {
    #[serde(flatten)]
    params: LoanParameters,
    #[serde(default)]
    schedule: bool,
}

/// `quote` is null when the inputs have no answer
#[derive(Serialize)]
struct LoanResponse {
    quote: Option<LoanQuote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule: Option<Vec<Installment>>,
}

#[derive(Deserialize)]
struct BonusRequest {
    monthly_salary: f64,
    bonus_days: Option<f64>,
    #[serde(default)]
    worked_full_year: bool,
    start_date: Option<NaiveDate>,
    /// Defaults to today
    as_of: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct ModerationRequest {
    action: ModerationAction,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> Response {
    let store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    let counts = store
        .count_products()
        .and_then(|products| Ok((products, store.count_institutions()?)));

    match counts {
        Ok((products, institutions)) => respond(
            StatusCode::OK,
            HealthResponse {
                status: "OK",
                version: VERSION,
                products,
                institutions,
            },
        ),
        Err(e) => engine_failure(e),
    }
}

/// GET /api/products?category=credit - List products
async fn list_products(State(state): State<AppState>, Query(query): Query<ProductQuery>) -> Response {
    let store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    let category = query
        .category
        .as_deref()
        .map(|key| ProductCategory::from_key_with_aliases(key, &state.config.category_aliases));

    match store.list_products(category) {
        Ok(products) => respond(StatusCode::OK, products),
        Err(e) => engine_failure(e),
    }
}

/// GET /api/products/:slug - One product by slug
async fn get_product(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.get_product_by_slug(&slug) {
        Ok(Some(product)) => respond(StatusCode::OK, product),
        Ok(None) => engine_failure(EngineError::not_found("product", slug)),
        Err(e) => engine_failure(e),
    }
}

/// POST /api/calculators/loan
async fn calculate_loan(Json(request): Json<LoanRequest>) -> Response {
    let quote = amortize(&request.params);
    let schedule = if request.schedule {
        amortization_schedule(&request.params)
    } else {
        None
    };

    respond(StatusCode::OK, LoanResponse { quote, schedule })
}

/// POST /api/calculators/compound
async fn calculate_compound(Json(params): Json<CompoundInterestParameters>) -> Response {
    let series: Option<Vec<YearSnapshot>> = project(&params);
    respond(StatusCode::OK, series)
}

/// POST /api/calculators/bonus
async fn calculate_bonus(State(state): State<AppState>, Json(request): Json<BonusRequest>) -> Response {
    let params = BonusParameters {
        monthly_salary: request.monthly_salary,
        bonus_days: request.bonus_days.unwrap_or(state.config.default_bonus_days),
        worked_full_year: request.worked_full_year,
        start_date: request.start_date,
    };
    let as_of = request.as_of.unwrap_or_else(|| Local::now().date_naive());

    let quote: Option<BonusQuote> = compute_bonus(&params, as_of);
    respond(StatusCode::OK, quote)
}

/// POST /api/reviews - Submit a review (starts pending)
async fn create_review(State(state): State<AppState>, Json(submission): Json<NewReview>) -> Response {
    let mut store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match ReviewService::new(&mut *store).create(submission) {
        Ok(outcome) => respond(StatusCode::CREATED, outcome),
        Err(e) => engine_failure(e),
    }
}

/// PATCH /api/reviews/:id - Approve or reject
async fn moderate_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ModerationRequest>,
) -> Response {
    let mut store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match ReviewService::new(&mut *store).moderate(&id, request.action) {
        Ok(outcome) => respond(StatusCode::OK, outcome),
        Err(e) => engine_failure(e),
    }
}

/// DELETE /api/reviews/:id
async fn delete_review(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let mut store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match ReviewService::new(&mut *store).delete(&id) {
        Ok(outcome) => respond(StatusCode::OK, outcome),
        Err(e) => engine_failure(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/products", get(list_products))
        .route("/products/:slug", get(get_product))
        .route("/calculators/loan", post(calculate_loan))
        .route("/calculators/compound", post(calculate_compound))
        .route("/calculators/bonus", post(calculate_bonus))
        .route("/reviews", post(create_review))
        .route("/reviews/:id", patch(moderate_review).delete(delete_review))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::load(None).context("Failed to load configuration")?;
    logging::init_logging(&config.log_filter);

    println!("🌐 Raisket Engine - API Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    println!("✓ Database opened: {}", config.database_path.display());

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        config: Arc::new(config),
    };

    let app = Router::new()
        .nest("/api", api_routes(state))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = std::env::var(ADDR_ENV_VAR).unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/health", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
