use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod config;
mod failures;
mod index;
mod streams;
mod suggest;

use config::Config;
use failures::MemoryFailureSink;
use index::EventIndex;
use streams::{CreateStreamRequest, StreamCatalog};
use suggest::engine::SuggestionEngine;
use suggest::scope::AccessScopeResolver;
use suggest::window::TimeWindowResolver;
use suggest::SuggestService;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(
    name = "qy-hub",
    version,
    about = "QUARRY Suggestion Hub"
)]
struct Args {
    /// Server bind address (overrides `server.bind`)
    #[arg(long)]
    bind: Option<String>,

    /// Path to config file
    #[arg(long, default_value = "qy-hub.toml")]
    config: PathBuf,

    /// Override the number of index shards
    #[arg(long)]
    shards: Option<usize>,
}

// =============================================================================
// Shared State
// =============================================================================

pub struct AppState {
    pub start_time: Instant,
    pub config: Config,
    pub catalog: Arc<StreamCatalog>,
    pub index: EventIndex,
    pub failures: Arc<MemoryFailureSink>,
    pub suggest: SuggestService,
    pub auth_layer: auth::AuthLayer,
}

impl AppState {
    async fn build(config: Config) -> Self {
        let catalog = Arc::new(StreamCatalog::new());
        for seed in &config.streams {
            let req = CreateStreamRequest {
                id: seed.id.clone(),
                title: seed.title.clone(),
                description: seed.description.clone(),
            };
            if let Err(e) = catalog.create(req).await {
                tracing::warn!("Skipping configured stream: {}", e);
            }
        }

        let failures = Arc::new(MemoryFailureSink::new(config.failures.capacity));
        let index = EventIndex::new(
            config.index.shards,
            config.index.shard_capacity,
            catalog.clone(),
            failures.clone(),
        );

        let oracle = Arc::new(auth::permissions::StreamPermissions::new(catalog.clone()));
        let suggest = SuggestService::new(
            AccessScopeResolver::new(oracle, config.suggest.unreadable_streams),
            TimeWindowResolver::new(config.suggest.default_range_secs),
            SuggestionEngine::new(
                index.query_shards(),
                config.suggest.prefix_case,
                Duration::from_millis(config.suggest.query_timeout_ms),
            ),
            config.suggest.limit,
            config.suggest.max_limit,
        );

        Self {
            start_time: Instant::now(),
            config,
            catalog,
            index,
            failures,
            suggest,
            auth_layer: auth::AuthLayer::new(),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "qy_hub=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config);
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(shards) = args.shards {
        config.index.shards = shards.max(1);
    }

    let state = Arc::new(AppState::build(config).await);

    // Generate Root API Key on startup
    {
        let root_key = state
            .auth_layer
            .create_key(auth::CreateApiKeyRequest {
                label: "Root Key (Startup)".into(),
                scopes: vec![auth::Scope::Admin, auth::Scope::Read, auth::Scope::Write],
                streams: vec!["*".into()],
            })
            .await;

        if let Some(raw) = root_key.key.as_deref() {
            tracing::info!("🔑 GENERATED ROOT API KEY: {}", raw);
            tracing::warn!("⚠️  Copy this key! It will not be shown again.");
        }
    }

    let app = router(state.clone());

    let addr: SocketAddr = match state.config.server.bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {}", state.config.server.bind, e);
            std::process::exit(1);
        }
    };
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("  ⛏  QUARRY v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  API:        http://{}/api/status", addr);
    tracing::info!("  Suggest:    POST http://{}/api/search/suggest", addr);
    tracing::info!("  Streams:    {}", state.catalog.len().await);
    tracing::info!("  Shards:     {}", state.suggest.engine().shard_count());
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(api::status))
        .route("/api/search/suggest", post(api::suggest))
        .route(
            "/api/streams",
            get(api::list_streams).post(api::create_stream),
        )
        .route("/api/streams/:id", delete(api::delete_stream))
        .route("/api/events", post(api::ingest_events))
        .route("/api/failures", get(api::list_failures))
        .route("/api/index/shards", get(api::list_shards))
        .route(
            "/api/index/shards/:id/availability",
            post(api::set_shard_availability),
        )
        .route(
            "/api/auth/keys",
            get(api::list_api_keys).post(api::create_api_key),
        )
        .route("/api/auth/keys/:id", delete(api::revoke_api_key))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Auth Middleware
// =============================================================================

/// Validates the bearer token, checks its scope and hands the caller's
/// [`auth::Identity`] to the handlers.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if method == Method::OPTIONS {
        return Ok(next.run(req).await);
    }
    let Some(scope) = required_scope(&path, &method) else {
        return Ok(next.run(req).await);
    };

    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::to_string);

    let Some(token) = token else {
        tracing::warn!("Missing Authorization header for {}", path);
        return Err(StatusCode::UNAUTHORIZED);
    };
    let Some(key) = state.auth_layer.validate_token(&token).await else {
        tracing::warn!("Invalid API Key for {}", path);
        return Err(StatusCode::UNAUTHORIZED);
    };
    if !state.auth_layer.has_scope(&key, scope) {
        tracing::warn!("Insufficient scope for {} {}", method, path);
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(key.identity());
    Ok(next.run(req).await)
}

fn required_scope(path: &str, method: &Method) -> Option<auth::Scope> {
    if !path.starts_with("/api") || path == "/api/status" {
        return None;
    }
    if path.starts_with("/api/auth") {
        return Some(auth::Scope::Admin);
    }
    // Suggestions are a read even though they arrive as POST.
    if path == "/api/search/suggest" {
        return Some(auth::Scope::Read);
    }
    match *method {
        Method::GET | Method::HEAD => Some(auth::Scope::Read),
        _ => Some(auth::Scope::Write),
    }
}
