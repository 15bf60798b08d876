#![allow(deprecated)] // TimeoutLayer::new is deprecated but replacement API not stable

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use mediadesk_auth::middleware::{auth_middleware_with_db, require_staff};
use mediadesk_auth::{AuthState, JwtKeys};
use mediadesk_core::{
    MediaRequestOptions, MediaRequestService, RequestNumberAllocator, SiteSettingsService, UserService,
};
use mediadesk_storage::{DriveStorage, LocalStorage, S3Storage, Storage, StorageError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod admin;
mod auth_handlers;
mod config;
mod error;
mod forms;
mod health;
mod media_requests;
mod middleware;

use config::{AppConfig, StorageConfig};
use middleware::LoginLimiter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub storage: Arc<dyn Storage>,
    pub keys: JwtKeys,
    pub users: UserService,
    pub requests: MediaRequestService,
    pub site_settings: SiteSettingsService,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, pool: PgPool, storage: Arc<dyn Storage>) -> Self {
        let keys = JwtKeys::new(config.jwt_secret.as_bytes(), config.jwt_ttl_hours);
        let site_settings = SiteSettingsService::new(pool.clone(), config.folders.clone());
        let users = UserService::new(pool.clone(), storage.clone(), site_settings.clone());
        let requests = MediaRequestService::new(
            pool.clone(),
            storage.clone(),
            site_settings.clone(),
            RequestNumberAllocator::new(config.allocator.clone()),
            MediaRequestOptions {
                upload_policy: config.upload_policy,
                lock_prefix: config.request_number_prefix_lock,
            },
        );
        Self {
            pool,
            storage,
            keys,
            users,
            requests,
            site_settings,
            config,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!("Fatal: {}", e);
        eprintln!("mediadesk: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mediadesk_core=debug,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let storage = init_storage(&config.storage).await?;
    tracing::info!("Storage backend: {}", storage.backend_name());

    tracing::info!(
        "Connecting to database (max_conn: {}, min_conn: {})...",
        config.db_max_connections,
        config.db_min_connections
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .connect(&config.database_url)
        .await?;
    tracing::info!("Database connected");

    sqlx::migrate!("../../migrations").run(&pool).await?;

    tracing::info!(
        "Request numbers: max_attempts={}, prefix_lock={}, upload_policy={:?}",
        config.allocator.max_attempts,
        config.request_number_prefix_lock,
        config.upload_policy
    );

    let state = Arc::new(AppState::new(config.clone(), pool, storage));

    if let Some((username, password)) = &config.admin_credentials {
        match state.users.ensure_superuser(username, password).await {
            Ok(true) => tracing::info!("Bootstrap staff account {} created", username),
            Ok(false) => tracing::debug!("Bootstrap staff account {} already exists", username),
            Err(e) => tracing::error!("Could not create bootstrap staff account {}: {}", username, e),
        }
    }

    health::mark_server_start();

    let limiter = LoginLimiter::per_minute(config.login_rate_per_minute);
    let pruned = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            pruned.prune();
        }
    });

    tracing::info!(
        "Server configured: max_concurrent={}, request_timeout={}s, max_upload={} bytes",
        config.max_concurrent_requests,
        config.request_timeout_secs,
        config.max_upload_bytes
    );

    let app = build_router(state, limiter);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    // ConnectInfo feeds the login rate limiter and AuthUser::ip_address
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    let storage: Arc<dyn Storage> = match config {
        StorageConfig::Local { path } => Arc::new(LocalStorage::new(path.clone())?),
        StorageConfig::S3 { bucket } => Arc::new(S3Storage::new(bucket.clone()).await),
        StorageConfig::Drive { service_account_file } => {
            Arc::new(DriveStorage::from_service_account_file(service_account_file)?)
        }
    };
    Ok(storage)
}

fn build_router(state: Arc<AppState>, limiter: LoginLimiter) -> Router {
    let config = &state.config;
    let auth_state = AuthState {
        pool: state.pool.clone(),
        keys: state.keys.clone(),
    };

    // Health checks (no auth, no rate limiting)
    let health_routes = Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state.clone());

    // Login and registration, rate limited per IP
    let login_routes = Router::new()
        .route("/api/auth/login", post(auth_handlers::login))
        .route("/api/auth/register", post(auth_handlers::register))
        .layer(from_fn_with_state(limiter, middleware::rate_limit_login))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/admin/requests", get(admin::list_requests))
        .route("/api/admin/requests/resolve", post(admin::resolve_requests))
        .route("/api/admin/requests/{request_number}/status", put(admin::set_request_status))
        .route("/api/admin/users", get(admin::search_users))
        .route("/api/admin/users/{id}", put(admin::update_user))
        .route(
            "/api/admin/site-settings",
            get(admin::get_site_settings).put(admin::update_site_settings),
        )
        .route("/api/admin/storage/{folder}", get(admin::list_storage_folder))
        .route_layer(from_fn(require_staff));

    // Every request re-checks the account so deactivation applies immediately
    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth_handlers::me))
        .route("/api/dashboard", get(media_requests::dashboard))
        .route("/api/requests", post(media_requests::create_request))
        .route("/api/requests/{request_number}", get(media_requests::get_request))
        .merge(admin_routes)
        .layer(from_fn_with_state(auth_state, auth_middleware_with_db))
        .with_state(state.clone());

    // Room for multipart framing around the largest allowed file
    let body_limit = config.max_upload_bytes + 1024 * 1024;

    Router::new()
        .merge(health_routes)
        .merge(login_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(tower::limit::ConcurrencyLimitLayer::new(config.max_concurrent_requests))
        .layer(configure_cors(config))
}

/// CORS with an explicit allowlist; development also allows local frontends
fn configure_cors(config: &AppConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{header, Method};
    use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

    let mut origins = config.cors_allowed_origins.clone();
    if config.is_development() {
        tracing::warn!("CORS: Development mode enabled - allowing localhost origins");
        for local in ["http://localhost:3000", "http://localhost:5173", "http://127.0.0.1:5173"] {
            if !origins.iter().any(|o| o == local) {
                origins.push(local.to_string());
            }
        }
    }

    if origins.is_empty() {
        tracing::warn!("CORS: No CORS_ALLOWED_ORIGINS configured, cross-origin requests are blocked");
    } else {
        tracing::info!("CORS: Allowed origins: {:?}", origins);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin
                .to_str()
                .map(|o| origins.iter().any(|allowed| allowed == o))
                .unwrap_or(false)
        }))
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::PUT, Method::OPTIONS]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
        ]))
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let vars: HashMap<&str, String> = HashMap::from([
            ("DATABASE_URL", "postgres://mediadesk@127.0.0.1:1/mediadesk".to_string()),
            ("JWT_SECRET", "router-test-secret".to_string()),
            (
                "LOCAL_STORAGE_PATH",
                std::env::temp_dir().join("mediadesk-router-test").display().to_string(),
            ),
        ]);
        let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(match &config.storage {
            StorageConfig::Local { path } => path.clone(),
            other => panic!("unexpected storage {:?}", other),
        }).unwrap());

        build_router(Arc::new(AppState::new(config, pool, storage)), LoginLimiter::per_minute(10))
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        for uri in [
            "/api/dashboard",
            "/api/auth/me",
            "/api/requests/20250314_0915_0001",
            "/api/admin/site-settings",
            "/api/admin/requests?status=open",
            "/api/admin/users?q=asha",
        ] {
            let response = test_app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_token_from_other_secret_is_rejected() {
        let token = JwtKeys::new(b"someone-else", 1)
            .issue(uuid::Uuid::new_v4(), "mallory", true)
            .unwrap();
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/admin/site-settings")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_requires_json_body() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .body(Body::from("login=asha"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = test_app()
            .oneshot(Request::builder().uri("/api/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
