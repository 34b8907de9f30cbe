use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;

use crate::auth::accounts;
use crate::auth::middleware::JwtSecret;
use crate::chat::messages;
use crate::media;
use crate::state::AppState;
use crate::users;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 5 requests per minute per IP on credential endpoints.
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Background cleanup of rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // CORS for the browser client: credentials on, single configured origin.
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .client_url
                .parse::<axum::http::HeaderValue>()
                .expect("Invalid client_url for CORS origin"),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::ORIGIN,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true);

    // Credential routes with rate limiting
    let auth_routes = Router::new()
        .route("/api/auth/signup", axum::routing::post(accounts::signup))
        .route("/api/auth/login", axum::routing::post(accounts::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Session routes (logout is stateless; check requires a valid JWT)
    let session_routes = Router::new()
        .route("/api/auth/logout", axum::routing::post(accounts::logout))
        .route("/api/auth/check", axum::routing::get(accounts::check));

    let user_routes = Router::new().route(
        "/api/user/update-profile",
        axum::routing::put(users::update_profile),
    );

    // Note: /api/messages/users is static and takes priority over the
    // /api/messages/{id} path parameter.
    let message_routes = Router::new()
        .route(
            "/api/messages/users",
            axum::routing::get(messages::get_contacts),
        )
        .route(
            "/api/messages/send/{id}",
            axum::routing::post(messages::send_message),
        )
        .route(
            "/api/messages/{id}",
            axum::routing::get(messages::get_messages),
        );

    // WebSocket endpoint (auth via query param or cookie, not JWT header)
    let ws_routes = Router::new().route("/api/ws", axum::routing::get(ws_handler::ws_upgrade));

    let media_routes = Router::new().route(
        "/api/media/{name}",
        axum::routing::get(media::serve_media),
    );

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(session_routes)
        .merge(user_routes)
        .merge(message_routes)
        .merge(ws_routes)
        .merge(media_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .layer(cors)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
