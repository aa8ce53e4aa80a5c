//! # Routes
//!
//! Axum router configuration for the shop API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Create the main application router
///
/// Routes:
/// - Accounts:
///   - POST /api/auth/register
///   - POST /api/auth/login
///
/// - Catalog:
///   - GET  /api/products
///   - GET  /api/products/{slug}
///
/// - Payment:
///   - POST /api/payment/create-transaction - Checkout (session required)
///   - GET  /api/payment/client-key
///   - POST /api/payment/notification - Gateway callback (signature, no session)
///
/// - Purchases (session required):
///   - GET  /api/my-purchases
///   - GET  /api/download/{product_id}
///
/// - Back-office (admin role required):
///   - GET/POST   /api/admin/products
///   - PUT/DELETE /api/admin/products/{id}
///   - GET        /api/admin/orders
///   - GET        /api/admin/stats
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let auth_routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login));

    let payment_routes = Router::new()
        .route("/create-transaction", post(handlers::create_transaction))
        .route("/client-key", get(handlers::client_key))
        .route("/notification", post(handlers::notification));

    let admin_routes = Router::new()
        .route(
            "/products",
            get(handlers::admin_list_products).post(handlers::admin_create_product),
        )
        .route(
            "/products/{id}",
            put(handlers::admin_update_product).delete(handlers::admin_delete_product),
        )
        .route("/orders", get(handlers::admin_list_orders))
        .route("/stats", get(handlers::admin_stats));

    let api_routes = Router::new()
        .route("/products", get(handlers::list_products))
        .route("/products/{slug}", get(handlers::get_product_by_slug))
        .route("/my-purchases", get(handlers::my_purchases))
        .route("/download/{product_id}", get(handlers::download))
        .nest("/auth", auth_routes)
        .nest("/payment", payment_routes)
        .nest("/admin", admin_routes);

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api", api_routes)
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}
