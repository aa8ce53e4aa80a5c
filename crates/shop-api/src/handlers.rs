//! # Request Handlers
//!
//! Axum request handlers for the shop API. Successful responses use the
//! `{ "success": true, "data": ... }` envelope.

use crate::auth::{hash_password, verify_password, AdminUser, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use shop_core::{
    normalize_email, Cart, CartItem, CustomerDetails, GatewayNotification, NewProduct, NewUser,
    ProductId, Role, ShopError, User,
};
use tracing::{info, instrument};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Session token plus the account it belongs to
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

/// Checkout request
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Defaults to the session user's name and email
    #[serde(default, alias = "customerDetails")]
    pub customer_details: Option<CustomerDetails>,
}

/// Admin product payload; required fields are checked by `NewProduct::validate`
#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub preview_image: Option<String>,
    #[serde(default)]
    pub detail_image: Option<String>,
    #[serde(default)]
    pub file_key: String,
}

impl From<ProductRequest> for NewProduct {
    fn from(request: ProductRequest) -> Self {
        NewProduct {
            title: request.title.trim().to_string(),
            slug: request.slug.trim().to_string(),
            description: request.description,
            price: request.price,
            preview_image: request.preview_image.filter(|s| !s.is_empty()),
            detail_image: request.detail_image.filter(|s| !s.is_empty()),
            file_key: request.file_key.trim().to_string(),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "digital-shop",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// -- accounts -----------------------------------------------------------------

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;

    let name = request.name.trim();
    let email = normalize_email(&request.email);
    if name.is_empty() || email.is_empty() || request.password.is_empty() {
        return Err(ShopError::InvalidArgument(
            "Name, email and password are required".to_string(),
        )
        .into());
    }
    if request.password.chars().count() < 6 {
        return Err(ShopError::InvalidArgument(
            "Password must be at least 6 characters".to_string(),
        )
        .into());
    }

    let user = state
        .storage(
            "create_user",
            state.store.create_user(&NewUser {
                name: name.to_string(),
                email,
                password_hash: hash_password(&request.password)?,
                role: Role::Customer,
            }),
        )
        .await?;

    let token = state.sessions.issue(&user)?;
    info!("Registered user {}", user.id);

    Ok((StatusCode::CREATED, ok(SessionResponse { token, user })))
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;

    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(
            ShopError::InvalidArgument("Email and password are required".to_string()).into(),
        );
    }

    let invalid =
        || ApiError::from(ShopError::Unauthorized("Invalid email or password".to_string()));

    let user = state
        .storage(
            "user_by_email",
            state.store.user_by_email(&normalize_email(&request.email)),
        )
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&request.password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = state.sessions.issue(&user)?;
    Ok(ok(SessionResponse { token, user }))
}

// -- catalog ------------------------------------------------------------------

pub async fn list_products(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let products = state
        .storage("list_products", state.store.list_products())
        .await?;
    Ok(ok(products))
}

pub async fn get_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .storage("product_by_slug", state.store.product_by_slug(&slug))
        .await?
        .ok_or_else(|| ShopError::NotFound("Product not found".to_string()))?;
    Ok(ok(product))
}

// -- payment ------------------------------------------------------------------

/// Create a pending order and a gateway transaction for it
#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;

    let customer = match request.customer_details {
        Some(customer) => customer,
        None => {
            let account = state
                .storage("user_by_id", state.store.user_by_id(user.id))
                .await?
                .ok_or_else(|| ShopError::Unauthorized("Unknown user".to_string()))?;
            CustomerDetails {
                first_name: account.name,
                email: account.email,
                phone: None,
            }
        }
    };

    let cart = Cart {
        items: request.items,
    };
    let receipt = state.checkout.checkout(user.id, &cart, customer).await?;

    Ok(ok(receipt))
}

/// Public client key for the browser payment widget
pub async fn client_key(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let key = state.gateway.client_key().ok_or_else(|| {
        ShopError::Configuration(format!(
            "{} exposes no client key",
            state.gateway.provider_name()
        ))
    })?;

    Ok(ok(serde_json::json!({ "clientKey": key })))
}

/// Gateway status callback; authenticity rests on the signature alone
#[instrument(skip(state, body))]
pub async fn notification(
    State(state): State<AppState>,
    body: Result<Json<GatewayNotification>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(notification) = body?;

    state
        .reconciler
        .apply_gateway_status(&notification)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Notification processed"
    })))
}

// -- purchases ----------------------------------------------------------------

pub async fn my_purchases(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let purchases = state.entitlements.list_purchases(user.id).await?;
    Ok(ok(purchases))
}

#[instrument(skip(state, user, product_id), fields(user_id = user.id))]
pub async fn download(
    State(state): State<AppState>,
    user: AuthUser,
    product_id: Result<Path<ProductId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(product_id) = product_id?;
    let grant = state
        .entitlements
        .authorize_download(user.id, product_id)
        .await?;
    Ok(ok(grant))
}

// -- admin --------------------------------------------------------------------

pub async fn admin_list_products(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<impl IntoResponse> {
    let products = state
        .storage("product_sales", state.store.product_sales())
        .await?;
    Ok(ok(products))
}

#[instrument(skip(state, admin, body), fields(admin_id = admin.0.id))]
pub async fn admin_create_product(
    State(state): State<AppState>,
    admin: AdminUser,
    body: Result<Json<ProductRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let product = NewProduct::from(request);
    product.validate()?;

    let created = state
        .storage("create_product", state.store.create_product(&product))
        .await?;
    info!("Created product {} ({})", created.id, created.slug);

    Ok((StatusCode::CREATED, ok(created)))
}

#[instrument(skip(state, admin, product_id, body), fields(admin_id = admin.0.id))]
pub async fn admin_update_product(
    State(state): State<AppState>,
    admin: AdminUser,
    product_id: Result<Path<ProductId>, PathRejection>,
    body: Result<Json<ProductRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(product_id) = product_id?;
    let Json(request) = body?;
    let product = NewProduct::from(request);
    product.validate()?;

    let updated = state
        .storage(
            "update_product",
            state.store.update_product(product_id, &product),
        )
        .await?;
    info!("Updated product {}", updated.id);

    Ok(ok(updated))
}

#[instrument(skip(state, admin, product_id), fields(admin_id = admin.0.id))]
pub async fn admin_delete_product(
    State(state): State<AppState>,
    admin: AdminUser,
    product_id: Result<Path<ProductId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(product_id) = product_id?;
    let deleted = state
        .storage("delete_product", state.store.delete_product(product_id))
        .await?;
    info!("Deleted product {} ({})", deleted.id, deleted.slug);

    Ok(ok(deleted))
}

pub async fn admin_list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<impl IntoResponse> {
    let orders = state.storage("list_orders", state.store.list_orders()).await?;
    Ok(ok(orders))
}

pub async fn admin_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<impl IntoResponse> {
    let stats = state
        .storage("dashboard_stats", state.store.dashboard_stats())
        .await?;
    Ok(ok(stats))
}
