use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::ApiError,
    state::AppState,
    sweets::{
        dto::{
            CreateSweetRequest, PurchaseResponse, QuantityRequest, RestockResponse, SearchQuery,
            UpdateSweetRequest,
        },
        repo::{self, Sweet},
    },
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sweets", get(list_sweets).post(create_sweet))
        .route("/sweets/search", get(search_sweets))
        .route(
            "/sweets/:id",
            get(get_sweet).put(update_sweet).delete(delete_sweet),
        )
        .route("/sweets/:id/purchase", post(purchase_sweet))
        .route("/sweets/:id/restock", post(restock_sweet))
}

fn validate_price(price: f64) -> Result<(), ApiError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ApiError::Validation(
            "Price must be a positive number".into(),
        ));
    }
    Ok(())
}

fn validate_create(payload: &CreateSweetRequest) -> Result<(), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    if payload.category.trim().is_empty() {
        return Err(ApiError::Validation("Category is required".into()));
    }
    validate_price(payload.price)?;
    if payload.quantity < 0 {
        return Err(ApiError::Validation(
            "Quantity must be a non-negative integer".into(),
        ));
    }
    Ok(())
}

fn validate_update(patch: &UpdateSweetRequest) -> Result<(), ApiError> {
    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::Validation("Name cannot be empty".into()));
    }
    if patch
        .category
        .as_deref()
        .is_some_and(|c| c.trim().is_empty())
    {
        return Err(ApiError::Validation("Category cannot be empty".into()));
    }
    if let Some(price) = patch.price {
        validate_price(price)?;
    }
    if patch.quantity.is_some_and(|q| q < 0) {
        return Err(ApiError::Validation(
            "Quantity must be a non-negative integer".into(),
        ));
    }
    Ok(())
}

fn validate_search(query: &SearchQuery) -> Result<(), ApiError> {
    if let Some(min) = query.min_price {
        validate_price(min)?;
    }
    if let Some(max) = query.max_price {
        validate_price(max)?;
    }
    Ok(())
}

fn validate_adjustment(quantity: i32) -> Result<(), ApiError> {
    if quantity < 1 {
        return Err(ApiError::Validation("Quantity must be at least 1".into()));
    }
    Ok(())
}

#[instrument(skip(state, claims, payload))]
pub async fn create_sweet(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Json(payload): Json<CreateSweetRequest>,
) -> Result<(StatusCode, Json<Sweet>), ApiError> {
    validate_create(&payload)?;
    let sweet = repo::create(
        &state.db,
        &payload.name,
        &payload.category,
        payload.price,
        payload.quantity,
        payload.description.as_deref(),
        payload.image_url.as_deref(),
        claims.id,
    )
    .await?;
    info!(sweet_id = sweet.id, created_by = claims.id, "sweet created");
    Ok((StatusCode::CREATED, Json(sweet)))
}

#[instrument(skip(state, _user))]
pub async fn list_sweets(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<Sweet>>, ApiError> {
    let sweets = repo::find_all(&state.db).await?;
    Ok(Json(sweets))
}

#[instrument(skip(state, _user))]
pub async fn get_sweet(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Sweet>, ApiError> {
    let sweet = repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Sweet not found".into()))?;
    Ok(Json(sweet))
}

#[instrument(skip(state, _user))]
pub async fn search_sweets(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Sweet>>, ApiError> {
    validate_search(&query)?;
    let sweets = repo::search(&state.db, &query).await?;
    Ok(Json(sweets))
}

#[instrument(skip(state, _admin, patch))]
pub async fn update_sweet(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(patch): Json<UpdateSweetRequest>,
) -> Result<Json<Sweet>, ApiError> {
    validate_update(&patch)?;
    let sweet = repo::update(&state.db, id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("Sweet not found".into()))?;
    info!(sweet_id = id, "sweet updated");
    Ok(Json(sweet))
}

#[instrument(skip(state, _admin))]
pub async fn delete_sweet(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if !repo::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Sweet not found".into()));
    }
    info!(sweet_id = id, "sweet deleted");
    Ok(Json(json!({ "message": "Sweet deleted successfully" })))
}

#[instrument(skip(state, claims, payload))]
pub async fn purchase_sweet(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<QuantityRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    validate_adjustment(payload.quantity)?;

    // One conditional UPDATE: two purchases racing for the last unit cannot
    // both pass the stock check.
    match repo::purchase(&state.db, id, payload.quantity).await? {
        Some(sweet) => {
            let total_price = sweet.price * f64::from(payload.quantity);
            info!(
                sweet_id = id,
                user_id = claims.id,
                purchased = payload.quantity,
                "purchase"
            );
            Ok(Json(PurchaseResponse {
                message: "Purchase successful".into(),
                purchased: payload.quantity,
                total_price,
                sweet,
            }))
        }
        None => match repo::find_by_id(&state.db, id).await? {
            Some(_) => {
                warn!(sweet_id = id, requested = payload.quantity, "stock short");
                Err(ApiError::InsufficientStock)
            }
            None => Err(ApiError::NotFound("Sweet not found".into())),
        },
    }
}

#[instrument(skip(state, _admin, payload))]
pub async fn restock_sweet(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(payload): Json<QuantityRequest>,
) -> Result<Json<RestockResponse>, ApiError> {
    validate_adjustment(payload.quantity)?;
    let sweet = repo::restock(&state.db, id, payload.quantity)
        .await?
        .ok_or_else(|| ApiError::NotFound("Sweet not found".into()))?;
    info!(sweet_id = id, restocked = payload.quantity, "restock");
    Ok(Json(RestockResponse {
        message: "Restock successful".into(),
        restocked: payload.quantity,
        sweet,
    }))
}
