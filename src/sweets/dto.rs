use serde::{Deserialize, Serialize};

use crate::sweets::repo::Sweet;

#[derive(Debug, Deserialize)]
pub struct CreateSweetRequest {
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Partial update: only supplied fields change.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSweetRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i32>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl UpdateSweetRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.price.is_none()
            && self.quantity.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
    }
}

/// Query params for catalog search; every filter is optional and they AND
/// together. Price bounds are inclusive.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "minPrice")]
    pub min_price: Option<f64>,
    #[serde(rename = "maxPrice")]
    pub max_price: Option<f64>,
}

/// Body for purchase and restock.
#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub message: String,
    pub sweet: Sweet,
    pub purchased: i32,
    #[serde(rename = "totalPrice")]
    pub total_price: f64,
}

#[derive(Debug, Serialize)]
pub struct RestockResponse {
    pub message: String,
    pub sweet: Sweet,
    pub restocked: i32,
}
