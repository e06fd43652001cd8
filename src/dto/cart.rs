use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

/// One cart line as the API exposes it.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemView {
    pub product_id: Uuid,
    pub product_name: String,
    #[schema(value_type = String, example = "9.99")]
    pub unit_price: Decimal,
    pub quantity: i32,
    #[schema(value_type = String, example = "19.98")]
    pub line_total: Decimal,
}

/// The whole cart. `total` is recomputed from the lines on every read,
/// never stored.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    #[schema(value_type = String, example = "23.48")]
    pub total: Decimal,
}
