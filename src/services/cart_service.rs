use std::collections::HashMap;

use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    cart::{Cart, CartError, CartLine},
    dto::cart::{AddCartItemRequest, CartItemView, CartView, UpdateCartItemRequest},
    entity::{
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// The domain cart plus the product names needed to render it. Prices and
/// quantities live on the cart lines; names are display-only.
struct HydratedCart {
    cart: Cart,
    product_names: HashMap<Uuid, String>,
}

/// Loads a customer's line rows joined with their products into a [`Cart`].
///
/// Hydration is strict: a row referencing a vanished product or a second
/// row for the same product means the stored state broke an invariant the
/// schema is supposed to hold, and the load fails rather than papering
/// over it.
async fn hydrate_cart<C: ConnectionTrait>(conn: &C, row: &CartModel) -> AppResult<HydratedCart> {
    let rows = CartItems::find()
        .filter(CartItemCol::CartId.eq(row.id))
        .find_also_related(Products)
        .all(conn)
        .await?;

    let mut cart = Cart::new(row.customer_id);
    let mut product_names = HashMap::with_capacity(rows.len());
    for (item, product) in rows {
        let product = match product {
            Some(p) => p,
            None => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "cart item {} references missing product {}",
                    item.id,
                    item.product_id
                )));
            }
        };
        cart.insert_line(CartLine::new(item.product_id, product.price, item.quantity)?)?;
        product_names.insert(item.product_id, product.name);
    }

    Ok(HydratedCart {
        cart,
        product_names,
    })
}

fn cart_view(hydrated: &HydratedCart) -> CartView {
    let items = hydrated
        .cart
        .lines()
        .map(|line| CartItemView {
            product_id: line.product_id(),
            product_name: hydrated
                .product_names
                .get(&line.product_id())
                .cloned()
                .unwrap_or_default(),
            unit_price: line.unit_price(),
            quantity: line.quantity(),
            line_total: line.line_total(),
        })
        .collect();

    CartView {
        items,
        total: hydrated.cart.total(),
    }
}

fn empty_view() -> CartView {
    CartView {
        items: Vec::new(),
        total: Decimal::ZERO,
    }
}

/// Fetches the customer's cart row under `FOR UPDATE`, creating it on
/// first use. Every mutation goes through this, so concurrent requests
/// for the same customer serialize on the row lock, two racing first
/// mutations included.
async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
) -> AppResult<CartModel> {
    if let Some(cart) = find_locked_cart(conn, customer_id).await? {
        return Ok(cart);
    }

    // A racing first mutation may insert the row between the lookup and
    // this insert; the conflict target turns that into a no-op and the
    // locked re-select picks the winner's row up.
    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        created_at: NotSet,
    };
    Carts::insert(cart)
        .on_conflict(
            OnConflict::column(CartCol::CustomerId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    match find_locked_cart(conn, customer_id).await? {
        Some(cart) => Ok(cart),
        None => Err(AppError::Internal(anyhow::anyhow!(
            "cart row for customer {customer_id} missing after insert"
        ))),
    }
}

async fn find_locked_cart<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
) -> AppResult<Option<CartModel>> {
    let cart = Carts::find()
        .filter(CartCol::CustomerId.eq(customer_id))
        .lock(LockType::Update)
        .one(conn)
        .await?;
    Ok(cart)
}

/// A customer with no cart row gets an empty cart; reading never creates
/// one.
pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let row = Carts::find()
        .filter(CartCol::CustomerId.eq(user.user_id))
        .one(&state.orm)
        .await?;

    let view = match row {
        Some(row) => cart_view(&hydrate_cart(&state.orm, &row).await?),
        None => empty_view(),
    };

    Ok(ApiResponse::success("Ok", view, Some(Meta::empty())))
}

/// Adding a product that is already in the cart merges the quantities
/// into the existing line instead of duplicating it.
pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    let txn = state.orm.begin().await?;

    let cart_row = find_or_create_cart(&txn, user.user_id).await?;

    let product = Products::find_by_id(payload.product_id).one(&txn).await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let incoming = CartLine::new(product.id, product.price, payload.quantity)?;

    let mut hydrated = hydrate_cart(&txn, &cart_row).await?;
    let existed = hydrated.cart.line(product.id).is_some();
    let merged_quantity = hydrated.cart.add_line(incoming).quantity();
    hydrated.product_names.insert(product.id, product.name);

    if existed {
        CartItems::update_many()
            .col_expr(CartItemCol::Quantity, Expr::value(merged_quantity))
            .filter(CartItemCol::CartId.eq(cart_row.id))
            .filter(CartItemCol::ProductId.eq(payload.product_id))
            .exec(&txn)
            .await?;
    } else {
        CartItemActive {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart_row.id),
            product_id: Set(payload.product_id),
            quantity: Set(merged_quantity),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart"),
        Some(serde_json::json!({
            "product_id": payload.product_id,
            "quantity": merged_quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Item added",
        cart_view(&hydrated),
        Some(Meta::empty()),
    ))
}

/// Replaces the quantity of an existing line. Updating a product that is
/// not in the cart is an error, not an implicit add.
pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    let txn = state.orm.begin().await?;

    let cart_row = match find_locked_cart(&txn, user.user_id).await? {
        Some(row) => row,
        None => return Err(CartError::ProductNotInCart(product_id).into()),
    };

    let mut hydrated = hydrate_cart(&txn, &cart_row).await?;
    hydrated.cart.set_quantity(product_id, payload.quantity)?;

    CartItems::update_many()
        .col_expr(CartItemCol::Quantity, Expr::value(payload.quantity))
        .filter(CartItemCol::CartId.eq(cart_row.id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart"),
        Some(serde_json::json!({
            "product_id": product_id,
            "quantity": payload.quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Quantity updated",
        cart_view(&hydrated),
        Some(Meta::empty()),
    ))
}

/// Removing is idempotent: a product that is not in the cart (or a
/// customer with no cart at all) still gets a success response.
pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let txn = state.orm.begin().await?;

    let cart_row = match find_locked_cart(&txn, user.user_id).await? {
        Some(row) => row,
        None => {
            return Ok(ApiResponse::success(
                "Item removed",
                empty_view(),
                Some(Meta::empty()),
            ));
        }
    };

    let mut hydrated = hydrate_cart(&txn, &cart_row).await?;
    let removed = hydrated.cart.remove_product(product_id);

    if removed.is_some() {
        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart_row.id))
            .filter(CartItemCol::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    if removed.is_some() {
        if let Err(err) = log_audit(
            &state.pool,
            Some(user.user_id),
            "cart_remove",
            Some("cart"),
            Some(serde_json::json!({ "product_id": product_id })),
        )
        .await
        {
            tracing::warn!(error = %err, "audit log failed");
        }
    }

    Ok(ApiResponse::success(
        "Item removed",
        cart_view(&hydrated),
        Some(Meta::empty()),
    ))
}

/// Empties the cart in one shot. The cart row itself stays; only the
/// lines go.
pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let txn = state.orm.begin().await?;

    let cart_row = find_locked_cart(&txn, user.user_id).await?;

    if let Some(row) = cart_row.as_ref() {
        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(row.id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    if cart_row.is_some() {
        if let Err(err) = log_audit(
            &state.pool,
            Some(user.user_id),
            "cart_clear",
            Some("cart"),
            None,
        )
        .await
        {
            tracing::warn!(error = %err, "audit log failed");
        }
    }

    Ok(ApiResponse::success(
        "Cart cleared",
        empty_view(),
        Some(Meta::empty()),
    ))
}
