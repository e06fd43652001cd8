use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
    dto::products::ProductList,
    entity::categories::{
        ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories,
        Model as CategoryModel,
    },
    entity::products::{Column as ProductCol, Entity as Products, Model as ProductModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Category, Product},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_categories(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<CategoryList>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = Categories::find().order_by_asc(CategoryCol::Name);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(category_from_entity)
        .collect();

    let meta = Meta::paged(page, limit, total);
    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(meta),
    ))
}

pub async fn get_category(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Category>> {
    let result = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(category_from_entity);
    let result = match result {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Category", result, None))
}

/// Products of one category. An unknown category is a 404, not an empty
/// list, so callers can tell a bad id from a category with no products.
pub async fn get_category_products(
    state: &AppState,
    id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let category = Categories::find_by_id(id).one(&state.orm).await?;
    if category.is_none() {
        return Err(AppError::NotFound);
    }

    let (page, limit, offset) = pagination.normalize();

    let finder = Products::find()
        .filter(ProductCol::CategoryId.eq(id))
        .order_by_asc(ProductCol::Name);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let meta = Meta::paged(page, limit, total);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;

    let taken = Categories::find()
        .filter(CategoryCol::Name.eq(payload.name.as_str()))
        .one(&state.orm)
        .await?;
    if taken.is_some() {
        return Err(AppError::BadRequest("Category name is already taken".into()));
    }

    let active = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        description: Set(payload.description),
        created_at: NotSet,
    };
    let category = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_create",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category created",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;

    let existing = Categories::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    if let Some(name) = payload.name.as_ref().filter(|n| **n != existing.name) {
        let taken = Categories::find()
            .filter(CategoryCol::Name.eq(name.as_str()))
            .one(&state.orm)
            .await?;
        if taken.is_some() {
            return Err(AppError::BadRequest("Category name is already taken".into()));
        }
    }

    let mut active: CategoryActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }

    let category = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_update",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

/// Deleting a category orphans its products rather than deleting them;
/// the schema nulls their category reference.
pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Categories::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_delete",
        Some("categories"),
        Some(serde_json::json!({ "category_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn category_from_entity(model: CategoryModel) -> Category {
    Category {
        id: model.id,
        name: model.name,
        description: model.description,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        category_id: model.category_id,
        name: model.name,
        description: model.description,
        price: model.price,
        stock: model.stock,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
