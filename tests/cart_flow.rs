use axum_marketplace_api::{
    cart::CartError,
    db::{create_orm_conn, create_pool},
    dto::cart::{AddCartItemRequest, UpdateCartItemRequest},
    dto::categories::CreateCategoryRequest,
    entity::carts::{Column as CartCol, Entity as Carts},
    entity::categories::ActiveModel as CategoryActive,
    entity::products::ActiveModel as ProductActive,
    entity::users::ActiveModel as UserActive,
    error::AppError,
    middleware::auth::AuthUser,
    routes::params::Pagination,
    services::{cart_service, category_service},
    state::AppState,
};
use rust_decimal::{Decimal, dec};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, Statement,
};
use uuid::Uuid;

// Integration flow: the running cart totals stay exact through add, merge,
// update, remove and clear; category browsing and admin gating work.
#[tokio::test]
async fn cart_totals_and_category_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(());
            }
        };

    let state = setup_state(&database_url).await?;

    // Seed users
    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;

    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    // Seed a category with two products
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set("Ceramics".into()),
        description: Set(Some("Handmade pottery".into())),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let mug = ProductActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(Some(category.id)),
        name: Set("Glazed Stoneware Mug".into()),
        description: Set(Some("Wheel-thrown mug".into())),
        price: Set(dec!(9.99)),
        stock: Set(10),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let towel = ProductActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(Some(category.id)),
        name: Set("Linen Tea Towel".into()),
        description: Set(Some("Stonewashed linen".into())),
        price: Set(dec!(3.50)),
        stock: Set(10),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    // Reading an empty cart works and does not create a cart row.
    let empty = cart_service::get_cart(&state, &auth_user).await?;
    let view = empty.data.unwrap();
    assert!(view.items.is_empty());
    assert_eq!(view.total, Decimal::ZERO);

    let cart_row = Carts::find()
        .filter(CartCol::CustomerId.eq(user_id))
        .one(&state.orm)
        .await?;
    assert!(cart_row.is_none(), "reading the cart must not create a row");

    // Add 2 mugs and 1 towel: 9.99 * 2 + 3.50 = 23.48 exactly.
    cart_service::add_item(
        &state,
        &auth_user,
        AddCartItemRequest {
            product_id: mug.id,
            quantity: 2,
        },
    )
    .await?;
    let resp = cart_service::add_item(
        &state,
        &auth_user,
        AddCartItemRequest {
            product_id: towel.id,
            quantity: 1,
        },
    )
    .await?;
    let view = resp.data.unwrap();
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total, dec!(23.48));
    let mug_line = view
        .items
        .iter()
        .find(|i| i.product_id == mug.id)
        .expect("mug line");
    assert_eq!(mug_line.line_total, dec!(19.98));
    assert_eq!(mug_line.product_name, "Glazed Stoneware Mug");

    // Drop the mugs to quantity 1: 9.99 + 3.50 = 13.49.
    let resp = cart_service::update_item(
        &state,
        &auth_user,
        mug.id,
        UpdateCartItemRequest { quantity: 1 },
    )
    .await?;
    assert_eq!(resp.data.unwrap().total, dec!(13.49));

    // Remove the towel: 9.99 left.
    let resp = cart_service::remove_item(&state, &auth_user, towel.id).await?;
    let view = resp.data.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.total, dec!(9.99));

    // Clear: exactly zero.
    let resp = cart_service::clear_cart(&state, &auth_user).await?;
    assert_eq!(resp.data.unwrap().total, dec!(0.00));

    // Adding the same product twice merges into one line.
    cart_service::add_item(
        &state,
        &auth_user,
        AddCartItemRequest {
            product_id: mug.id,
            quantity: 2,
        },
    )
    .await?;
    let resp = cart_service::add_item(
        &state,
        &auth_user,
        AddCartItemRequest {
            product_id: mug.id,
            quantity: 1,
        },
    )
    .await?;
    let view = resp.data.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.total, dec!(29.97));

    // Invalid quantity is rejected before anything is written.
    let err = cart_service::add_item(
        &state,
        &auth_user,
        AddCartItemRequest {
            product_id: mug.id,
            quantity: 0,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Cart(CartError::InvalidQuantity(0))));

    // Adding an unknown product is a 404.
    let err = cart_service::add_item(
        &state,
        &auth_user,
        AddCartItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Updating a product that is not in the cart is an error, not an add.
    let absent = Uuid::new_v4();
    let err = cart_service::update_item(
        &state,
        &auth_user,
        absent,
        UpdateCartItemRequest { quantity: 5 },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Cart(CartError::ProductNotInCart(id)) if id == absent
    ));

    // Removing a product that is not in the cart succeeds and changes nothing.
    let resp = cart_service::remove_item(&state, &auth_user, Uuid::new_v4()).await?;
    assert_eq!(resp.data.unwrap().total, dec!(29.97));

    // Category browsing: both products hang off the seeded category.
    let resp = category_service::get_category_products(
        &state,
        category.id,
        Pagination {
            page: Some(1),
            per_page: Some(20),
        },
    )
    .await?;
    let products = resp.data.unwrap();
    assert_eq!(products.items.len(), 2);
    assert!(products.items.iter().any(|p| p.id == towel.id));

    let err = category_service::get_category_products(
        &state,
        Uuid::new_v4(),
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Category writes are admin only.
    let err = category_service::create_category(
        &state,
        &auth_user,
        CreateCategoryRequest {
            name: "Woodwork".into(),
            description: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    category_service::create_category(
        &state,
        &auth_admin,
        CreateCategoryRequest {
            name: "Woodwork".into(),
            description: None,
        },
    )
    .await?;
    let err = category_service::create_category(
        &state,
        &auth_admin,
        CreateCategoryRequest {
            name: "Woodwork".into(),
            description: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Two first-ever mutations for a fresh customer settle into one cart
    // row, and neither request fails.
    let racer_id = create_user(&state, "user", "racer@example.com").await?;
    let auth_racer = AuthUser {
        user_id: racer_id,
        role: "user".into(),
    };
    let (first, second) = tokio::join!(
        cart_service::add_item(
            &state,
            &auth_racer,
            AddCartItemRequest {
                product_id: mug.id,
                quantity: 2,
            },
        ),
        cart_service::add_item(
            &state,
            &auth_racer,
            AddCartItemRequest {
                product_id: towel.id,
                quantity: 1,
            },
        ),
    );
    first?;
    second?;

    let racer_carts = Carts::find()
        .filter(CartCol::CustomerId.eq(racer_id))
        .all(&state.orm)
        .await?;
    assert_eq!(racer_carts.len(), 1);

    let resp = cart_service::get_cart(&state, &auth_racer).await?;
    let view = resp.data.unwrap();
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total, dec!(23.48));

    // Cart mutations leave an audit trail.
    let audits: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM audit_logs WHERE action LIKE 'cart_%'")
            .fetch_one(&state.pool)
            .await?;
    assert!(audits.0 >= 4, "expected cart audit rows, got {}", audits.0);

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url, 5).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let orm = create_orm_conn(database_url).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE cart_items, carts, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState { pool, orm })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}
