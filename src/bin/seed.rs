use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_marketplace_api::{config::AppConfig, db::create_pool};
use rust_decimal::{Decimal, dec};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_admin(&pool, "admin@example.com", "admin123").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user123").await?;
    seed_categories(&pool).await?;
    seed_products(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_admin(pool: &sqlx::PgPool, email: &str, password: &str) -> anyhow::Result<Uuid> {
    ensure_user_with_role(pool, email, password, "admin").await
}

async fn ensure_user(pool: &sqlx::PgPool, email: &str, password: &str) -> anyhow::Result<Uuid> {
    ensure_user_with_role(pool, email, password, "user").await
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // Fall back to a plain lookup if the upsert returned nothing.
    let user_id = if let Some((id,)) = row {
        id
    } else {
        let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(pool)
            .await?;
        id
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_categories(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let categories = vec![
        ("Ceramics", "Handmade pottery and tableware"),
        ("Woodwork", "Carved and turned wooden goods"),
        ("Textiles", "Woven, knitted and printed fabric"),
        ("Jewelry", "Handcrafted rings, necklaces and pins"),
    ];

    for (name, desc) in categories {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .execute(pool)
        .await?;
    }

    println!("Seeded categories");
    Ok(())
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products: Vec<(&str, &str, &str, Decimal, i32)> = vec![
        (
            "Glazed Stoneware Mug",
            "Wheel-thrown mug with a speckled glaze",
            "Ceramics",
            dec!(18.50),
            40,
        ),
        (
            "Stoneware Serving Bowl",
            "Large bowl, food safe glaze",
            "Ceramics",
            dec!(42.00),
            15,
        ),
        (
            "Walnut Serving Board",
            "End-grain board, oil finished",
            "Woodwork",
            dec!(65.00),
            12,
        ),
        (
            "Oak Bookends",
            "Pair of solid oak bookends",
            "Woodwork",
            dec!(38.00),
            20,
        ),
        (
            "Linen Tea Towel",
            "Stonewashed linen, set of two",
            "Textiles",
            dec!(24.00),
            60,
        ),
        (
            "Wool Throw Blanket",
            "Lambswool, woven in small batches",
            "Textiles",
            dec!(89.00),
            10,
        ),
        (
            "Silver Leaf Pendant",
            "Hand-cut sterling silver",
            "Jewelry",
            dec!(54.00),
            25,
        ),
    ];

    for (name, desc, category, price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, category_id, name, description, price, stock)
            VALUES ($1, (SELECT id FROM categories WHERE name = $2), $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category)
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
