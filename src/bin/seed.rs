use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use table_order_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "Admin", "admin@example.com", "admin123", "admin").await?;
    let staff_id = ensure_user(&pool, "Staff", "staff@example.com", "staff123", "staff").await?;
    seed_menu(&pool).await?;
    seed_tables(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, Staff ID: {staff_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
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
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_menu(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let categories = vec![("Starters", 1), ("Mains", 2), ("Drinks", 3)];

    for (name, display_order) in &categories {
        sqlx::query(
            r#"
            INSERT INTO menu_categories (id, name, display_order)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (SELECT 1 FROM menu_categories WHERE name = $2)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(display_order)
        .execute(pool)
        .await?;
    }

    let items = vec![
        ("Spring Rolls", "Crispy vegetable rolls", 450_i64, "Starters"),
        ("Tomato Soup", "With basil and croutons", 550, "Starters"),
        ("Margherita Pizza", "Tomato, mozzarella, basil", 1200, "Mains"),
        ("Pad Thai", "Rice noodles, peanuts, lime", 1350, "Mains"),
        ("Lemonade", "Freshly squeezed", 350, "Drinks"),
        ("Espresso", "Double shot", 300, "Drinks"),
    ];

    for (name, desc, price, category) in items {
        sqlx::query(
            r#"
            INSERT INTO menu_items (id, name, description, price, category_id)
            SELECT $1, $2, $3, $4, c.id FROM menu_categories c
            WHERE c.name = $5
              AND NOT EXISTS (SELECT 1 FROM menu_items WHERE name = $2)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(category)
        .execute(pool)
        .await?;
    }

    println!("Seeded menu");
    Ok(())
}

async fn seed_tables(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    for number in 1..=8 {
        let slug = Uuid::new_v4().simple().to_string();
        sqlx::query(
            r#"
            INSERT INTO tables (id, number, qr_slug)
            VALUES ($1, $2, $3)
            ON CONFLICT (number) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(number)
        .bind(&slug[..10])
        .execute(pool)
        .await?;
    }

    println!("Seeded tables");
    Ok(())
}
