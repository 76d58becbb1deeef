//! Seeds a development database with demo accounts, notes and promo codes,
//! then prints bearer tokens for each account.
//!
//! Safe to re-run: every row has a fixed id and inserts skip existing rows.

use anyhow::Context;
use auth_adapters::JwtIdentityProvider;
use chrono::{Duration, Utc};
use configs::Settings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use storage_adapters::PgLedgerStore;
use uuid::Uuid;

struct DemoUser {
    id: Uuid,
    username: &'static str,
    points: i64,
    admin: bool,
}

const USERS: &[DemoUser] = &[
    DemoUser { id: Uuid::from_u128(0x0001), username: "maya", points: 0, admin: false },
    DemoUser { id: Uuid::from_u128(0x0002), username: "alice", points: 2_000, admin: false },
    DemoUser { id: Uuid::from_u128(0x0003), username: "bruno", points: 120, admin: false },
    DemoUser { id: Uuid::from_u128(0x0004), username: "admin", points: 0, admin: true },
];

struct DemoNote {
    id: Uuid,
    title: &'static str,
    price: Decimal,
    exclusive: bool,
}

const NOTES: &[DemoNote] = &[
    DemoNote { id: Uuid::from_u128(0x1001), title: "Intro to Microeconomics cheat sheet", price: dec!(0.00), exclusive: false },
    DemoNote { id: Uuid::from_u128(0x1002), title: "Organic Chemistry II full notes", price: dec!(10.00), exclusive: false },
    DemoNote { id: Uuid::from_u128(0x1003), title: "Distributed Systems final review", price: dec!(25.00), exclusive: true },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    let url = settings
        .database
        .url
        .as_ref()
        .context("database.url must be set to seed (NOTEMART__DATABASE__URL)")?;

    let store = PgLedgerStore::connect(url.expose_secret(), 2).await?;
    store.migrate().await?;
    let pool = store.pool();

    seed_users(pool).await?;
    seed_notes(pool, USERS[0].id).await?;
    seed_promo_codes(pool).await?;
    println!("seeded {} users, {} notes, 2 promo codes", USERS.len(), NOTES.len());

    let auth = JwtIdentityProvider::new(&settings.auth.jwt_secret, settings.auth.token_ttl_secs);
    println!("\ndevelopment tokens:");
    for user in USERS {
        let token = auth.issue(user.id, user.admin)?;
        println!("  {:<6} {}  {token}", user.username, user.id);
    }
    Ok(())
}

async fn seed_users(pool: &PgPool) -> anyhow::Result<()> {
    for user in USERS {
        sqlx::query(
            "INSERT INTO users (id, username, email, points_balance, dollar_balance)
             VALUES ($1, $2, $3, $4, 0)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user.id)
        .bind(user.username)
        .bind(format!("{}@notemart.test", user.username))
        .bind(user.points)
        .execute(pool)
        .await
        .with_context(|| format!("inserting user {}", user.username))?;
    }
    Ok(())
}

async fn seed_notes(pool: &PgPool, owner_id: Uuid) -> anyhow::Result<()> {
    for note in NOTES {
        sqlx::query(
            "INSERT INTO notes (id, owner_id, title, price, is_exclusive, is_published)
             VALUES ($1, $2, $3, $4, $5, TRUE)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(note.id)
        .bind(owner_id)
        .bind(note.title)
        .bind(note.price)
        .bind(note.exclusive)
        .execute(pool)
        .await
        .with_context(|| format!("inserting note {}", note.title))?;
    }
    Ok(())
}

async fn seed_promo_codes(pool: &PgPool) -> anyhow::Result<()> {
    let codes = [
        (Uuid::from_u128(0x2001), "WELCOME100", 100_i64, None, None),
        (Uuid::from_u128(0x2002), "LAUNCH500", 500, Some(Utc::now() + Duration::days(30)), Some(100_i32)),
    ];
    for (id, code, points, expires_at, max_uses) in codes {
        sqlx::query(
            "INSERT INTO promo_codes (id, code, points_amount, expires_at, max_uses)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(code)
        .bind(points)
        .bind(expires_at)
        .bind(max_uses)
        .execute(pool)
        .await
        .with_context(|| format!("inserting promo code {code}"))?;
    }
    Ok(())
}
