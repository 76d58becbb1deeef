//! # notemart
//!
//! Assembles the ledger service from compile-time features and runtime
//! configuration, then serves the HTTP API.

#[cfg(not(feature = "web-axum"))]
compile_error!("notemart serves over HTTP; enable the `web-axum` feature");

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_adapters::{build_router, AppState};
use configs::{DatabaseSettings, LogFormat, LogSettings, PricingSettings, Settings};
use domains::{AccountRepo, IdentityProvider, LedgerStore, PointsPackage, PricingPolicy, RateLimiter, SystemClock};
use rust_decimal::Decimal;
use services::LedgerServices;
use storage_adapters::{MemoryLedgerStore, MemoryRateLimiter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use secrecy::SecretString;

#[cfg(any(feature = "db-postgres", feature = "redis"))]
use secrecy::ExposeSecret;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings.log);

    let pricing = pricing_policy(&settings.pricing)?;
    let (store, accounts) = ledger_store(&settings).await?;
    let limiter = rate_limiter(&settings)?;
    let identity = identity_provider(&settings)?;

    let services = LedgerServices::new(store, accounts, Arc::new(SystemClock), pricing);
    let state = AppState::new(services, identity, limiter)
        .with_trusted_proxies(settings.rate_limit.trusted_proxies.clone());
    let app = build_router(state);

    let addr = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "notemart listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("notemart stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn pricing_policy(settings: &PricingSettings) -> anyhow::Result<PricingPolicy> {
    let packages = if settings.packages.is_empty() {
        PricingPolicy::default().packages
    } else {
        settings
            .packages
            .iter()
            .map(|p| PointsPackage {
                id: p.id.clone(),
                points: p.points,
                price: Decimal::new(p.price_cents, 2),
            })
            .collect()
    };
    let policy = PricingPolicy {
        points_per_dollar: settings.points_per_dollar,
        points_discount_percent: settings.points_discount_percent,
        donation_fee_percent: settings.donation_fee_percent,
        donation_presets: settings.donation_presets.clone(),
        packages,
    };
    policy.validate().context("pricing configuration")?;
    Ok(policy)
}

type Ledger = (Arc<dyn LedgerStore>, Arc<dyn AccountRepo>);

async fn ledger_store(settings: &Settings) -> anyhow::Result<Ledger> {
    let Some(url) = settings.database.url.as_ref() else {
        warn!("no database.url configured, using the in-memory ledger");
        let store = Arc::new(MemoryLedgerStore::new());
        let ledger: Arc<dyn LedgerStore> = store.clone();
        let accounts: Arc<dyn AccountRepo> = store;
        return Ok((ledger, accounts));
    };
    postgres_store(url, &settings.database).await
}

#[cfg(feature = "db-postgres")]
async fn postgres_store(url: &SecretString, database: &DatabaseSettings) -> anyhow::Result<Ledger> {
    let store = storage_adapters::PgLedgerStore::connect(url.expose_secret(), database.max_connections)
        .await
        .context("connecting to postgres")?;
    if database.run_migrations {
        store.migrate().await.context("running migrations")?;
        info!("database migrations applied");
    }
    let store = Arc::new(store);
    let ledger: Arc<dyn LedgerStore> = store.clone();
    let accounts: Arc<dyn AccountRepo> = store;
    Ok((ledger, accounts))
}

#[cfg(not(feature = "db-postgres"))]
async fn postgres_store(_url: &SecretString, _database: &DatabaseSettings) -> anyhow::Result<Ledger> {
    anyhow::bail!("database.url is set but notemart was built without `db-postgres`")
}

fn rate_limiter(settings: &Settings) -> anyhow::Result<Arc<dyn RateLimiter>> {
    let limits = &settings.rate_limit;

    #[cfg(feature = "redis")]
    if let Some(redis) = settings.redis.as_ref() {
        let limiter = storage_adapters::RedisRateLimiter::connect(
            redis.url.expose_secret(),
            limits.max_requests,
            limits.window_secs,
        )
        .context("creating redis pool")?;
        info!("rate limiting through redis");
        return Ok(Arc::new(limiter));
    }

    #[cfg(not(feature = "redis"))]
    if settings.redis.is_some() {
        warn!("redis.url is set but notemart was built without `redis`; limiting per node");
    }

    let limiter = Arc::new(MemoryRateLimiter::new(
        limits.max_requests,
        Duration::from_secs(limits.window_secs),
    ));
    let purger = Arc::clone(&limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = purger.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired rate-limit windows dropped");
            }
        }
    });
    let limiter: Arc<dyn RateLimiter> = limiter;
    Ok(limiter)
}

#[cfg(feature = "auth-jwt")]
fn identity_provider(settings: &Settings) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    Ok(Arc::new(auth_adapters::JwtIdentityProvider::new(
        &settings.auth.jwt_secret,
        settings.auth.token_ttl_secs,
    )))
}

#[cfg(not(feature = "auth-jwt"))]
fn identity_provider(_settings: &Settings) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    anyhow::bail!("notemart was built without an identity provider; enable `auth-jwt`")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
