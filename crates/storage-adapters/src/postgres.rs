//! # PostgreSQL ledger
//!
//! Every `LedgerStore` method runs inside one `sqlx` transaction. Balance
//! debits are conditional updates (`WHERE points_balance >= $n`), the note row
//! is locked with `FOR UPDATE` before the exclusive check, and the unique
//! constraints on `purchases` and `promo_redemptions` back up the explicit
//! ownership checks. Both users of a transfer are locked in id order.
//! Returning early drops the transaction, which rolls it back.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AccountRepo, DonationError, DonationReceipt, DonationRequest, DomainError, LedgerEntry,
    LedgerStore, NewPromoCode, Note, PaymentMethod, PromoCode, PromoError, PromoGrant, Purchase,
    PurchaseError, PurchaseReceipt, PurchaseRequest, Result, TopUpReceipt, TopUpRequest,
    TransactionKind, UserAccount,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

const PURCHASE_UNIQUE: &str = "purchases_buyer_note_key";
const REDEMPTION_UNIQUE: &str = "promo_redemptions_code_user_key";
const PROMO_CODE_UNIQUE: &str = "promo_codes_code_key";

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    points_balance: i64,
    dollar_balance: Decimal,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            points_balance: row.points_balance,
            dollar_balance: row.dollar_balance,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct NoteRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    price: Decimal,
    is_exclusive: bool,
    is_sold: bool,
    is_published: bool,
    created_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            price: row.price,
            is_exclusive: row.is_exclusive,
            is_sold: row.is_sold,
            is_published: row.is_published,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct PurchaseRow {
    id: Uuid,
    buyer_id: Uuid,
    note_id: Uuid,
    price_paid: Decimal,
    payment_method: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = DomainError;

    fn try_from(row: PurchaseRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            buyer_id: row.buyer_id,
            note_id: row.note_id,
            price_paid: row.price_paid,
            payment_method: PaymentMethod::from_str(&row.payment_method).map_err(DomainError::Internal)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct EntryRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    amount: Decimal,
    points_amount: i64,
    note_id: Option<Uuid>,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: EntryRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            kind: TransactionKind::from_str(&row.kind).map_err(DomainError::Internal)?,
            amount: row.amount,
            points_amount: row.points_amount,
            note_id: row.note_id,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PromoRow {
    id: Uuid,
    code: String,
    points_amount: i64,
    expires_at: Option<DateTime<Utc>>,
    max_uses: Option<i32>,
    current_uses: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<PromoRow> for PromoCode {
    fn from(row: PromoRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            points_amount: row.points_amount,
            expires_at: row.expires_at,
            max_uses: row.max_uses,
            current_uses: row.current_uses,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

const NOTE_COLUMNS: &str =
    "id, owner_id, title, price, is_exclusive, is_sold, is_published, created_at";
const PROMO_COLUMNS: &str =
    "id, code, points_amount, expires_at, max_uses, current_uses, is_active, created_at";

// ── Error mapping ────────────────────────────────────────────────────────────

/// Logs the driver error and hides its detail from callers.
fn store_error(err: sqlx::Error) -> DomainError {
    tracing::error!(error = %err, "postgres ledger query failed");
    DomainError::internal(err)
}

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation() && db.constraint() == Some(constraint))
}

// ── Shared statements ────────────────────────────────────────────────────────

async fn insert_entry(conn: &mut PgConnection, entry: &LedgerEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO transactions (id, user_id, kind, amount, points_amount, note_id, description, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(entry.id)
    .bind(entry.user_id)
    .bind(entry.kind.as_str())
    .bind(entry.amount)
    .bind(entry.points_amount)
    .bind(entry.note_id)
    .bind(&entry.description)
    .bind(entry.created_at)
    .execute(conn)
    .await
    .map_err(store_error)?;
    Ok(())
}

/// Compare-and-swap debit: succeeds only if the balance still covers `points`
/// at write time. `None` means the condition failed or the user is missing.
async fn debit_points(conn: &mut PgConnection, user_id: Uuid, points: i64) -> Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE users SET points_balance = points_balance - $2 \
         WHERE id = $1 AND points_balance >= $2 RETURNING points_balance",
    )
    .bind(user_id)
    .bind(points)
    .fetch_optional(conn)
    .await
    .map_err(store_error)
}

async fn credit_points(conn: &mut PgConnection, user_id: Uuid, points: i64) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE users SET points_balance = points_balance + $2 WHERE id = $1 RETURNING points_balance",
    )
    .bind(user_id)
    .bind(points)
    .fetch_optional(conn)
    .await
    .map_err(store_error)?
    .ok_or_else(|| DomainError::not_found("User", user_id))
}

/// Locks both sides of a transfer in id order so opposite transfers between
/// the same pair of users cannot deadlock.
async fn lock_users(conn: &mut PgConnection, a: Uuid, b: Uuid) -> Result<()> {
    sqlx::query("SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(vec![a, b])
        .fetch_all(conn)
        .await
        .map_err(store_error)?;
    Ok(())
}

async fn user_exists(conn: &mut PgConnection, user_id: Uuid) -> Result<bool> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(conn)
        .await
        .map_err(store_error)
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn purchase_note(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt> {
        let quote = &request.quote;
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Concurrent buyers of the same note queue on this lock.
        let note: Note = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 FOR UPDATE"
        ))
        .bind(request.note_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?
        .filter(|row| row.is_published)
        .ok_or(PurchaseError::NoteNotFound)?
        .into();

        let owned = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM purchases WHERE buyer_id = $1 AND note_id = $2)",
        )
        .bind(request.buyer_id)
        .bind(note.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;
        if owned {
            return Err(PurchaseError::AlreadyPurchased.into());
        }
        if note.is_exclusive && note.is_sold {
            return Err(PurchaseError::ExclusiveAlreadySold.into());
        }

        let points_deducted = match quote.method {
            PaymentMethod::Points => quote.points_cost,
            PaymentMethod::Dollars => 0,
        };
        lock_users(&mut tx, request.buyer_id, note.owner_id).await?;
        let new_points_balance = match debit_points(&mut tx, request.buyer_id, points_deducted).await? {
            Some(balance) => balance,
            None if user_exists(&mut tx, request.buyer_id).await? => {
                return Err(PurchaseError::InsufficientPoints.into())
            }
            None => return Err(DomainError::not_found("User", request.buyer_id)),
        };

        // Sellers are credited the list price, whatever the buyer paid.
        let credited = sqlx::query("UPDATE users SET dollar_balance = dollar_balance + $2 WHERE id = $1")
            .bind(note.owner_id)
            .bind(quote.dollar_price)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        if credited.rows_affected() != 1 {
            return Err(DomainError::Internal(format!("seller {} has no account", note.owner_id)));
        }

        let bought = LedgerEntry::new(
            request.buyer_id,
            TransactionKind::bought_with(quote.method),
            quote.amount_charged,
            points_deducted,
        )
        .for_note(note.id);
        insert_entry(&mut tx, &bought).await?;
        let sale = LedgerEntry::new(note.owner_id, TransactionKind::NoteSale, quote.dollar_price, 0)
            .for_note(note.id);
        insert_entry(&mut tx, &sale).await?;

        let purchase_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO purchases (id, buyer_id, note_id, price_paid, payment_method) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(purchase_id)
        .bind(request.buyer_id)
        .bind(note.id)
        .bind(quote.amount_charged)
        .bind(quote.method.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if violates(&err, PURCHASE_UNIQUE) {
                DomainError::from(PurchaseError::AlreadyPurchased)
            } else {
                store_error(err)
            }
        })?;

        if note.is_exclusive {
            let flipped = sqlx::query("UPDATE notes SET is_sold = TRUE WHERE id = $1 AND is_sold = FALSE")
                .bind(note.id)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
            if flipped.rows_affected() != 1 {
                return Err(PurchaseError::ExclusiveAlreadySold.into());
            }
        }

        tx.commit().await.map_err(store_error)?;

        Ok(PurchaseReceipt {
            purchase_id,
            note_id: note.id,
            new_points_balance,
            payment_method: quote.method,
            amount_charged: quote.amount_charged,
            points_deducted,
            is_exclusive: note.is_exclusive,
        })
    }

    async fn redeem_promo_code(&self, code: &str, user_id: Uuid, now: DateTime<Utc>) -> Result<PromoGrant> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Locking the code row serialises the usage counter.
        let promo: PromoCode = sqlx::query_as::<_, PromoRow>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?
        .ok_or(PromoError::InvalidCode)?
        .into();

        if !promo.is_active {
            return Err(PromoError::Inactive.into());
        }
        if promo.is_expired_at(now) {
            return Err(PromoError::Expired.into());
        }
        if promo.is_exhausted() {
            return Err(PromoError::UsageCapReached.into());
        }
        if !user_exists(&mut tx, user_id).await? {
            return Err(DomainError::not_found("User", user_id));
        }

        sqlx::query("INSERT INTO promo_redemptions (id, promo_code_id, user_id, redeemed_at) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(promo.id)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if violates(&err, REDEMPTION_UNIQUE) {
                    DomainError::from(PromoError::AlreadyRedeemed)
                } else {
                    store_error(err)
                }
            })?;

        let new_points_balance = credit_points(&mut tx, user_id, promo.points_amount).await?;

        sqlx::query("UPDATE promo_codes SET current_uses = current_uses + 1 WHERE id = $1")
            .bind(promo.id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        let entry = LedgerEntry::new(user_id, TransactionKind::PromoCodeRedemption, Decimal::ZERO, promo.points_amount)
            .described(format!("promo code {}", promo.code));
        insert_entry(&mut tx, &entry).await?;

        tx.commit().await.map_err(store_error)?;

        Ok(PromoGrant {
            promo_code_id: promo.id,
            code: promo.code,
            points_received: promo.points_amount,
            new_points_balance,
        })
    }

    async fn donate(&self, request: &DonationRequest) -> Result<DonationReceipt> {
        let split = request.split;
        if split.gross <= 0 || split.net <= 0 {
            return Err(DonationError::InvalidAmount.into());
        }
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let note: Note = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 FOR SHARE"
        ))
        .bind(request.note_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?
        .filter(|row| row.is_published)
        .ok_or(DonationError::NoteNotFound)?
        .into();
        if !note.is_free() {
            return Err(DonationError::NotFree.into());
        }
        if request.donor_id == request.recipient_id || request.donor_id == note.owner_id {
            return Err(DonationError::SelfDonation.into());
        }

        lock_users(&mut tx, request.donor_id, request.recipient_id).await?;
        let new_points_balance = match debit_points(&mut tx, request.donor_id, split.gross).await? {
            Some(balance) => balance,
            None if user_exists(&mut tx, request.donor_id).await? => {
                return Err(DonationError::InsufficientPoints.into())
            }
            None => return Err(DomainError::not_found("User", request.donor_id)),
        };
        credit_points(&mut tx, request.recipient_id, split.net).await?;

        let donation_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO donations (id, donor_id, recipient_id, note_id, points_amount, points_received, message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(donation_id)
        .bind(request.donor_id)
        .bind(request.recipient_id)
        .bind(note.id)
        .bind(split.gross)
        .bind(split.net)
        .bind(&request.message)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        let entries = [
            LedgerEntry::new(request.donor_id, TransactionKind::DonationSent, Decimal::ZERO, split.gross),
            LedgerEntry::new(request.recipient_id, TransactionKind::DonationReceived, Decimal::ZERO, split.net),
            LedgerEntry::new(request.recipient_id, TransactionKind::DonationFee, Decimal::ZERO, split.fee)
                .described("platform fee withheld"),
        ];
        for entry in entries {
            insert_entry(&mut tx, &entry.for_note(note.id)).await?;
        }

        tx.commit().await.map_err(store_error)?;

        Ok(DonationReceipt {
            donation_id,
            new_points_balance,
            points_sent: split.gross,
            points_received: split.net,
        })
    }

    async fn top_up_points(&self, request: &TopUpRequest) -> Result<TopUpReceipt> {
        let package = &request.package;
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let new_points_balance = credit_points(&mut tx, request.user_id, package.points).await?;
        let entry = LedgerEntry::new(request.user_id, TransactionKind::PointsPurchase, package.price, package.points)
            .described(format!("points package {}", package.id));
        insert_entry(&mut tx, &entry).await?;

        tx.commit().await.map_err(store_error)?;

        Ok(TopUpReceipt {
            new_points_balance,
            points_added: package.points,
            amount_paid: package.price,
        })
    }

    async fn create_promo_code(&self, promo: &NewPromoCode) -> Result<PromoCode> {
        sqlx::query_as::<_, PromoRow>(&format!(
            "INSERT INTO promo_codes (id, code, points_amount, expires_at, max_uses) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PROMO_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&promo.code)
        .bind(promo.points_amount)
        .bind(promo.expires_at)
        .bind(promo.max_uses)
        .fetch_one(&self.pool)
        .await
        .map(PromoCode::from)
        .map_err(|err| {
            if violates(&err, PROMO_CODE_UNIQUE) {
                DomainError::Conflict(format!("promo code {} already exists", promo.code))
            } else {
                store_error(err)
            }
        })
    }
}

#[async_trait]
impl AccountRepo for PgLedgerStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, points_balance, dollar_balance, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.map(UserAccount::from))
    }

    async fn find_note(&self, id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(Note::from))
    }

    async fn find_purchase(&self, buyer_id: Uuid, note_id: Uuid) -> Result<Option<Purchase>> {
        sqlx::query_as::<_, PurchaseRow>(
            "SELECT id, buyer_id, note_id, price_paid, payment_method, created_at \
             FROM purchases WHERE buyer_id = $1 AND note_id = $2",
        )
        .bind(buyer_id)
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .map(Purchase::try_from)
        .transpose()
    }

    async fn list_purchases(&self, buyer_id: Uuid) -> Result<Vec<Purchase>> {
        sqlx::query_as::<_, PurchaseRow>(
            "SELECT id, buyer_id, note_id, price_paid, payment_method, created_at \
             FROM purchases WHERE buyer_id = $1 ORDER BY created_at DESC",
        )
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?
        .into_iter()
        .map(Purchase::try_from)
        .collect()
    }

    async fn list_entries(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>> {
        sqlx::query_as::<_, EntryRow>(
            "SELECT id, user_id, kind, amount, points_amount, note_id, description, created_at \
             FROM transactions WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?
        .into_iter()
        .map(LedgerEntry::try_from)
        .collect()
    }

    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>> {
        let row = sqlx::query_as::<_, PromoRow>(&format!("SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(PromoCode::from))
    }
}
