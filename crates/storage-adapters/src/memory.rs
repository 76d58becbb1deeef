//! # In-memory ledger
//!
//! `LedgerStore` + `AccountRepo` over a single `RwLock`. Every mutation holds
//! the write lock for its whole duration and checks all preconditions before
//! touching any row, so a rejected operation leaves no trace.
//!
//! Used by tests and by the binary when no database is configured.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AccountRepo, Donation, DonationError, DonationReceipt, DonationRequest, DomainError,
    LedgerEntry, LedgerStore, NewPromoCode, Note, PaymentMethod, PromoCode, PromoError,
    PromoGrant, PromoRedemption, Purchase, PurchaseError, PurchaseReceipt, PurchaseRequest,
    Result, TopUpReceipt, TopUpRequest, TransactionKind, UserAccount,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    users: HashMap<Uuid, UserAccount>,
    notes: HashMap<Uuid, Note>,
    purchases: Vec<Purchase>,
    /// Append-only, oldest first.
    entries: Vec<LedgerEntry>,
    /// Keyed by normalised code.
    promo_codes: HashMap<String, PromoCode>,
    redeemed: HashSet<(Uuid, Uuid)>,
    redemptions: Vec<PromoRedemption>,
    donations: Vec<Donation>,
}

impl LedgerState {
    fn user(&self, id: Uuid) -> Result<&UserAccount> {
        self.users.get(&id).ok_or_else(|| DomainError::not_found("User", id))
    }

    fn user_mut(&mut self, id: Uuid) -> Result<&mut UserAccount> {
        self.users.get_mut(&id).ok_or_else(|| DomainError::not_found("User", id))
    }

    fn owns(&self, buyer_id: Uuid, note_id: Uuid) -> bool {
        self.purchases
            .iter()
            .any(|p| p.buyer_id == buyer_id && p.note_id == note_id)
    }
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserAccount) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn insert_note(&self, note: Note) {
        self.state.write().await.notes.insert(note.id, note);
    }

    pub async fn insert_promo_code(&self, promo: PromoCode) {
        self.state.write().await.promo_codes.insert(promo.code.clone(), promo);
    }

    pub async fn donations(&self) -> Vec<Donation> {
        self.state.read().await.donations.clone()
    }

    pub async fn redemptions(&self) -> Vec<PromoRedemption> {
        self.state.read().await.redemptions.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn purchase_note(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt> {
        let mut state = self.state.write().await;
        let quote = &request.quote;

        let note = state
            .notes
            .get(&request.note_id)
            .filter(|n| n.is_published)
            .cloned()
            .ok_or(PurchaseError::NoteNotFound)?;
        if state.owns(request.buyer_id, note.id) {
            return Err(PurchaseError::AlreadyPurchased.into());
        }
        if note.is_exclusive && note.is_sold {
            return Err(PurchaseError::ExclusiveAlreadySold.into());
        }
        let points_deducted = match quote.method {
            PaymentMethod::Points => quote.points_cost,
            PaymentMethod::Dollars => 0,
        };
        if state.user(request.buyer_id)?.points_balance < points_deducted {
            return Err(PurchaseError::InsufficientPoints.into());
        }
        state.user(note.owner_id)?;

        // All checks passed; nothing below can fail.
        let buyer = state.user_mut(request.buyer_id)?;
        buyer.points_balance -= points_deducted;
        let new_points_balance = buyer.points_balance;
        state.user_mut(note.owner_id)?.dollar_balance += quote.dollar_price;

        state.entries.push(
            LedgerEntry::new(
                request.buyer_id,
                TransactionKind::bought_with(quote.method),
                quote.amount_charged,
                points_deducted,
            )
            .for_note(note.id),
        );
        state.entries.push(
            LedgerEntry::new(note.owner_id, TransactionKind::NoteSale, quote.dollar_price, 0)
                .for_note(note.id),
        );

        let purchase = Purchase {
            id: Uuid::new_v4(),
            buyer_id: request.buyer_id,
            note_id: note.id,
            price_paid: quote.amount_charged,
            payment_method: quote.method,
            created_at: Utc::now(),
        };
        let purchase_id = purchase.id;
        state.purchases.push(purchase);

        if note.is_exclusive {
            if let Some(stored) = state.notes.get_mut(&note.id) {
                stored.is_sold = true;
            }
        }

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
        let mut state = self.state.write().await;

        let promo = state.promo_codes.get(code).cloned().ok_or(PromoError::InvalidCode)?;
        if !promo.is_active {
            return Err(PromoError::Inactive.into());
        }
        if promo.is_expired_at(now) {
            return Err(PromoError::Expired.into());
        }
        if promo.is_exhausted() {
            return Err(PromoError::UsageCapReached.into());
        }
        if state.redeemed.contains(&(promo.id, user_id)) {
            return Err(PromoError::AlreadyRedeemed.into());
        }
        state.user(user_id)?;

        state.redeemed.insert((promo.id, user_id));
        state.redemptions.push(PromoRedemption {
            id: Uuid::new_v4(),
            promo_code_id: promo.id,
            user_id,
            redeemed_at: now,
        });
        let user = state.user_mut(user_id)?;
        user.points_balance += promo.points_amount;
        let new_points_balance = user.points_balance;
        if let Some(stored) = state.promo_codes.get_mut(code) {
            stored.current_uses += 1;
        }
        state.entries.push(
            LedgerEntry::new(user_id, TransactionKind::PromoCodeRedemption, Decimal::ZERO, promo.points_amount)
                .described(format!("promo code {}", promo.code)),
        );

        Ok(PromoGrant {
            promo_code_id: promo.id,
            code: promo.code,
            points_received: promo.points_amount,
            new_points_balance,
        })
    }

    async fn donate(&self, request: &DonationRequest) -> Result<DonationReceipt> {
        let mut state = self.state.write().await;
        let split = request.split;
        if split.gross <= 0 || split.net <= 0 {
            return Err(DonationError::InvalidAmount.into());
        }

        let note = state
            .notes
            .get(&request.note_id)
            .filter(|n| n.is_published)
            .cloned()
            .ok_or(DonationError::NoteNotFound)?;
        if !note.is_free() {
            return Err(DonationError::NotFree.into());
        }
        if request.donor_id == request.recipient_id || request.donor_id == note.owner_id {
            return Err(DonationError::SelfDonation.into());
        }
        if state.user(request.donor_id)?.points_balance < split.gross {
            return Err(DonationError::InsufficientPoints.into());
        }
        state.user(request.recipient_id)?;

        let donor = state.user_mut(request.donor_id)?;
        donor.points_balance -= split.gross;
        let new_points_balance = donor.points_balance;
        state.user_mut(request.recipient_id)?.points_balance += split.net;

        let donation = Donation {
            id: Uuid::new_v4(),
            donor_id: request.donor_id,
            recipient_id: request.recipient_id,
            note_id: note.id,
            points_amount: split.gross,
            points_received: split.net,
            message: request.message.clone(),
            created_at: Utc::now(),
        };
        let donation_id = donation.id;
        state.donations.push(donation);

        state.entries.extend([
            LedgerEntry::new(request.donor_id, TransactionKind::DonationSent, Decimal::ZERO, split.gross)
                .for_note(note.id),
            LedgerEntry::new(request.recipient_id, TransactionKind::DonationReceived, Decimal::ZERO, split.net)
                .for_note(note.id),
            LedgerEntry::new(request.recipient_id, TransactionKind::DonationFee, Decimal::ZERO, split.fee)
                .for_note(note.id)
                .described("platform fee withheld"),
        ]);

        Ok(DonationReceipt {
            donation_id,
            new_points_balance,
            points_sent: split.gross,
            points_received: split.net,
        })
    }

    async fn top_up_points(&self, request: &TopUpRequest) -> Result<TopUpReceipt> {
        let mut state = self.state.write().await;
        let package = &request.package;

        let user = state.user_mut(request.user_id)?;
        user.points_balance += package.points;
        let new_points_balance = user.points_balance;
        state.entries.push(
            LedgerEntry::new(request.user_id, TransactionKind::PointsPurchase, package.price, package.points)
                .described(format!("points package {}", package.id)),
        );

        Ok(TopUpReceipt {
            new_points_balance,
            points_added: package.points,
            amount_paid: package.price,
        })
    }

    async fn create_promo_code(&self, promo: &NewPromoCode) -> Result<PromoCode> {
        let mut state = self.state.write().await;
        if state.promo_codes.contains_key(&promo.code) {
            return Err(DomainError::Conflict(format!("promo code {} already exists", promo.code)));
        }
        let created = PromoCode {
            id: Uuid::new_v4(),
            code: promo.code.clone(),
            points_amount: promo.points_amount,
            expires_at: promo.expires_at,
            max_uses: promo.max_uses,
            current_uses: 0,
            is_active: true,
            created_at: Utc::now(),
        };
        state.promo_codes.insert(created.code.clone(), created.clone());
        Ok(created)
    }
}

#[async_trait]
impl AccountRepo for MemoryLedgerStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_note(&self, id: Uuid) -> Result<Option<Note>> {
        Ok(self.state.read().await.notes.get(&id).cloned())
    }

    async fn find_purchase(&self, buyer_id: Uuid, note_id: Uuid) -> Result<Option<Purchase>> {
        let state = self.state.read().await;
        Ok(state
            .purchases
            .iter()
            .find(|p| p.buyer_id == buyer_id && p.note_id == note_id)
            .cloned())
    }

    async fn list_purchases(&self, buyer_id: Uuid) -> Result<Vec<Purchase>> {
        let state = self.state.read().await;
        Ok(state
            .purchases
            .iter()
            .rev()
            .filter(|p| p.buyer_id == buyer_id)
            .cloned()
            .collect())
    }

    async fn list_entries(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>> {
        Ok(self.state.read().await.promo_codes.get(code).cloned())
    }
}
