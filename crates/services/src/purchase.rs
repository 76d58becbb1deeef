//! Note purchases, paid with points or (mock) dollars.

use std::sync::Arc;

use domains::{
    AccountRepo, DomainError, LedgerStore, Note, PaymentMethod, PricingPolicy, PurchaseError,
    PurchaseReceipt, PurchaseRequest, Quote, Result,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::log_failure;

#[derive(Clone)]
pub struct PurchaseService {
    store: Arc<dyn LedgerStore>,
    accounts: Arc<dyn AccountRepo>,
    pricing: Arc<PricingPolicy>,
}

impl PurchaseService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: Arc<dyn AccountRepo>,
        pricing: Arc<PricingPolicy>,
    ) -> Self {
        Self { store, accounts, pricing }
    }

    /// Price preview for the checkout screen. Touches nothing.
    pub async fn quote(&self, note_id: Uuid, method: PaymentMethod) -> Result<Quote> {
        let note = self.listed_note(note_id).await?;
        self.pricing.quote(note.price, method)
    }

    /// Buys `note_id` for `buyer_id`.
    ///
    /// Only caller-side rules are checked here. Ownership, the exclusive sold
    /// flag and the balance are decided inside the store transaction.
    #[instrument(skip_all, fields(buyer = %buyer_id, note = %note_id, method = %method))]
    pub async fn purchase(
        &self,
        buyer_id: Uuid,
        note_id: Uuid,
        method: PaymentMethod,
    ) -> Result<PurchaseReceipt> {
        let result = self.try_purchase(buyer_id, note_id, method).await;
        match &result {
            Ok(receipt) => info!(
                purchase = %receipt.purchase_id,
                charged = %receipt.amount_charged,
                points = receipt.points_deducted,
                exclusive = receipt.is_exclusive,
                "note purchased"
            ),
            Err(err) => log_failure("purchase_note", err),
        }
        result
    }

    async fn try_purchase(
        &self,
        buyer_id: Uuid,
        note_id: Uuid,
        method: PaymentMethod,
    ) -> Result<PurchaseReceipt> {
        let note = self.listed_note(note_id).await?;
        if note.owner_id == buyer_id {
            return Err(DomainError::Validation("you cannot buy your own note".into()));
        }
        if note.is_free() {
            return Err(DomainError::Validation("free notes do not need to be purchased".into()));
        }

        let quote = self.pricing.quote(note.price, method)?;
        self.store
            .purchase_note(&PurchaseRequest { buyer_id, note_id, quote })
            .await
    }

    async fn listed_note(&self, note_id: Uuid) -> Result<Note> {
        self.accounts
            .find_note(note_id)
            .await?
            .filter(|note| note.is_published)
            .ok_or(DomainError::Purchase(PurchaseError::NoteNotFound))
    }
}
