//! Point tips on free notes.

use std::sync::Arc;

use domains::{
    AccountRepo, DomainError, DonationError, DonationReceipt, DonationRequest, LedgerStore,
    PricingPolicy, Result,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::log_failure;

const MAX_MESSAGE_CHARS: usize = 500;

#[derive(Clone)]
pub struct DonationService {
    store: Arc<dyn LedgerStore>,
    accounts: Arc<dyn AccountRepo>,
    pricing: Arc<PricingPolicy>,
}

impl DonationService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: Arc<dyn AccountRepo>,
        pricing: Arc<PricingPolicy>,
    ) -> Self {
        Self { store, accounts, pricing }
    }

    pub fn presets(&self) -> &[i64] {
        &self.pricing.donation_presets
    }

    /// Tips the author of `note_id`.
    ///
    /// `recipient_id`, when given, must be the note's owner.
    #[instrument(skip_all, fields(donor = %donor_id, note = %note_id, points = points))]
    pub async fn donate(
        &self,
        donor_id: Uuid,
        note_id: Uuid,
        points: i64,
        recipient_id: Option<Uuid>,
        message: Option<String>,
    ) -> Result<DonationReceipt> {
        let result = self.try_donate(donor_id, note_id, points, recipient_id, message).await;
        match &result {
            Ok(receipt) => info!(
                donation = %receipt.donation_id,
                received = receipt.points_received,
                "tip sent"
            ),
            Err(err) => log_failure("donate", err),
        }
        result
    }

    async fn try_donate(
        &self,
        donor_id: Uuid,
        note_id: Uuid,
        points: i64,
        recipient_id: Option<Uuid>,
        message: Option<String>,
    ) -> Result<DonationReceipt> {
        if !self.pricing.is_allowed_donation(points) {
            return Err(DonationError::InvalidAmount.into());
        }
        let message = clean_message(message)?;

        let note = self
            .accounts
            .find_note(note_id)
            .await?
            .filter(|note| note.is_published)
            .ok_or(DonationError::NoteNotFound)?;
        if !note.is_free() {
            return Err(DonationError::NotFree.into());
        }
        if note.owner_id == donor_id {
            return Err(DonationError::SelfDonation.into());
        }
        if recipient_id.is_some_and(|id| id != note.owner_id) {
            return Err(DomainError::Validation("recipient must be the note's author".into()));
        }

        let request = DonationRequest {
            donor_id,
            recipient_id: note.owner_id,
            note_id,
            split: self.pricing.split_donation(points),
            message,
        };
        self.store.donate(&request).await
    }
}

fn clean_message(message: Option<String>) -> Result<Option<String>> {
    let Some(text) = message else { return Ok(None) };
    let text = text.trim();
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(DomainError::Validation(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok((!text.is_empty()).then(|| text.to_string()))
}
