//! Decides whether a user may read a note's content.
//! Serving the bytes (signed URLs etc.) is somebody else's job.

use std::sync::Arc;

use domains::{AccountRepo, DomainError, Result};
use uuid::Uuid;

#[derive(Clone)]
pub struct AccessService {
    accounts: Arc<dyn AccountRepo>,
}

impl AccessService {
    pub fn new(accounts: Arc<dyn AccountRepo>) -> Self {
        Self { accounts }
    }

    /// Owners always have access; everyone else needs a published free note
    /// or a purchase record.
    pub async fn can_access(&self, user_id: Uuid, note_id: Uuid) -> Result<bool> {
        let note = self
            .accounts
            .find_note(note_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Note", note_id))?;

        if note.owner_id == user_id {
            return Ok(true);
        }
        if !note.is_published {
            return Ok(false);
        }
        if note.is_free() {
            return Ok(true);
        }
        Ok(self.accounts.find_purchase(user_id, note_id).await?.is_some())
    }
}
