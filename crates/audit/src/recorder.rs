use serde_json::Map;
use tracing::debug;
use uuid::Uuid;

use librarium_identity::AuthenticatedUser;
use librarium_model::{Book, BookPatch, HistoryAction, NewBook, NewHistoryEntry};
use librarium_repo::{Books, History, RepoError, Repository};

use crate::change;

/// Where an audited mutation currently stands. Emitted as a `tracing`
/// field at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStage {
    /// The mutation has not been applied yet.
    Pending,
    /// The mutation is applied and the change set is computed.
    Diffed,
    /// The history row is written; the trail is complete for this step.
    Recorded,
    /// The mutation or the history write failed; the caller rolls back.
    Aborted,
}

impl AuditStage {
    fn as_str(self) -> &'static str {
        match self {
            AuditStage::Pending => "pending",
            AuditStage::Diffed => "diffed",
            AuditStage::Recorded => "recorded",
            AuditStage::Aborted => "aborted",
        }
    }
}

/// Applies book mutations and appends the matching history rows in the
/// same unit of work.
///
/// The recorder never resolves identity itself; the acting user id is
/// supplied up front, typically from an [`AuthenticatedUser`]. Both the
/// mutation and its history row ride the caller's transaction: if either
/// fails the error propagates and the caller rolls the whole unit of work
/// back, so the trail can never disagree with the rows.
#[derive(Debug, Clone, Copy)]
pub struct AuditRecorder {
    actor: Uuid,
}

impl AuditRecorder {
    /// Record on behalf of a known user id.
    pub fn new(actor: Uuid) -> Self {
        Self { actor }
    }

    /// Record on behalf of an authenticated identity.
    pub fn for_identity(identity: &AuthenticatedUser) -> Self {
        Self::new(identity.user_id)
    }

    /// The user id stamped onto every history row this recorder writes.
    pub fn actor(&self) -> Uuid {
        self.actor
    }

    /// Create a book and append a `create` history row carrying the full
    /// persisted field set as `new_values`.
    pub async fn create_book<U>(&self, uow: &mut U, data: NewBook) -> Result<Book, RepoError>
    where
        U: Repository<Books> + Repository<History> + Send,
    {
        self.stage(AuditStage::Pending, "create", None);
        let book = Repository::<Books>::create(uow, data)
            .await
            .inspect_err(|_| self.stage(AuditStage::Aborted, "create", None))?;

        let new_values = change::snapshot(&book);
        self.stage(AuditStage::Diffed, "create", Some(book.id));
        self.append(uow, book.id, HistoryAction::Create, None, Some(new_values))
            .await?;
        self.stage(AuditStage::Recorded, "create", Some(book.id));
        Ok(book)
    }

    /// Patch a book and append an `update` history row holding only the
    /// fields whose value actually changed, pre- and post-image side by
    /// side.
    ///
    /// An absent book returns `Ok(None)` with nothing recorded. An empty
    /// patch, or one that rewrites every field to its current value,
    /// returns the current row and records nothing.
    pub async fn update_book<U>(
        &self,
        uow: &mut U,
        id: Uuid,
        patch: BookPatch,
    ) -> Result<Option<Book>, RepoError>
    where
        U: Repository<Books> + Repository<History> + Send,
    {
        if patch.is_empty() {
            return Repository::<Books>::get_by_id(uow, id).await;
        }

        self.stage(AuditStage::Pending, "update", Some(id));
        let Some(before) = Repository::<Books>::get_by_id(uow, id).await? else {
            return Ok(None);
        };
        let Some(after) = Repository::<Books>::update(uow, id, patch)
            .await
            .inspect_err(|_| self.stage(AuditStage::Aborted, "update", Some(id)))?
        else {
            return Ok(None);
        };

        let (old_values, new_values) = change::diff(&before, &after);
        if old_values.is_empty() {
            return Ok(Some(after));
        }
        self.stage(AuditStage::Diffed, "update", Some(id));
        self.append(
            uow,
            id,
            HistoryAction::Update,
            Some(old_values),
            Some(new_values),
        )
        .await?;
        self.stage(AuditStage::Recorded, "update", Some(id));
        Ok(Some(after))
    }

    /// Delete a book and append a `delete` history row carrying the full
    /// prior row as `old_values`.
    ///
    /// An absent book returns `Ok(false)` with nothing recorded. The
    /// history row outlives the book: the trail of a deleted book stays
    /// queryable by its id.
    pub async fn delete_book<U>(&self, uow: &mut U, id: Uuid) -> Result<bool, RepoError>
    where
        U: Repository<Books> + Repository<History> + Send,
    {
        self.stage(AuditStage::Pending, "delete", Some(id));
        let Some(before) = Repository::<Books>::get_by_id(uow, id).await? else {
            return Ok(false);
        };
        let deleted = Repository::<Books>::delete(uow, id)
            .await
            .inspect_err(|_| self.stage(AuditStage::Aborted, "delete", Some(id)))?;
        if !deleted {
            return Ok(false);
        }

        let old_values = change::snapshot(&before);
        self.stage(AuditStage::Diffed, "delete", Some(id));
        self.append(uow, id, HistoryAction::Delete, Some(old_values), None)
            .await?;
        self.stage(AuditStage::Recorded, "delete", Some(id));
        Ok(true)
    }

    async fn append<U>(
        &self,
        uow: &mut U,
        book_id: Uuid,
        action: HistoryAction,
        old_values: Option<Map<String, serde_json::Value>>,
        new_values: Option<Map<String, serde_json::Value>>,
    ) -> Result<(), RepoError>
    where
        U: Repository<History> + Send,
    {
        let entry = NewHistoryEntry {
            book_id,
            user_id: self.actor,
            action,
            old_values,
            new_values,
        };
        Repository::<History>::create(uow, entry)
            .await
            .inspect_err(|_| self.stage(AuditStage::Aborted, action.as_str(), Some(book_id)))?;
        Ok(())
    }

    fn stage(&self, stage: AuditStage, action: &str, book_id: Option<Uuid>) {
        debug!(
            stage = stage.as_str(),
            action,
            ?book_id,
            actor = %self.actor,
            "audit stage"
        );
    }
}
