//! Quantity ledger - Scope item progress bookkeeping.
//!
//! Every change to `received_at_site`, `completed` or `remarks` goes through
//! [`apply_update`] or [`apply_batch`]. Both validate against the stored state, then
//! write with a guarded `UPDATE` that only matches if the quantities are still the
//! ones that were validated. A guard miss means another writer got in first; the
//! transaction is discarded and the whole attempt, read included, is repeated on a
//! fresh one rather than overwriting with a stale check.

use crate::{
    core::{
        access::{self, Operation},
        actor::Actor,
        confirmation, events,
    },
    entities::{EventKind, ScopeItem, scope_item},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Requested change to one scope item. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeUpdate {
    pub received_at_site: Option<i64>,
    pub completed: Option<i64>,
    pub remarks: Option<String>,
}

impl ScopeUpdate {
    #[must_use]
    pub fn received(received_at_site: i64) -> Self {
        Self {
            received_at_site: Some(received_at_site),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn completed(completed: i64) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.received_at_site.is_none() && self.completed.is_none() && self.remarks.is_none()
    }
}

/// Overall progress of a project's bill of quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectProgress {
    /// `sum(completed) / sum(total) * 100`, 0 when nothing is scoped
    pub completion_percent: f64,
    /// Items with `completed >= total`
    pub fully_done: usize,
    pub item_count: usize,
}

/// Checks an update against the stored item and returns the resulting
/// `(received_at_site, completed)` pair.
///
/// Checks run in a fixed order and the first violation wins: received against
/// total, completed against received (the new value if one is supplied), then
/// non-negativity.
pub fn validate_update(item: &scope_item::Model, update: &ScopeUpdate) -> Result<(i64, i64)> {
    let received_at_site = update.received_at_site.unwrap_or(item.received_at_site);
    let completed = update.completed.unwrap_or(item.completed);

    if received_at_site > item.total {
        return Err(Error::ReceivedExceedsTotal {
            scope_item_id: item.id,
            received_at_site,
            total: item.total,
        });
    }

    if completed > received_at_site {
        return Err(Error::CompletedExceedsReceived {
            scope_item_id: item.id,
            completed,
            received_at_site,
        });
    }

    if received_at_site < 0 {
        return Err(Error::NegativeQuantity {
            scope_item_id: item.id,
            field: "received_at_site",
            value: received_at_site,
        });
    }

    if completed < 0 {
        return Err(Error::NegativeQuantity {
            scope_item_id: item.id,
            field: "completed",
            value: completed,
        });
    }

    Ok((received_at_site, completed))
}

/// Computes overall progress over a set of scope items.
#[must_use]
pub fn progress_of(items: &[scope_item::Model]) -> ProjectProgress {
    let total: i64 = items.iter().map(|item| item.total).sum();
    let completed: i64 = items.iter().map(|item| item.completed).sum();

    #[allow(clippy::cast_precision_loss)]
    let completion_percent = if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    };

    ProjectProgress {
        completion_percent,
        fully_done: items.iter().filter(|item| item.is_fully_done()).count(),
        item_count: items.len(),
    }
}

/// Retrieves a scope item by id.
pub async fn get_scope_item<C>(conn: &C, scope_item_id: i64) -> Result<Option<scope_item::Model>>
where
    C: ConnectionTrait,
{
    ScopeItem::find_by_id(scope_item_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Lists a project's scope items in definition order.
pub async fn list_scope_items<C>(conn: &C, project_id: i64) -> Result<Vec<scope_item::Model>>
where
    C: ConnectionTrait,
{
    ScopeItem::find()
        .filter(scope_item::Column::ProjectId.eq(project_id))
        .order_by_asc(scope_item::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Overall completion percentage and fully-done count for a project.
pub async fn aggregate_progress<C>(conn: &C, project_id: i64) -> Result<ProjectProgress>
where
    C: ConnectionTrait,
{
    let items = list_scope_items(conn, project_id).await?;
    Ok(progress_of(&items))
}

/// Applies one update to one scope item.
///
/// The actor must have update access to the item's project and, if a supervisor,
/// must have finalized their confirmation. Nothing is written on failure.
#[instrument(skip(db, update), fields(actor_id = %actor.id))]
pub async fn apply_update(
    db: &DatabaseConnection,
    actor: &Actor,
    scope_item_id: i64,
    update: ScopeUpdate,
) -> Result<scope_item::Model> {
    if update.is_empty() {
        return Err(Error::validation("scope update has no fields set"));
    }

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let txn = db.begin().await?;
        match apply_in(&txn, actor, None, scope_item_id, &update).await? {
            Some(updated) => {
                txn.commit().await?;
                info!(
                    scope_item_id,
                    received_at_site = updated.received_at_site,
                    completed = updated.completed,
                    "scope item updated"
                );
                return Ok(updated);
            }
            None => {
                txn.rollback().await?;
                warn!(scope_item_id, attempt, "scope item changed underneath update, retrying");
            }
        }
    }

    Err(Error::Conflict {
        message: format!(
            "scope item {scope_item_id} kept changing after {MAX_WRITE_ATTEMPTS} attempts"
        ),
    })
}

/// Applies several updates to items of one project as a single unit: either all of
/// them are written or none is.
#[instrument(skip(db, updates), fields(actor_id = %actor.id, count = updates.len()))]
pub async fn apply_batch(
    db: &DatabaseConnection,
    actor: &Actor,
    project_id: i64,
    updates: Vec<(i64, ScopeUpdate)>,
) -> Result<Vec<scope_item::Model>> {
    if updates.is_empty() {
        return Err(Error::validation("scope batch is empty"));
    }
    if let Some((id, _)) = updates.iter().find(|(_, update)| update.is_empty()) {
        return Err(Error::validation(format!(
            "scope update for item {id} has no fields set"
        )));
    }

    'attempts: for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let txn = db.begin().await?;
        let mut results = Vec::with_capacity(updates.len());
        for (scope_item_id, update) in &updates {
            match apply_in(&txn, actor, Some(project_id), *scope_item_id, update).await? {
                Some(updated) => results.push(updated),
                None => {
                    txn.rollback().await?;
                    warn!(project_id, attempt, "scope batch raced another writer, retrying");
                    continue 'attempts;
                }
            }
        }
        txn.commit().await?;

        info!(project_id, count = results.len(), "scope batch applied");
        return Ok(results);
    }

    Err(Error::Conflict {
        message: format!(
            "scope batch for project {project_id} kept conflicting after {MAX_WRITE_ATTEMPTS} attempts"
        ),
    })
}

/// One validated write against the item as currently stored. `Ok(None)` means the
/// row changed between the read and the guarded write; the caller's transaction must
/// be discarded and the attempt repeated on a fresh one.
async fn apply_in<C>(
    conn: &C,
    actor: &Actor,
    expected_project: Option<i64>,
    scope_item_id: i64,
    update: &ScopeUpdate,
) -> Result<Option<scope_item::Model>>
where
    C: ConnectionTrait,
{
    let item = load(conn, scope_item_id).await?;

    if let Some(project_id) = expected_project {
        if item.project_id != project_id {
            return Err(Error::validation(format!(
                "scope item {scope_item_id} does not belong to project {project_id}"
            )));
        }
    }

    access::require_access(conn, actor, item.project_id, Operation::Update).await?;
    confirmation::require_confirmed(conn, actor, item.project_id).await?;

    write_checked(conn, actor, item, update).await
}

/// Validates `update` against `observed` and writes it only if the stored quantities
/// still equal the observed ones.
async fn write_checked<C>(
    conn: &C,
    actor: &Actor,
    observed: scope_item::Model,
    update: &ScopeUpdate,
) -> Result<Option<scope_item::Model>>
where
    C: ConnectionTrait,
{
    let (received_at_site, completed) = validate_update(&observed, update)?;
    let observed_received = observed.received_at_site;
    let observed_completed = observed.completed;
    let project_id = observed.project_id;

    let mut active: scope_item::ActiveModel = observed.into();
    active.received_at_site = Set(received_at_site);
    active.completed = Set(completed);
    if let Some(remarks) = &update.remarks {
        active.remarks = Set(Some(remarks.clone()));
    }
    active.last_updated = Set(chrono::Utc::now());

    let updated = match ScopeItem::update(active)
        .filter(scope_item::Column::ReceivedAtSite.eq(observed_received))
        .filter(scope_item::Column::Completed.eq(observed_completed))
        .exec(conn)
        .await
    {
        Ok(updated) => updated,
        Err(DbErr::RecordNotUpdated) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    events::record(
        conn,
        project_id,
        EventKind::ScopeUpdated,
        updated.id,
        format!(
            "received={} completed={}",
            updated.received_at_site, updated.completed
        ),
        &actor.id,
    )
    .await?;
    Ok(Some(updated))
}

async fn load<C>(conn: &C, scope_item_id: i64) -> Result<scope_item::Model>
where
    C: ConnectionTrait,
{
    get_scope_item(conn, scope_item_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "scope item",
            id: scope_item_id.to_string(),
        })
}
