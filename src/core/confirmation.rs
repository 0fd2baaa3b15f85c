//! Confirmation gate - The one-time review a supervisor completes before writing.
//!
//! A record is opened when a supervisor is assigned to a project. The review runs
//! in three steps that cannot be skipped or reordered:
//!
//! 1. scope: the bill of quantities has been read
//! 2. materials: the material catalogue has been read
//! 3. tools: the tool catalogue has been read and supervisory responsibility accepted
//!
//! [`finalize`] flips the gate once all four checklist items are set and freezes a
//! snapshot of what was reviewed. The gate never re-locks afterwards.

use crate::{
    core::{
        access::{self, Operation},
        actor::Actor,
        events, ledger, project,
    },
    entities::{Confirmation, EventKind, RequestKind, ReviewStep, confirmation},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// One checklist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Acknowledgement {
    ScopeReviewed,
    MaterialsReviewed,
    ToolsReviewed,
    ResponsibilityAccepted,
}

impl Acknowledgement {
    pub const ALL: [Self; 4] = [
        Self::ScopeReviewed,
        Self::MaterialsReviewed,
        Self::ToolsReviewed,
        Self::ResponsibilityAccepted,
    ];

    /// The review step this item belongs to.
    #[must_use]
    pub const fn step(self) -> ReviewStep {
        match self {
            Self::ScopeReviewed => ReviewStep::Scope,
            Self::MaterialsReviewed => ReviewStep::Materials,
            Self::ToolsReviewed | Self::ResponsibilityAccepted => ReviewStep::Tools,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ScopeReviewed => "scope reviewed",
            Self::MaterialsReviewed => "materials reviewed",
            Self::ToolsReviewed => "tools reviewed",
            Self::ResponsibilityAccepted => "responsibility accepted",
        }
    }
}

/// The four checklist flags of a confirmation record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub scope_reviewed: bool,
    pub materials_reviewed: bool,
    pub tools_reviewed: bool,
    pub responsibility_accepted: bool,
}

impl Checklist {
    #[must_use]
    pub const fn from_record(record: &confirmation::Model) -> Self {
        Self {
            scope_reviewed: record.scope_reviewed,
            materials_reviewed: record.materials_reviewed,
            tools_reviewed: record.tools_reviewed,
            responsibility_accepted: record.responsibility_accepted,
        }
    }

    #[must_use]
    pub const fn is_set(&self, item: Acknowledgement) -> bool {
        match item {
            Acknowledgement::ScopeReviewed => self.scope_reviewed,
            Acknowledgement::MaterialsReviewed => self.materials_reviewed,
            Acknowledgement::ToolsReviewed => self.tools_reviewed,
            Acknowledgement::ResponsibilityAccepted => self.responsibility_accepted,
        }
    }

    pub const fn set(&mut self, item: Acknowledgement) {
        match item {
            Acknowledgement::ScopeReviewed => self.scope_reviewed = true,
            Acknowledgement::MaterialsReviewed => self.materials_reviewed = true,
            Acknowledgement::ToolsReviewed => self.tools_reviewed = true,
            Acknowledgement::ResponsibilityAccepted => self.responsibility_accepted = true,
        }
    }

    /// Items of `step` that are not yet set.
    #[must_use]
    pub fn outstanding_in(&self, step: ReviewStep) -> Vec<Acknowledgement> {
        Acknowledgement::ALL
            .into_iter()
            .filter(|item| item.step() == step && !self.is_set(*item))
            .collect()
    }

    /// All items not yet set, in review order.
    #[must_use]
    pub fn outstanding(&self) -> Vec<Acknowledgement> {
        Acknowledgement::ALL
            .into_iter()
            .filter(|item| !self.is_set(*item))
            .collect()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outstanding().is_empty()
    }
}

/// Whether the review may move past `step`: it must be the current step and all of
/// its checklist items must be set.
#[must_use]
pub fn can_advance(current: ReviewStep, checklist: &Checklist, step: ReviewStep) -> bool {
    step == current && checklist.outstanding_in(step).is_empty()
}

/// A line of the frozen scope list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedScopeLine {
    pub id: i64,
    pub label: String,
    pub total: i64,
    pub received_at_site: i64,
    pub completed: i64,
}

/// What the supervisor reviewed, frozen at finalize time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    pub scope: Vec<ReviewedScopeLine>,
    pub materials: Vec<String>,
    pub tools: Vec<String>,
}

impl ReviewSnapshot {
    /// Decodes the snapshot stored on a finalized record.
    pub fn from_record(record: &confirmation::Model) -> Result<Option<Self>> {
        record
            .snapshot
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }
}

fn labels(items: &[Acknowledgement]) -> Vec<String> {
    items.iter().map(|item| item.label().to_string()).collect()
}

fn already_confirmed(record: &confirmation::Model, action: &str) -> Error {
    Error::InvalidTransition {
        entity: "confirmation",
        id: record.project_id,
        from: "confirmed".to_string(),
        action: action.to_string(),
        reason: format!("{} has already confirmed this project", record.supervisor_id),
    }
}

/// Opens a pending record for a newly assigned supervisor, or returns the existing one.
pub(crate) async fn open_record<C>(
    conn: &C,
    project_id: i64,
    supervisor_id: &str,
) -> Result<confirmation::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_record(conn, project_id, supervisor_id).await? {
        return Ok(existing);
    }

    let record = confirmation::ActiveModel {
        project_id: Set(project_id),
        supervisor_id: Set(supervisor_id.to_string()),
        needs_confirmation: Set(true),
        step: Set(ReviewStep::Scope),
        scope_reviewed: Set(false),
        materials_reviewed: Set(false),
        tools_reviewed: Set(false),
        responsibility_accepted: Set(false),
        confirmed_at: Set(None),
        snapshot: Set(None),
        remarks: Set(None),
        created_at: Set(chrono::Utc::now()),
    };
    let record = record.insert(conn).await?;
    debug!(project_id, supervisor_id, "confirmation record opened");
    Ok(record)
}

/// Loads the record for a (project, supervisor) pair.
pub async fn find_record<C>(
    conn: &C,
    project_id: i64,
    supervisor_id: &str,
) -> Result<Option<confirmation::Model>>
where
    C: ConnectionTrait,
{
    Confirmation::find_by_id((project_id, supervisor_id.to_string()))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Lists every confirmation record of a project.
pub async fn list_records<C>(conn: &C, project_id: i64) -> Result<Vec<confirmation::Model>>
where
    C: ConnectionTrait,
{
    Confirmation::find()
        .filter(confirmation::Column::ProjectId.eq(project_id))
        .order_by_asc(confirmation::Column::SupervisorId)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Number of supervisors on a project that still have to confirm.
pub async fn count_unconfirmed<C>(conn: &C, project_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    Confirmation::find()
        .filter(confirmation::Column::ProjectId.eq(project_id))
        .filter(confirmation::Column::NeedsConfirmation.eq(true))
        .count(conn)
        .await
        .map_err(Into::into)
}

/// Whether `actor` is still locked out of writes on `project_id`. Admins never are;
/// a supervisor without a record counts as unconfirmed.
pub async fn needs_confirmation<C>(conn: &C, actor: &Actor, project_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    if actor.role.is_admin() {
        return Ok(false);
    }
    Ok(find_record(conn, project_id, &actor.id)
        .await?
        .is_none_or(|record| record.needs_confirmation))
}

/// Fails with [`Error::ConfirmationRequired`] while the actor is locked out.
pub async fn require_confirmed<C>(conn: &C, actor: &Actor, project_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    if needs_confirmation(conn, actor, project_id).await? {
        debug!(actor_id = %actor.id, project_id, "write blocked pending confirmation");
        return Err(Error::ConfirmationRequired {
            actor_id: actor.id.clone(),
            project_id,
        });
    }
    Ok(())
}

/// Returns the actor's own record. Only supervisors run the review.
async fn load_own<C>(conn: &C, actor: &Actor, project_id: i64) -> Result<confirmation::Model>
where
    C: ConnectionTrait,
{
    if !actor.is_supervisor() {
        return Err(Error::AuthorizationDenied {
            actor_id: actor.id.clone(),
            project_id,
            operation: "confirm".to_string(),
        });
    }
    access::require_access(conn, actor, project_id, Operation::Update).await?;

    find_record(conn, project_id, &actor.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "confirmation",
            id: format!("{project_id}/{}", actor.id),
        })
}

/// Returns the actor's own record, for showing review progress.
pub async fn status(
    db: &DatabaseConnection,
    actor: &Actor,
    project_id: i64,
) -> Result<confirmation::Model> {
    load_own(db, actor, project_id).await
}

/// Records one checklist item. Items of earlier steps may be repeated; items of a
/// later step are refused until the review has advanced to it.
#[instrument(skip(db), fields(actor_id = %actor.id))]
pub async fn acknowledge(
    db: &DatabaseConnection,
    actor: &Actor,
    project_id: i64,
    item: Acknowledgement,
) -> Result<confirmation::Model> {
    let txn = db.begin().await?;
    let record = load_own(&txn, actor, project_id).await?;

    if !record.needs_confirmation {
        return Err(already_confirmed(&record, "acknowledge"));
    }

    let checklist = Checklist::from_record(&record);
    if item.step() > record.step {
        let mut missing = labels(&checklist.outstanding_in(record.step));
        missing.push(format!("advance past the {} step", record.step));
        return Err(Error::ConfirmationIncomplete { missing });
    }
    if checklist.is_set(item) {
        txn.commit().await?;
        return Ok(record);
    }

    let step = record.step;
    let mut active: confirmation::ActiveModel = record.into();
    match item {
        Acknowledgement::ScopeReviewed => active.scope_reviewed = Set(true),
        Acknowledgement::MaterialsReviewed => active.materials_reviewed = Set(true),
        Acknowledgement::ToolsReviewed => active.tools_reviewed = Set(true),
        Acknowledgement::ResponsibilityAccepted => active.responsibility_accepted = Set(true),
    }
    let updated = guarded_update(&txn, active, project_id, step).await?;
    txn.commit().await?;

    debug!(project_id, item = item.label(), "checklist item acknowledged");
    Ok(updated)
}

/// Moves the review to the next step once every item of the current step is set.
#[instrument(skip(db), fields(actor_id = %actor.id))]
pub async fn advance(
    db: &DatabaseConnection,
    actor: &Actor,
    project_id: i64,
) -> Result<confirmation::Model> {
    let txn = db.begin().await?;
    let record = load_own(&txn, actor, project_id).await?;

    if !record.needs_confirmation {
        return Err(already_confirmed(&record, "advance"));
    }

    let checklist = Checklist::from_record(&record);
    let current = record.step;
    if !can_advance(current, &checklist, current) {
        return Err(Error::ConfirmationIncomplete {
            missing: labels(&checklist.outstanding_in(current)),
        });
    }
    let Some(next) = current.next() else {
        return Err(Error::InvalidTransition {
            entity: "confirmation",
            id: project_id,
            from: current.to_string(),
            action: "advance".to_string(),
            reason: "final step reached, finalize instead".to_string(),
        });
    };

    let mut active: confirmation::ActiveModel = record.into();
    active.step = Set(next);
    let updated = guarded_update(&txn, active, project_id, current).await?;
    txn.commit().await?;

    debug!(project_id, from = %current, to = %next, "confirmation step advanced");
    Ok(updated)
}

/// Completes the review. Requires every checklist item; writes the confirmation
/// time, the remarks and a frozen snapshot of the live scope, materials and tools.
#[instrument(skip(db, remarks), fields(actor_id = %actor.id))]
pub async fn finalize(
    db: &DatabaseConnection,
    actor: &Actor,
    project_id: i64,
    remarks: Option<String>,
) -> Result<confirmation::Model> {
    let txn = db.begin().await?;
    let record = load_own(&txn, actor, project_id).await?;

    if !record.needs_confirmation {
        return Err(already_confirmed(&record, "finalize"));
    }

    let checklist = Checklist::from_record(&record);
    if !checklist.is_complete() {
        return Err(Error::ConfirmationIncomplete {
            missing: labels(&checklist.outstanding()),
        });
    }

    let snapshot = ReviewSnapshot {
        scope: ledger::list_scope_items(&txn, project_id)
            .await?
            .into_iter()
            .map(|item| ReviewedScopeLine {
                id: item.id,
                label: item.label,
                total: item.total,
                received_at_site: item.received_at_site,
                completed: item.completed,
            })
            .collect(),
        materials: project::list_catalogue(&txn, project_id, RequestKind::Material).await?,
        tools: project::list_catalogue(&txn, project_id, RequestKind::Tool).await?,
    };

    let step = record.step;
    let mut active: confirmation::ActiveModel = record.into();
    active.needs_confirmation = Set(false);
    active.confirmed_at = Set(Some(chrono::Utc::now()));
    active.snapshot = Set(Some(serde_json::to_value(&snapshot)?));
    active.remarks = Set(remarks.filter(|r| !r.trim().is_empty()));
    let updated = guarded_update(&txn, active, project_id, step).await?;

    events::record(
        &txn,
        project_id,
        EventKind::ConfirmationFinalized,
        &actor.id,
        "confirmed",
        &actor.id,
    )
    .await?;
    txn.commit().await?;

    info!(project_id, "supervisor confirmation finalized");
    Ok(updated)
}

/// Writes a record change only if it is still unconfirmed and on the step the change
/// was computed from.
async fn guarded_update<C>(
    conn: &C,
    active: confirmation::ActiveModel,
    project_id: i64,
    observed_step: ReviewStep,
) -> Result<confirmation::Model>
where
    C: ConnectionTrait,
{
    match Confirmation::update(active)
        .filter(confirmation::Column::NeedsConfirmation.eq(true))
        .filter(confirmation::Column::Step.eq(observed_step))
        .exec(conn)
        .await
    {
        Ok(updated) => Ok(updated),
        Err(DbErr::RecordNotUpdated) => Err(Error::InvalidTransition {
            entity: "confirmation",
            id: project_id,
            from: observed_step.to_string(),
            action: "update".to_string(),
            reason: "record changed concurrently".to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::ledger::{ScopeUpdate, apply_update};
    use crate::core::project::add_catalogue_item;
    use crate::test_utils::*;

    #[test]
    fn test_can_advance_only_current_complete_step() {
        let mut checklist = Checklist::default();
        assert!(!can_advance(ReviewStep::Scope, &checklist, ReviewStep::Scope));

        checklist.set(Acknowledgement::ScopeReviewed);
        assert!(can_advance(ReviewStep::Scope, &checklist, ReviewStep::Scope));
        // Not the current step.
        assert!(!can_advance(ReviewStep::Materials, &checklist, ReviewStep::Scope));

        checklist.set(Acknowledgement::MaterialsReviewed);
        checklist.set(Acknowledgement::ToolsReviewed);
        assert!(!can_advance(ReviewStep::Tools, &checklist, ReviewStep::Tools));
        assert_eq!(
            checklist.outstanding(),
            vec![Acknowledgement::ResponsibilityAccepted]
        );

        checklist.set(Acknowledgement::ResponsibilityAccepted);
        assert!(can_advance(ReviewStep::Tools, &checklist, ReviewStep::Tools));
        assert!(checklist.is_complete());
    }

    #[tokio::test]
    async fn test_assigned_supervisor_starts_locked() -> Result<()> {
        let (db, project) = setup_with_project().await?;
        let sup = supervisor();

        assert!(needs_confirmation(&db, &sup, project.id).await?);
        assert!(!needs_confirmation(&db, &admin(), project.id).await?);

        let record = status(&db, &sup, project.id).await?;
        assert!(record.needs_confirmation);
        assert_eq!(record.step, ReviewStep::Scope);
        assert!(record.confirmed_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_steps_cannot_be_skipped() -> Result<()> {
        let (db, project) = setup_with_project().await?;
        let sup = supervisor();

        let result = acknowledge(&db, &sup, project.id, Acknowledgement::ToolsReviewed).await;
        assert!(matches!(result, Err(Error::ConfirmationIncomplete { .. })));

        let result = advance(&db, &sup, project.id).await;
        assert!(matches!(
            result,
            Err(Error::ConfirmationIncomplete { ref missing }) if missing == &vec!["scope reviewed".to_string()]
        ));

        acknowledge(&db, &sup, project.id, Acknowledgement::ScopeReviewed).await?;
        let record = advance(&db, &sup, project.id).await?;
        assert_eq!(record.step, ReviewStep::Materials);

        // Still one step short of tools.
        let result =
            acknowledge(&db, &sup, project.id, Acknowledgement::ResponsibilityAccepted).await;
        assert!(matches!(result, Err(Error::ConfirmationIncomplete { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_finalize_requires_full_checklist() -> Result<()> {
        let (db, project) = setup_with_project().await?;
        let sup = supervisor();

        acknowledge(&db, &sup, project.id, Acknowledgement::ScopeReviewed).await?;
        advance(&db, &sup, project.id).await?;
        acknowledge(&db, &sup, project.id, Acknowledgement::MaterialsReviewed).await?;
        advance(&db, &sup, project.id).await?;
        acknowledge(&db, &sup, project.id, Acknowledgement::ToolsReviewed).await?;

        let result = finalize(&db, &sup, project.id, None).await;
        assert!(matches!(
            result,
            Err(Error::ConfirmationIncomplete { ref missing }) if missing == &vec!["responsibility accepted".to_string()]
        ));
        assert!(needs_confirmation(&db, &sup, project.id).await?);

        let result = advance(&db, &sup, project.id).await;
        assert!(matches!(result, Err(Error::ConfirmationIncomplete { .. })));

        acknowledge(&db, &sup, project.id, Acknowledgement::ResponsibilityAccepted).await?;
        let record = finalize(&db, &sup, project.id, Some("checked on site".to_string())).await?;
        assert!(!record.needs_confirmation);
        assert!(record.confirmed_at.is_some());
        assert_eq!(record.remarks.as_deref(), Some("checked on site"));
        assert!(!needs_confirmation(&db, &sup, project.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_confirmation_is_one_shot_and_snapshot_frozen() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;

        let record = status(&db, &sup, project.id).await?;
        let snapshot = ReviewSnapshot::from_record(&record)?.unwrap();
        assert_eq!(snapshot.scope.len(), 2);
        assert_eq!(snapshot.scope[0].received_at_site, 0);
        assert_eq!(snapshot.materials, vec!["Cement", "Sand"]);

        // Live data moves on; the snapshot does not.
        let item = snapshot.scope[0].id;
        apply_update(&db, &sup, item, ScopeUpdate::received(40)).await?;
        add_catalogue_item(&db, project.id, RequestKind::Material, "Gravel").await?;

        let record = status(&db, &sup, project.id).await?;
        let frozen = ReviewSnapshot::from_record(&record)?.unwrap();
        assert_eq!(frozen, snapshot);
        assert!(!record.needs_confirmation);

        let result = finalize(&db, &sup, project.id, None).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        let result = acknowledge(&db, &sup, project.id, Acknowledgement::ScopeReviewed).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));

        let events = events::list_events_of_kind(
            &db,
            project.id,
            EventKind::ConfirmationFinalized,
        )
        .await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_id, sup.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_only_supervisors_confirm() -> Result<()> {
        let (db, project) = setup_with_project().await?;

        let result = acknowledge(&db, &admin(), project.id, Acknowledgement::ScopeReviewed).await;
        assert!(matches!(result, Err(Error::AuthorizationDenied { .. })));

        let stranger = Actor::supervisor("sup-stranger");
        let result = finalize(&db, &stranger, project.id, None).await;
        assert!(matches!(result, Err(Error::AuthorizationDenied { .. })));
        Ok(())
    }
}
