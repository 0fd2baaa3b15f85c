//! Transition events.
//!
//! Each successful state transition appends exactly one row to `workflow_events`
//! inside the caller's database transaction, so an event exists if and only if the
//! change it describes was committed.

use crate::{
    entities::{EventKind, WorkflowEvent, workflow_event},
    errors::Result,
};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::debug;

/// Appends one event row. Must be called with the same connection or transaction
/// that performed the change.
pub(crate) async fn record<C>(
    conn: &C,
    project_id: i64,
    kind: EventKind,
    entity_id: impl ToString,
    new_state: impl ToString,
    actor_id: &str,
) -> Result<workflow_event::Model>
where
    C: ConnectionTrait,
{
    let event = workflow_event::ActiveModel {
        project_id: Set(project_id),
        kind: Set(kind),
        entity_id: Set(entity_id.to_string()),
        new_state: Set(new_state.to_string()),
        actor_id: Set(actor_id.to_string()),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    let event = event.insert(conn).await?;
    debug!(
        project_id,
        kind = ?event.kind,
        entity_id = %event.entity_id,
        new_state = %event.new_state,
        "workflow event recorded"
    );
    Ok(event)
}

/// Lists the events of a project in the order they were committed.
pub async fn list_events<C>(conn: &C, project_id: i64) -> Result<Vec<workflow_event::Model>>
where
    C: ConnectionTrait,
{
    WorkflowEvent::find()
        .filter(workflow_event::Column::ProjectId.eq(project_id))
        .order_by_asc(workflow_event::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Lists the events of one kind for a project, oldest first.
pub async fn list_events_of_kind<C>(
    conn: &C,
    project_id: i64,
    kind: EventKind,
) -> Result<Vec<workflow_event::Model>>
where
    C: ConnectionTrait,
{
    WorkflowEvent::find()
        .filter(workflow_event::Column::ProjectId.eq(project_id))
        .filter(workflow_event::Column::Kind.eq(kind))
        .order_by_asc(workflow_event::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}
