//! Authorization gate - Who may read or write what.
//!
//! Admins and super admins may access every project. Supervisors may access only the
//! projects they hold a membership row for, and only ever see their own requests.
//! Nobody but an admin may review a request. The decision itself is a pure function
//! of the actor and the membership row; [`require_access`] loads the row and turns a
//! denial into [`Error::AuthorizationDenied`].

use crate::{
    core::actor::Actor,
    entities::{ProjectMember, project_member},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, prelude::*};
use std::fmt;
use tracing::warn;

/// The kind of access being asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// List or read project data
    Read,
    /// Create a request
    Create,
    /// Change scope quantities, an own pending request, or own confirmation progress
    Update,
    /// Approve, reject, deliver, return or cancel a request
    Review,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Review => "review",
        })
    }
}

/// Decides access given the actor's membership row for `project_id`, if any.
#[must_use]
pub fn can_access(
    actor: &Actor,
    membership: Option<&project_member::Model>,
    project_id: i64,
    operation: Operation,
) -> bool {
    if actor.role.is_admin() {
        return true;
    }
    if operation == Operation::Review {
        return false;
    }
    membership.is_some_and(|m| m.project_id == project_id && m.actor_id == actor.id)
}

/// Only admins and super admins may move a request out of its current state.
#[must_use]
pub const fn can_review(actor: &Actor) -> bool {
    actor.role.is_admin()
}

/// The requester a listing must be restricted to, `None` when the actor sees all requests.
#[must_use]
pub fn visible_requester(actor: &Actor) -> Option<&str> {
    if actor.role.is_admin() {
        None
    } else {
        Some(actor.id.as_str())
    }
}

/// Loads the membership row linking `actor_id` to `project_id`.
pub async fn find_membership<C>(
    conn: &C,
    project_id: i64,
    actor_id: &str,
) -> Result<Option<project_member::Model>>
where
    C: ConnectionTrait,
{
    ProjectMember::find_by_id((project_id, actor_id.to_string()))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Lists every membership row of a project.
pub async fn list_members<C>(conn: &C, project_id: i64) -> Result<Vec<project_member::Model>>
where
    C: ConnectionTrait,
{
    ProjectMember::find()
        .filter(project_member::Column::ProjectId.eq(project_id))
        .order_by_asc(project_member::Column::ActorId)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Fails with [`Error::AuthorizationDenied`] unless [`can_access`] allows the operation.
pub async fn require_access<C>(
    conn: &C,
    actor: &Actor,
    project_id: i64,
    operation: Operation,
) -> Result<()>
where
    C: ConnectionTrait,
{
    if actor.role.is_admin() {
        return Ok(());
    }

    let membership = find_membership(conn, project_id, &actor.id).await?;
    if can_access(actor, membership.as_ref(), project_id, operation) {
        Ok(())
    } else {
        warn!(actor_id = %actor.id, project_id, %operation, "access denied");
        Err(Error::AuthorizationDenied {
            actor_id: actor.id.clone(),
            project_id,
            operation: operation.to_string(),
        })
    }
}
