//! Request lifecycle manager - Material and tool requests from submission to return.
//!
//! One manager serves both kinds. The legal moves live in [`RequestStatus::next`];
//! every transition here consults that table, then writes with an `UPDATE` guarded
//! on the status it started from. Two reviewers racing on the same request therefore
//! resolve to one winner, and the loser sees [`Error::InvalidTransition`].
//!
//! Supervisors submit and edit their own pending requests. Only admins and super
//! admins review, deliver, take returns and cancel.

use crate::{
    core::{
        access::{self, Operation},
        actor::Actor,
        confirmation, events, project,
    },
    entities::{
        EventKind, Priority, RequestAction, RequestKind, RequestStatus, ResourceRequest,
        ToolRequestType, resource_request,
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Item name that stands for "not in the catalogue"; requires a custom name.
pub const OTHER_ITEM: &str = "Other";

/// What a supervisor asks for. Used both to submit and to edit a pending request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub kind: RequestKind,
    pub item_name: String,
    pub custom_name: Option<String>,
    pub quantity: i64,
    pub size_or_grade: Option<String>,
    pub specification: Option<String>,
    pub priority: Priority,
    pub area_in_use: Option<String>,
    /// Tool requests only
    pub request_type: Option<ToolRequestType>,
    /// Tool requests only
    pub return_date: Option<NaiveDate>,
}

impl RequestPayload {
    pub fn material(item_name: impl Into<String>, quantity: i64, priority: Priority) -> Self {
        Self {
            kind: RequestKind::Material,
            item_name: item_name.into(),
            custom_name: None,
            quantity,
            size_or_grade: None,
            specification: None,
            priority,
            area_in_use: None,
            request_type: None,
            return_date: None,
        }
    }

    pub fn tool(
        item_name: impl Into<String>,
        quantity: i64,
        priority: Priority,
        request_type: ToolRequestType,
    ) -> Self {
        Self {
            kind: RequestKind::Tool,
            request_type: Some(request_type),
            ..Self::material(item_name, quantity, priority)
        }
    }

    /// An off-catalogue item.
    #[must_use]
    pub fn other(mut self, custom_name: impl Into<String>) -> Self {
        self.item_name = OTHER_ITEM.to_string();
        self.custom_name = Some(custom_name.into());
        self
    }

    #[must_use]
    pub fn area(mut self, area_in_use: impl Into<String>) -> Self {
        self.area_in_use = Some(area_in_use.into());
        self
    }
}

/// Outcome of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    const fn action(self) -> RequestAction {
        match self {
            Self::Approve => RequestAction::Approve,
            Self::Reject => RequestAction::Reject,
        }
    }
}

/// Details captured when an approved request reaches site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub delivered_by: String,
    pub cost: Option<f64>,
    pub notes: Option<String>,
}

/// Optional narrowing of a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub kind: Option<RequestKind>,
    pub status: Option<RequestStatus>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checks a payload against the project's catalogue for its kind.
///
/// # Errors
/// [`Error::Validation`] for a non-positive quantity, an empty or unknown item name,
/// `"Other"` without a custom name, or tool-only fields on a material request.
pub fn validate_payload(payload: &RequestPayload, catalogue: &[String]) -> Result<()> {
    if payload.quantity <= 0 {
        return Err(Error::validation(format!(
            "quantity must be positive, got {}",
            payload.quantity
        )));
    }

    let item_name = payload.item_name.trim();
    if item_name.is_empty() {
        return Err(Error::validation("item name cannot be empty"));
    }

    if item_name.eq_ignore_ascii_case(OTHER_ITEM) {
        if payload
            .custom_name
            .as_deref()
            .is_none_or(|name| name.trim().is_empty())
        {
            return Err(Error::validation(format!(
                "a custom name is required when the item is '{OTHER_ITEM}'"
            )));
        }
    } else if !catalogue
        .iter()
        .any(|entry| entry.eq_ignore_ascii_case(item_name))
    {
        return Err(Error::validation(format!(
            "'{item_name}' is not in the project's {} catalogue",
            payload.kind
        )));
    }

    match payload.kind {
        RequestKind::Tool if payload.request_type.is_none() => Err(Error::validation(
            "tool requests must say whether to purchase, rent or borrow",
        )),
        RequestKind::Material if payload.request_type.is_some() => Err(Error::validation(
            "request type applies to tool requests only",
        )),
        RequestKind::Material if payload.return_date.is_some() => Err(Error::validation(
            "return date applies to tool requests only",
        )),
        _ => Ok(()),
    }
}

fn invalid_transition(
    request: &resource_request::Model,
    action: impl ToString,
    reason: impl Into<String>,
) -> Error {
    Error::InvalidTransition {
        entity: "resource request",
        id: request.id,
        from: request.status.to_string(),
        action: action.to_string(),
        reason: reason.into(),
    }
}

const fn event_for(action: RequestAction) -> EventKind {
    match action {
        RequestAction::Approve => EventKind::RequestApproved,
        RequestAction::Reject => EventKind::RequestRejected,
        RequestAction::Deliver => EventKind::RequestDelivered,
        RequestAction::Return => EventKind::RequestReturned,
        RequestAction::Cancel => EventKind::RequestCancelled,
    }
}

async fn load<C>(conn: &C, request_id: i64) -> Result<resource_request::Model>
where
    C: ConnectionTrait,
{
    ResourceRequest::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "resource request",
            id: request_id.to_string(),
        })
}

/// Reviewer-only actions fail as an invalid transition for anyone else.
fn require_reviewer(
    actor: &Actor,
    request: &resource_request::Model,
    action: RequestAction,
) -> Result<()> {
    if access::can_review(actor) {
        Ok(())
    } else {
        Err(invalid_transition(
            request,
            action,
            format!("{} may not {action} requests", actor.role),
        ))
    }
}

/// Moves `request` along `action`, letting `apply` fill in the columns the action
/// captures, and records the transition event.
async fn transition<C, F>(
    conn: &C,
    actor: &Actor,
    request: resource_request::Model,
    action: RequestAction,
    apply: F,
) -> Result<resource_request::Model>
where
    C: ConnectionTrait,
    F: FnOnce(&mut resource_request::ActiveModel),
{
    let from = request.status;
    let to = from.next(request.kind, action).ok_or_else(|| {
        let reason = if from.is_terminal(request.kind) {
            format!("a {from} {} request is final", request.kind)
        } else {
            format!("not allowed for a {} request", request.kind)
        };
        invalid_transition(&request, action, reason)
    })?;
    let (request_id, project_id) = (request.id, request.project_id);

    let mut active: resource_request::ActiveModel = request.into();
    active.status = Set(to);
    active.updated_at = Set(chrono::Utc::now());
    apply(&mut active);

    let updated = match ResourceRequest::update(active)
        .filter(resource_request::Column::Status.eq(from))
        .exec(conn)
        .await
    {
        Ok(updated) => updated,
        Err(DbErr::RecordNotUpdated) => {
            return Err(Error::InvalidTransition {
                entity: "resource request",
                id: request_id,
                from: from.to_string(),
                action: action.to_string(),
                reason: "status changed concurrently".to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    events::record(conn, project_id, event_for(action), request_id, to, &actor.id).await?;
    info!(request_id, project_id, %from, %to, actor_id = %actor.id, "request transitioned");
    Ok(updated)
}

/// Creates a pending request on behalf of `actor`.
///
/// Checks run in order: project access, then the supervisor's confirmation, then the
/// payload. An unconfirmed supervisor is therefore always told to confirm first.
#[instrument(skip(db, payload), fields(actor_id = %actor.id))]
pub async fn submit(
    db: &DatabaseConnection,
    actor: &Actor,
    project_id: i64,
    payload: RequestPayload,
) -> Result<resource_request::Model> {
    let txn = db.begin().await?;

    project::get_project(&txn, project_id).await?;
    access::require_access(&txn, actor, project_id, Operation::Create).await?;
    confirmation::require_confirmed(&txn, actor, project_id).await?;

    let catalogue = project::list_catalogue(&txn, project_id, payload.kind).await?;
    validate_payload(&payload, &catalogue)?;

    let now = chrono::Utc::now();
    let is_other = payload.item_name.trim().eq_ignore_ascii_case(OTHER_ITEM);
    let request = resource_request::ActiveModel {
        project_id: Set(project_id),
        kind: Set(payload.kind),
        item_name: Set(if is_other {
            OTHER_ITEM.to_string()
        } else {
            payload.item_name.trim().to_string()
        }),
        custom_name: Set(if is_other {
            non_blank(payload.custom_name)
        } else {
            None
        }),
        quantity: Set(payload.quantity),
        size_or_grade: Set(non_blank(payload.size_or_grade)),
        specification: Set(non_blank(payload.specification)),
        priority: Set(payload.priority),
        area_in_use: Set(non_blank(payload.area_in_use)),
        status: Set(RequestStatus::Pending),
        requested_by: Set(actor.id.clone()),
        requested_at: Set(now),
        updated_at: Set(now),
        reviewed_by: Set(None),
        reviewed_at: Set(None),
        review_comments: Set(None),
        request_type: Set(payload.request_type),
        return_date: Set(payload.return_date),
        delivered_by: Set(None),
        delivered_at: Set(None),
        delivery_cost: Set(None),
        delivery_notes: Set(None),
        returned_at: Set(None),
        return_condition: Set(None),
        cancelled_by: Set(None),
        cancelled_at: Set(None),
        cancel_reason: Set(None),
        ..Default::default()
    };
    let request = request.insert(&txn).await?;

    events::record(
        &txn,
        project_id,
        EventKind::RequestSubmitted,
        request.id,
        request.status,
        &actor.id,
    )
    .await?;
    txn.commit().await?;

    info!(
        request_id = request.id,
        project_id,
        kind = %request.kind,
        item = request.display_name(),
        "request submitted"
    );
    Ok(request)
}

/// Replaces the editable fields of a pending request. Only its author may do this,
/// and the kind cannot change.
#[instrument(skip(db, payload), fields(actor_id = %actor.id))]
pub async fn update(
    db: &DatabaseConnection,
    actor: &Actor,
    request_id: i64,
    payload: RequestPayload,
) -> Result<resource_request::Model> {
    let txn = db.begin().await?;
    let request = load(&txn, request_id).await?;

    access::require_access(&txn, actor, request.project_id, Operation::Update).await?;
    confirmation::require_confirmed(&txn, actor, request.project_id).await?;

    if request.requested_by != actor.id {
        return Err(Error::AuthorizationDenied {
            actor_id: actor.id.clone(),
            project_id: request.project_id,
            operation: format!("edit request {request_id}"),
        });
    }
    if request.status != RequestStatus::Pending {
        return Err(invalid_transition(&request, "update", "only pending requests can be edited"));
    }
    if payload.kind != request.kind {
        return Err(Error::validation("the kind of a request cannot change"));
    }

    let catalogue = project::list_catalogue(&txn, request.project_id, request.kind).await?;
    validate_payload(&payload, &catalogue)?;

    let is_other = payload.item_name.trim().eq_ignore_ascii_case(OTHER_ITEM);
    let mut active: resource_request::ActiveModel = request.into();
    active.item_name = Set(if is_other {
        OTHER_ITEM.to_string()
    } else {
        payload.item_name.trim().to_string()
    });
    active.custom_name = Set(if is_other {
        non_blank(payload.custom_name)
    } else {
        None
    });
    active.quantity = Set(payload.quantity);
    active.size_or_grade = Set(non_blank(payload.size_or_grade));
    active.specification = Set(non_blank(payload.specification));
    active.priority = Set(payload.priority);
    active.area_in_use = Set(non_blank(payload.area_in_use));
    active.request_type = Set(payload.request_type);
    active.return_date = Set(payload.return_date);
    active.updated_at = Set(chrono::Utc::now());

    let updated = match ResourceRequest::update(active)
        .filter(resource_request::Column::Status.eq(RequestStatus::Pending))
        .exec(&txn)
        .await
    {
        Ok(updated) => updated,
        Err(DbErr::RecordNotUpdated) => {
            return Err(Error::InvalidTransition {
                entity: "resource request",
                id: request_id,
                from: RequestStatus::Pending.to_string(),
                action: "update".to_string(),
                reason: "status changed concurrently".to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    txn.commit().await?;

    info!(request_id, "pending request edited");
    Ok(updated)
}

/// Approves or rejects a pending request. A rejection must carry comments.
#[instrument(skip(db, comments), fields(actor_id = %actor.id))]
pub async fn review(
    db: &DatabaseConnection,
    actor: &Actor,
    request_id: i64,
    decision: Decision,
    comments: &str,
) -> Result<resource_request::Model> {
    let comments = comments.trim();
    if decision == Decision::Reject && comments.is_empty() {
        return Err(Error::validation("a rejection must include comments"));
    }

    let txn = db.begin().await?;
    let request = load(&txn, request_id).await?;
    require_reviewer(actor, &request, decision.action())?;

    let reviewer = actor.id.clone();
    let comments = (!comments.is_empty()).then(|| comments.to_string());
    let updated = transition(&txn, actor, request, decision.action(), |active| {
        active.reviewed_by = Set(Some(reviewer));
        active.reviewed_at = Set(Some(chrono::Utc::now()));
        active.review_comments = Set(comments);
    })
    .await?;
    txn.commit().await?;
    Ok(updated)
}

/// Records that an approved request has reached site.
#[instrument(skip(db, delivery), fields(actor_id = %actor.id))]
pub async fn mark_delivered(
    db: &DatabaseConnection,
    actor: &Actor,
    request_id: i64,
    delivery: DeliveryInfo,
) -> Result<resource_request::Model> {
    let delivered_by = delivery.delivered_by.trim().to_string();
    if delivered_by.is_empty() {
        return Err(Error::validation("delivered by cannot be empty"));
    }
    if let Some(cost) = delivery.cost {
        if !cost.is_finite() || cost < 0.0 {
            return Err(Error::validation(format!(
                "delivery cost must be a non-negative amount, got {cost}"
            )));
        }
    }

    let txn = db.begin().await?;
    let request = load(&txn, request_id).await?;
    require_reviewer(actor, &request, RequestAction::Deliver)?;

    let notes = non_blank(delivery.notes);
    let updated = transition(&txn, actor, request, RequestAction::Deliver, |active| {
        active.delivered_by = Set(Some(delivered_by));
        active.delivered_at = Set(Some(chrono::Utc::now()));
        active.delivery_cost = Set(delivery.cost);
        active.delivery_notes = Set(notes);
    })
    .await?;
    txn.commit().await?;
    Ok(updated)
}

/// Records that a delivered tool has come back. Material requests have no return.
#[instrument(skip(db), fields(actor_id = %actor.id))]
pub async fn mark_returned(
    db: &DatabaseConnection,
    actor: &Actor,
    request_id: i64,
    condition: &str,
) -> Result<resource_request::Model> {
    let condition = condition.trim().to_string();
    if condition.is_empty() {
        return Err(Error::validation("return condition cannot be empty"));
    }

    let txn = db.begin().await?;
    let request = load(&txn, request_id).await?;
    require_reviewer(actor, &request, RequestAction::Return)?;

    let updated = transition(&txn, actor, request, RequestAction::Return, |active| {
        active.returned_at = Set(Some(chrono::Utc::now()));
        active.return_condition = Set(Some(condition));
    })
    .await?;
    txn.commit().await?;
    Ok(updated)
}

/// Withdraws a pending or approved request.
#[instrument(skip(db, reason), fields(actor_id = %actor.id))]
pub async fn cancel(
    db: &DatabaseConnection,
    actor: &Actor,
    request_id: i64,
    reason: Option<String>,
) -> Result<resource_request::Model> {
    let txn = db.begin().await?;
    let request = load(&txn, request_id).await?;
    require_reviewer(actor, &request, RequestAction::Cancel)?;

    let canceller = actor.id.clone();
    let reason = non_blank(reason);
    let updated = transition(&txn, actor, request, RequestAction::Cancel, |active| {
        active.cancelled_by = Set(Some(canceller));
        active.cancelled_at = Set(Some(chrono::Utc::now()));
        active.cancel_reason = Set(reason);
    })
    .await?;
    txn.commit().await?;
    Ok(updated)
}

/// Reads one request. Supervisors may read only their own.
pub async fn get_request(
    db: &DatabaseConnection,
    actor: &Actor,
    request_id: i64,
) -> Result<resource_request::Model> {
    let request = load(db, request_id).await?;
    access::require_access(db, actor, request.project_id, Operation::Read).await?;

    match access::visible_requester(actor) {
        Some(owner) if owner != request.requested_by => Err(Error::AuthorizationDenied {
            actor_id: actor.id.clone(),
            project_id: request.project_id,
            operation: format!("read request {request_id}"),
        }),
        _ => Ok(request),
    }
}

/// Lists a project's requests, newest first. Supervisors see only their own.
pub async fn list_requests(
    db: &DatabaseConnection,
    actor: &Actor,
    project_id: i64,
    filter: RequestFilter,
) -> Result<Vec<resource_request::Model>> {
    access::require_access(db, actor, project_id, Operation::Read).await?;

    let mut query =
        ResourceRequest::find().filter(resource_request::Column::ProjectId.eq(project_id));
    if let Some(owner) = access::visible_requester(actor) {
        query = query.filter(resource_request::Column::RequestedBy.eq(owner));
    }
    if let Some(kind) = filter.kind {
        query = query.filter(resource_request::Column::Kind.eq(kind));
    }
    if let Some(status) = filter.status {
        query = query.filter(resource_request::Column::Status.eq(status));
    }

    query
        .order_by_desc(resource_request::Column::RequestedAt)
        .order_by_desc(resource_request::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Every request of a project, unfiltered, oldest first. For the aggregate's read model.
pub(crate) async fn list_project_requests<C>(
    conn: &C,
    project_id: i64,
) -> Result<Vec<resource_request::Model>>
where
    C: ConnectionTrait,
{
    ResourceRequest::find()
        .filter(resource_request::Column::ProjectId.eq(project_id))
        .order_by_asc(resource_request::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Number of pending requests of one kind on a project.
pub async fn count_pending<C>(conn: &C, project_id: i64, kind: RequestKind) -> Result<u64>
where
    C: ConnectionTrait,
{
    ResourceRequest::find()
        .filter(resource_request::Column::ProjectId.eq(project_id))
        .filter(resource_request::Column::Kind.eq(kind))
        .filter(resource_request::Column::Status.eq(RequestStatus::Pending))
        .count(conn)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    #![allow(clippy::panic)]
    use super::*;
    use crate::core::confirmation::{Acknowledgement, acknowledge, advance, finalize};
    use crate::core::events::list_events;
    use crate::test_utils::*;

    fn catalogue() -> Vec<String> {
        vec!["Cement".to_string(), "Sand".to_string()]
    }

    #[test]
    fn test_validate_payload() {
        let ok = RequestPayload::material("cement", 10, Priority::High);
        assert!(validate_payload(&ok, &catalogue()).is_ok());

        let cases = [
            RequestPayload::material("Cement", 0, Priority::Low),
            RequestPayload::material("Cement", -4, Priority::Low),
            RequestPayload::material("   ", 1, Priority::Low),
            RequestPayload::material("Granite", 1, Priority::Low),
            RequestPayload::material("x", 1, Priority::Low).other("  "),
            RequestPayload {
                request_type: Some(ToolRequestType::Rent),
                ..RequestPayload::material("Cement", 1, Priority::Low)
            },
            RequestPayload {
                request_type: None,
                ..RequestPayload::tool("Cement", 1, Priority::Low, ToolRequestType::Borrow)
            },
        ];
        for payload in cases {
            assert!(
                matches!(
                    validate_payload(&payload, &catalogue()),
                    Err(Error::Validation { .. })
                ),
                "expected validation error for {payload:?}"
            );
        }

        let other = RequestPayload::material("x", 2, Priority::Medium).other("Curing compound");
        assert!(validate_payload(&other, &catalogue()).is_ok());
    }

    #[tokio::test]
    async fn test_submit_requires_confirmation_then_succeeds() -> Result<()> {
        let (db, project) = setup_with_project().await?;
        let sup = supervisor();

        // Even an invalid payload is told to confirm first.
        for payload in [
            material_payload(),
            RequestPayload::material("Cement", 0, Priority::Low),
        ] {
            let result = submit(&db, &sup, project.id, payload).await;
            assert!(matches!(result, Err(Error::ConfirmationRequired { .. })));
        }

        acknowledge(&db, &sup, project.id, Acknowledgement::ScopeReviewed).await?;
        advance(&db, &sup, project.id).await?;
        acknowledge(&db, &sup, project.id, Acknowledgement::MaterialsReviewed).await?;
        advance(&db, &sup, project.id).await?;
        acknowledge(&db, &sup, project.id, Acknowledgement::ToolsReviewed).await?;
        acknowledge(&db, &sup, project.id, Acknowledgement::ResponsibilityAccepted).await?;
        finalize(&db, &sup, project.id, None).await?;

        let request = submit(&db, &sup, project.id, material_payload()).await?;
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.requested_by, sup.id);
        assert!(request.reviewed_by.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_submit_by_non_member_and_validation() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;

        let result = submit(
            &db,
            &Actor::supervisor("sup-stranger"),
            project.id,
            material_payload(),
        )
        .await;
        assert!(matches!(result, Err(Error::AuthorizationDenied { .. })));

        let result = submit(
            &db,
            &sup,
            project.id,
            RequestPayload::material("Granite", 3, Priority::Low),
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = submit(&db, &sup, 999, material_payload()).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "project", .. })));

        let other = submit(
            &db,
            &sup,
            project.id,
            RequestPayload::material("whatever", 4, Priority::Critical).other("Curing compound"),
        )
        .await?;
        assert_eq!(other.item_name, OTHER_ITEM);
        assert_eq!(other.display_name(), "Curing compound");
        Ok(())
    }

    #[tokio::test]
    async fn test_review_approve_and_reject() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let first = submit(&db, &sup, project.id, material_payload()).await?;
        let second = submit(&db, &sup, project.id, material_payload()).await?;

        let approved = review(&db, &admin(), first.id, Decision::Approve, "").await?;
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.reviewed_by.as_deref(), Some("admin-olu"));
        assert!(approved.reviewed_at.is_some());
        assert!(approved.review_comments.is_none());

        let result = review(&db, &admin(), second.id, Decision::Reject, "").await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        let result = review(&db, &admin(), second.id, Decision::Reject, "   ").await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let rejected = review(&db, &admin(), second.id, Decision::Reject, "stock out").await?;
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.review_comments.as_deref(), Some("stock out"));

        // Reviewing again is not possible from a terminal or approved state.
        let result = review(&db, &admin(), first.id, Decision::Reject, "changed mind").await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_supervisor_cannot_review_own_request() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let request = submit(&db, &sup, project.id, material_payload()).await?;

        let result = review(&db, &sup, request.id, Decision::Approve, "").await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));

        let result = cancel(&db, &sup, request.id, None).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));

        let unchanged = get_request(&db, &sup, request.id).await?;
        assert_eq!(unchanged.status, RequestStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_reviews_have_one_winner() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let request = submit(&db, &sup, project.id, material_payload()).await?;
        let reviewer_a = Actor::admin("admin-olu");
        let reviewer_b = Actor::super_admin("root");

        let (approve, reject) = tokio::join!(
            review(&db, &reviewer_a, request.id, Decision::Approve, "ok"),
            review(&db, &reviewer_b, request.id, Decision::Reject, "stock out"),
        );

        let winner = match (approve, reject) {
            (Ok(won), Err(Error::InvalidTransition { .. }))
            | (Err(Error::InvalidTransition { .. }), Ok(won)) => won,
            other => panic!("expected exactly one winner, got {other:?}"),
        };

        let stored = get_request(&db, &admin(), request.id).await?;
        assert_eq!(stored.status, winner.status);
        assert_eq!(stored.reviewed_by, winner.reviewed_by);

        let transitions: Vec<_> = list_events(&db, project.id)
            .await?
            .into_iter()
            .filter(|e| {
                matches!(e.kind, EventKind::RequestApproved | EventKind::RequestRejected)
            })
            .collect();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].new_state, winner.status.to_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_material_cannot_be_returned() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let request = submit(&db, &sup, project.id, material_payload()).await?;
        review(&db, &admin(), request.id, Decision::Approve, "").await?;

        let result = mark_returned(&db, &admin(), request.id, "good").await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));

        let delivered = mark_delivered(&db, &admin(), request.id, delivery()).await?;
        assert_eq!(delivered.status, RequestStatus::Delivered);
        assert_eq!(delivered.delivery_cost, Some(1250.0));

        let result = mark_returned(&db, &admin(), request.id, "good").await;
        assert!(matches!(
            result,
            Err(Error::InvalidTransition { ref reason, .. }) if reason.contains("is final")
        ));
        let result = cancel(&db, &admin(), request.id, None).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_full_lifecycle() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let request = submit(&db, &sup, project.id, tool_payload()).await?;
        assert_eq!(request.request_type, Some(ToolRequestType::Rent));

        // Delivery must follow approval.
        let result = mark_delivered(&db, &admin(), request.id, delivery()).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));

        review(&db, &admin(), request.id, Decision::Approve, "rent for two weeks").await?;
        let result = mark_returned(&db, &admin(), request.id, "good").await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));

        mark_delivered(&db, &admin(), request.id, delivery()).await?;
        let result = mark_returned(&db, &admin(), request.id, " ").await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let returned = mark_returned(&db, &admin(), request.id, "minor wear").await?;
        assert_eq!(returned.status, RequestStatus::Returned);
        assert_eq!(returned.return_condition.as_deref(), Some("minor wear"));
        assert!(returned.returned_at.is_some());

        let kinds: Vec<EventKind> = list_events(&db, project.id)
            .await?
            .into_iter()
            .filter(|e| e.entity_id == request.id.to_string())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::RequestSubmitted,
                EventKind::RequestApproved,
                EventKind::RequestDelivered,
                EventKind::RequestReturned,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_delivery_validation() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let request = submit(&db, &sup, project.id, material_payload()).await?;
        review(&db, &admin(), request.id, Decision::Approve, "").await?;

        for bad in [
            DeliveryInfo {
                delivered_by: String::new(),
                ..delivery()
            },
            DeliveryInfo {
                cost: Some(-1.0),
                ..delivery()
            },
            DeliveryInfo {
                cost: Some(f64::NAN),
                ..delivery()
            },
        ] {
            let result = mark_delivered(&db, &admin(), request.id, bad).await;
            assert!(matches!(result, Err(Error::Validation { .. })));
        }

        let stored = get_request(&db, &admin(), request.id).await?;
        assert_eq!(stored.status, RequestStatus::Approved);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_pending_and_approved() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let pending = submit(&db, &sup, project.id, material_payload()).await?;
        let approved = submit(&db, &sup, project.id, tool_payload()).await?;
        review(&db, &admin(), approved.id, Decision::Approve, "").await?;

        let cancelled = cancel(&db, &admin(), pending.id, Some("duplicate".to_string())).await?;
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("duplicate"));
        assert_eq!(cancelled.cancelled_by.as_deref(), Some("admin-olu"));

        let cancelled = cancel(&db, &Actor::super_admin("root"), approved.id, None).await?;
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(cancelled.cancel_reason.is_none());

        let result = cancel(&db, &admin(), pending.id, None).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_only_own_pending() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let request = submit(&db, &sup, project.id, material_payload()).await?;

        let edited = update(
            &db,
            &sup,
            request.id,
            RequestPayload::material("Sand", 25, Priority::Critical).area("Block A slab"),
        )
        .await?;
        assert_eq!(edited.item_name, "Sand");
        assert_eq!(edited.quantity, 25);
        assert_eq!(edited.priority, Priority::Critical);
        assert_eq!(edited.area_in_use.as_deref(), Some("Block A slab"));
        assert_eq!(edited.status, RequestStatus::Pending);

        let other_sup = add_confirmed_supervisor(&db, project.id, "sup-ben").await?;
        let result = update(&db, &other_sup, request.id, material_payload()).await;
        assert!(matches!(result, Err(Error::AuthorizationDenied { .. })));

        let result = update(&db, &sup, request.id, tool_payload()).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        review(&db, &admin(), request.id, Decision::Approve, "").await?;
        let result = update(&db, &sup, request.id, material_payload()).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_visibility() -> Result<()> {
        let (db, project, sup) = setup_with_confirmed_supervisor().await?;
        let other_sup = add_confirmed_supervisor(&db, project.id, "sup-ben").await?;

        let mine = submit(&db, &sup, project.id, material_payload()).await?;
        submit(&db, &sup, project.id, tool_payload()).await?;
        let theirs = submit(&db, &other_sup, project.id, material_payload()).await?;

        let own = list_requests(&db, &sup, project.id, RequestFilter::default()).await?;
        assert_eq!(own.len(), 2);
        assert!(own.iter().all(|r| r.requested_by == sup.id));

        let all = list_requests(&db, &admin(), project.id, RequestFilter::default()).await?;
        assert_eq!(all.len(), 3);
        // Newest first.
        assert_eq!(all[0].id, theirs.id);

        let materials = list_requests(
            &db,
            &admin(),
            project.id,
            RequestFilter {
                kind: Some(RequestKind::Material),
                status: Some(RequestStatus::Pending),
            },
        )
        .await?;
        assert_eq!(materials.len(), 2);

        let result = get_request(&db, &sup, theirs.id).await;
        assert!(matches!(result, Err(Error::AuthorizationDenied { .. })));
        assert_eq!(get_request(&db, &sup, mine.id).await?.id, mine.id);

        let result = list_requests(
            &db,
            &Actor::supervisor("sup-stranger"),
            project.id,
            RequestFilter::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::AuthorizationDenied { .. })));

        assert_eq!(count_pending(&db, project.id, RequestKind::Material).await?, 2);
        assert_eq!(count_pending(&db, project.id, RequestKind::Tool).await?, 1);
        Ok(())
    }
}
