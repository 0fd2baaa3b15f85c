//! Workflow event entity - One row per state transition, written in the same
//! database transaction as the change it describes.
//!
//! The notification and reporting layers poll this table; nothing in the core reads it back.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What happened
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum EventKind {
    #[sea_orm(string_value = "request_submitted")]
    RequestSubmitted,
    #[sea_orm(string_value = "request_approved")]
    RequestApproved,
    #[sea_orm(string_value = "request_rejected")]
    RequestRejected,
    #[sea_orm(string_value = "request_delivered")]
    RequestDelivered,
    #[sea_orm(string_value = "request_returned")]
    RequestReturned,
    #[sea_orm(string_value = "request_cancelled")]
    RequestCancelled,
    #[sea_orm(string_value = "scope_updated")]
    ScopeUpdated,
    #[sea_orm(string_value = "confirmation_finalized")]
    ConfirmationFinalized,
}

/// Workflow event database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workflow_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub project_id: i64,
    pub kind: EventKind,
    /// Id of the request, scope item, or supervisor the event is about
    pub entity_id: String,
    /// State of the entity after the transition
    pub new_state: String,
    pub actor_id: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
