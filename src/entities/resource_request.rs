//! Resource request entity - A supervisor's ask for a material or a tool.
//!
//! One table serves both kinds; tool-only columns (`request_type`, `return_date`,
//! return details) stay `NULL` for materials. The status column is driven
//! exclusively by the lifecycle manager through [`RequestStatus::next`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Material or tool
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum RequestKind {
    #[sea_orm(string_value = "material")]
    Material,
    #[sea_orm(string_value = "tool")]
    Tool,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Material => "material",
            Self::Tool => "tool",
        })
    }
}

/// Request lifecycle state
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum RequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "returned")]
    Returned,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Actions that move a request between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestAction {
    Approve,
    Reject,
    Deliver,
    Return,
    Cancel,
}

impl RequestStatus {
    /// Transition table. Returns the target state, or `None` when `action` is not
    /// legal from `self` for a request of `kind`.
    ///
    /// ```text
    /// Pending  --approve--> Approved --deliver--> Delivered --return (tool)--> Returned
    /// Pending  --reject---> Rejected
    /// Pending | Approved --cancel--> Cancelled
    /// ```
    #[must_use]
    pub const fn next(self, kind: RequestKind, action: RequestAction) -> Option<Self> {
        match (self, action) {
            (Self::Pending, RequestAction::Approve) => Some(Self::Approved),
            (Self::Pending, RequestAction::Reject) => Some(Self::Rejected),
            (Self::Approved, RequestAction::Deliver) => Some(Self::Delivered),
            (Self::Delivered, RequestAction::Return) => match kind {
                RequestKind::Tool => Some(Self::Returned),
                RequestKind::Material => None,
            },
            (Self::Pending | Self::Approved, RequestAction::Cancel) => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// No further action is legal from a terminal state, whatever the kind.
    #[must_use]
    pub const fn is_terminal(self, kind: RequestKind) -> bool {
        match self {
            Self::Pending | Self::Approved => false,
            Self::Delivered => matches!(kind, RequestKind::Material),
            Self::Rejected | Self::Returned | Self::Cancelled => true,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Delivered => "delivered",
            Self::Returned => "returned",
            Self::Cancelled => "cancelled",
        })
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Deliver => "deliver",
            Self::Return => "return",
            Self::Cancel => "cancel",
        })
    }
}

/// Urgency set by the requesting supervisor
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum Priority {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "critical")]
    Critical,
}

/// How a requested tool is to be sourced
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum ToolRequestType {
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "rent")]
    Rent,
    #[sea_orm(string_value = "borrow")]
    Borrow,
}

/// Resource request database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub project_id: i64,
    pub kind: RequestKind,
    /// Catalogue name, or `"Other"` together with `custom_name`
    pub item_name: String,
    pub custom_name: Option<String>,
    pub quantity: i64,
    pub size_or_grade: Option<String>,
    pub specification: Option<String>,
    pub priority: Priority,
    pub area_in_use: Option<String>,
    pub status: RequestStatus,
    /// Actor id of the requesting supervisor
    pub requested_by: String,
    pub requested_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTimeUtc>,
    pub review_comments: Option<String>,
    /// Tool requests only
    pub request_type: Option<ToolRequestType>,
    /// Tool requests only
    pub return_date: Option<Date>,
    pub delivered_by: Option<String>,
    pub delivered_at: Option<DateTimeUtc>,
    pub delivery_cost: Option<f64>,
    pub delivery_notes: Option<String>,
    pub returned_at: Option<DateTimeUtc>,
    pub return_condition: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTimeUtc>,
    pub cancel_reason: Option<String>,
}

impl Model {
    /// The name to show for this request: the custom name for `"Other"` items.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.item_name)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each request belongs to one project
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
