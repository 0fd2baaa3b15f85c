//! Scope item entity - One line of a project's bill of quantities.
//!
//! `total` is fixed when the project is defined. `received_at_site` and `completed`
//! only move through the quantity ledger, which keeps
//! `0 <= completed <= received_at_site <= total`. Balance and available figures are
//! derived on read and never stored.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Scope item database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scope_items")]
pub struct Model {
    /// Unique identifier for the scope item
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning project
    pub project_id: i64,
    /// Description of the work line (e.g., "Excavation (m3)")
    pub label: String,
    /// Required quantity, immutable after creation
    pub total: i64,
    /// Quantity physically delivered to site
    pub received_at_site: i64,
    /// Quantity of work finished
    pub completed: i64,
    /// Free-text site remarks
    pub remarks: Option<String>,
    /// When quantities or remarks last changed
    pub last_updated: DateTimeUtc,
}

impl Model {
    /// Work not yet delivered to site (`total - received_at_site`).
    #[must_use]
    pub const fn balance(&self) -> i64 {
        self.total - self.received_at_site
    }

    /// Delivered but not yet consumed by completed work (`received_at_site - completed`).
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.received_at_site - self.completed
    }

    /// Whether the line has been completed in full.
    #[must_use]
    pub const fn is_fully_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// Defines relationships between ScopeItem and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each scope item belongs to one project
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
