//! Confirmation entity - Gate state for one (project, supervisor) pair.
//!
//! Created with `needs_confirmation = true` when a supervisor is assigned to a project.
//! Checklist flags are filled step by step; finalizing flips the gate exactly once and
//! freezes a JSON snapshot of what the supervisor reviewed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three sequential review steps
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
pub enum ReviewStep {
    #[sea_orm(string_value = "scope")]
    Scope,
    #[sea_orm(string_value = "materials")]
    Materials,
    #[sea_orm(string_value = "tools")]
    Tools,
}

impl ReviewStep {
    /// The step after this one, `None` for the last.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Scope => Some(Self::Materials),
            Self::Materials => Some(Self::Tools),
            Self::Tools => None,
        }
    }
}

impl fmt::Display for ReviewStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scope => "scope",
            Self::Materials => "materials",
            Self::Tools => "tools",
        })
    }
}

/// Confirmation record database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "confirmations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub project_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub supervisor_id: String,
    /// True until the supervisor finalizes the review
    pub needs_confirmation: bool,
    /// Step the supervisor is currently on
    pub step: ReviewStep,
    pub scope_reviewed: bool,
    pub materials_reviewed: bool,
    pub tools_reviewed: bool,
    pub responsibility_accepted: bool,
    pub confirmed_at: Option<DateTimeUtc>,
    /// Frozen copy of the scope, materials and tools lists at finalize time
    pub snapshot: Option<Json>,
    pub remarks: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
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
