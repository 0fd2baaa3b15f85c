//! Project membership entity - Which actors are attached to which project.
//!
//! Admins and super admins are implicitly members of every project, so rows
//! normally exist only for supervisors.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an actor, as supplied by the identity provider
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum Role {
    /// Site supervisor, scoped to the projects they are assigned to
    #[sea_orm(string_value = "supervisor")]
    Supervisor,

    /// Office admin, may review any request
    #[sea_orm(string_value = "admin")]
    Admin,

    /// Super admin, same powers as admin across the whole store
    #[sea_orm(string_value = "superadmin")]
    SuperAdmin,
}

impl Role {
    /// Admin and super admin are members of every project.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Supervisor => "supervisor",
            Self::Admin => "admin",
            Self::SuperAdmin => "superadmin",
        })
    }
}

/// Project membership database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_members")]
pub struct Model {
    /// Project id (composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub project_id: i64,

    /// Actor id from the identity provider (composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub actor_id: String,

    /// Role the actor holds on this project
    pub role: Role,

    /// When the actor was attached to the project
    pub assigned_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Membership belongs to a project
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
