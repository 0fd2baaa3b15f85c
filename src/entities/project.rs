//! Project entity - The root every scope item, catalogue entry, membership,
//! confirmation record and resource request hangs off.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    /// Unique identifier for the project
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable project name, unique across the store
    #[sea_orm(unique)]
    pub name: String,
    /// When the project was defined
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Project and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One project has many scope items
    #[sea_orm(has_many = "super::scope_item::Entity")]
    ScopeItems,
    /// One project has many resource requests
    #[sea_orm(has_many = "super::resource_request::Entity")]
    ResourceRequests,
    /// One project has many members
    #[sea_orm(has_many = "super::project_member::Entity")]
    Members,
}

impl Related<super::scope_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScopeItems.def()
    }
}

impl Related<super::resource_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceRequests.def()
    }
}

impl Related<super::project_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
