//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod catalogue_item;
pub mod confirmation;
pub mod project;
pub mod project_member;
pub mod resource_request;
pub mod scope_item;
pub mod workflow_event;

// Re-export specific types to avoid conflicts
pub use catalogue_item::{
    Column as CatalogueItemColumn, Entity as CatalogueItem, Model as CatalogueItemModel,
};
pub use confirmation::{
    Column as ConfirmationColumn, Entity as Confirmation, Model as ConfirmationModel, ReviewStep,
};
pub use project::{Column as ProjectColumn, Entity as Project, Model as ProjectModel};
pub use project_member::{
    Column as ProjectMemberColumn, Entity as ProjectMember, Model as ProjectMemberModel, Role,
};
pub use resource_request::{
    Column as ResourceRequestColumn, Entity as ResourceRequest, Model as ResourceRequestModel,
    Priority, RequestAction, RequestKind, RequestStatus, ToolRequestType,
};
pub use scope_item::{Column as ScopeItemColumn, Entity as ScopeItem, Model as ScopeItemModel};
pub use workflow_event::{
    Column as WorkflowEventColumn, Entity as WorkflowEvent, EventKind, Model as WorkflowEventModel,
};
