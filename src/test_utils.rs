//! Shared test utilities.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        actor::Actor,
        confirmation::{self, Acknowledgement},
        project::{self, NewProject, NewScopeItem},
        request::{DeliveryInfo, RequestPayload},
    },
    entities::{self, Priority, ToolRequestType},
    errors::Result,
};
use sea_orm::DatabaseConnection;

/// Actor id of the supervisor assigned by [`create_test_project`].
pub const SUPERVISOR_ID: &str = "sup-ana";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

pub fn supervisor() -> Actor {
    Actor::supervisor(SUPERVISOR_ID)
}

pub fn admin() -> Actor {
    Actor::admin("admin-olu")
}

/// Creates a test project with sensible defaults.
///
/// # Defaults
/// * scope: "Excavation (m3)" total 100, "Blockwork (m2)" total 50
/// * materials: "Cement", "Sand"
/// * tools: "Concrete Mixer", "Scaffold"
/// * supervisors: [`SUPERVISOR_ID`], unconfirmed
pub async fn create_test_project(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::project::Model> {
    let project = project::create_project(
        db,
        NewProject {
            name: name.to_string(),
            scope: vec![
                NewScopeItem {
                    label: "Excavation (m3)".to_string(),
                    total: 100,
                },
                NewScopeItem {
                    label: "Blockwork (m2)".to_string(),
                    total: 50,
                },
            ],
            materials: vec!["Cement".to_string(), "Sand".to_string()],
            tools: vec!["Concrete Mixer".to_string(), "Scaffold".to_string()],
        },
    )
    .await?;
    project::assign_supervisor(db, project.id, SUPERVISOR_ID).await?;
    Ok(project)
}

/// Walks `actor` through the whole confirmation review.
pub async fn confirm_supervisor(
    db: &DatabaseConnection,
    actor: &Actor,
    project_id: i64,
) -> Result<entities::confirmation::Model> {
    confirmation::acknowledge(db, actor, project_id, Acknowledgement::ScopeReviewed).await?;
    confirmation::advance(db, actor, project_id).await?;
    confirmation::acknowledge(db, actor, project_id, Acknowledgement::MaterialsReviewed).await?;
    confirmation::advance(db, actor, project_id).await?;
    confirmation::acknowledge(db, actor, project_id, Acknowledgement::ToolsReviewed).await?;
    confirmation::acknowledge(db, actor, project_id, Acknowledgement::ResponsibilityAccepted)
        .await?;
    confirmation::finalize(db, actor, project_id, None).await
}

/// Assigns another supervisor to a project and confirms them.
pub async fn add_confirmed_supervisor(
    db: &DatabaseConnection,
    project_id: i64,
    actor_id: &str,
) -> Result<Actor> {
    project::assign_supervisor(db, project_id, actor_id).await?;
    let actor = Actor::supervisor(actor_id);
    confirm_supervisor(db, &actor, project_id).await?;
    Ok(actor)
}

/// Sets up a database with one test project whose supervisor is still unconfirmed.
/// Returns (db, project) for common test scenarios.
pub async fn setup_with_project() -> Result<(DatabaseConnection, entities::project::Model)> {
    let db = setup_test_db().await?;
    let project = create_test_project(&db, "Riverside Block A").await?;
    Ok((db, project))
}

/// Sets up a database with one test project and its supervisor already confirmed.
/// Returns (db, project, supervisor).
pub async fn setup_with_confirmed_supervisor()
-> Result<(DatabaseConnection, entities::project::Model, Actor)> {
    let (db, project) = setup_with_project().await?;
    let actor = supervisor();
    confirm_supervisor(&db, &actor, project.id).await?;
    Ok((db, project, actor))
}

/// A valid catalogue material request.
pub fn material_payload() -> RequestPayload {
    RequestPayload::material("Cement", 40, Priority::High).area("Block A footing")
}

/// A valid catalogue tool rental.
pub fn tool_payload() -> RequestPayload {
    RequestPayload::tool("Concrete Mixer", 1, Priority::Medium, ToolRequestType::Rent)
}

pub fn delivery() -> DeliveryInfo {
    DeliveryInfo {
        delivered_by: "Central store".to_string(),
        cost: Some(1250.0),
        notes: None,
    }
}
