//! Project aggregate - The read boundary other collaborators use, plus the
//! metadata-side operations that define projects.
//!
//! [`snapshot`] and [`compute_stats`] are pure queries over the ledger, the request
//! lifecycle and the confirmation gate; they never trigger a transition. Project
//! definition ([`create_project`], [`assign_supervisor`], [`seed_projects`]) is the
//! only place scope totals and catalogues are written.

use crate::{
    config::projects::{Config, ProjectConfig},
    core::{access, confirmation, ledger, request},
    entities::{
        CatalogueItem, ConfirmationModel, Project, RequestKind, Role, catalogue_item, project,
        project_member, resource_request, scope_item,
    },
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// One bill-of-quantities line of a new project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScopeItem {
    pub label: String,
    pub total: i64,
}

/// Everything needed to define a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub scope: Vec<NewScopeItem>,
    pub materials: Vec<String>,
    pub tools: Vec<String>,
}

impl From<&ProjectConfig> for NewProject {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            name: config.name.clone(),
            scope: config
                .scope
                .iter()
                .map(|line| NewScopeItem {
                    label: line.label.clone(),
                    total: line.total,
                })
                .collect(),
            materials: config.materials.clone(),
            tools: config.tools.clone(),
        }
    }
}

/// Read-only composite of a project's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSnapshot {
    pub project: project::Model,
    pub scope_items: Vec<scope_item::Model>,
    pub materials: Vec<String>,
    pub tools: Vec<String>,
    pub resource_requests: Vec<resource_request::Model>,
    pub confirmations: Vec<ConfirmationModel>,
    pub membership: Vec<project_member::Model>,
}

/// Figures the reporting layer needs for one project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStats {
    pub project_id: i64,
    pub pending_material_requests: u64,
    pub pending_tool_requests: u64,
    pub completion_percent: f64,
    pub fully_done_items: usize,
    pub scope_item_count: usize,
    pub unconfirmed_supervisors: u64,
}

fn validate_catalogue(kind: RequestKind, names: &[String]) -> Result<()> {
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation(format!("{kind} catalogue entries cannot be empty")));
        }
        if name.eq_ignore_ascii_case(request::OTHER_ITEM) {
            return Err(Error::validation(format!(
                "'{}' is reserved and cannot be a {kind} catalogue entry",
                request::OTHER_ITEM
            )));
        }
    }
    Ok(())
}

/// Retrieves a project by id.
pub async fn get_project<C>(conn: &C, project_id: i64) -> Result<project::Model>
where
    C: ConnectionTrait,
{
    Project::find_by_id(project_id)
        .one(conn)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "project",
            id: project_id.to_string(),
        })
}

/// Finds a project by its unique name.
pub async fn get_project_by_name<C>(conn: &C, name: &str) -> Result<Option<project::Model>>
where
    C: ConnectionTrait,
{
    Project::find()
        .filter(project::Column::Name.eq(name.trim()))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Lists all projects by id.
pub async fn list_projects<C>(conn: &C) -> Result<Vec<project::Model>>
where
    C: ConnectionTrait,
{
    Project::find()
        .order_by_asc(project::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Names in a project's material or tool catalogue, in definition order.
pub async fn list_catalogue<C>(conn: &C, project_id: i64, kind: RequestKind) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    Ok(CatalogueItem::find()
        .filter(catalogue_item::Column::ProjectId.eq(project_id))
        .filter(catalogue_item::Column::Kind.eq(kind))
        .order_by_asc(catalogue_item::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(|item| item.name)
        .collect())
}

/// Adds one entry to a project's catalogue.
pub async fn add_catalogue_item<C>(
    conn: &C,
    project_id: i64,
    kind: RequestKind,
    name: &str,
) -> Result<catalogue_item::Model>
where
    C: ConnectionTrait,
{
    validate_catalogue(kind, &[name.to_string()])?;
    let item = catalogue_item::ActiveModel {
        project_id: Set(project_id),
        kind: Set(kind),
        name: Set(name.trim().to_string()),
        ..Default::default()
    };
    item.insert(conn).await.map_err(Into::into)
}

/// Defines a project with its bill of quantities and catalogues in one transaction.
///
/// Scope lines start with nothing received or completed.
#[instrument(skip(db, new_project), fields(name = %new_project.name))]
pub async fn create_project(
    db: &DatabaseConnection,
    new_project: NewProject,
) -> Result<project::Model> {
    let name = new_project.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("project name cannot be empty"));
    }
    for line in &new_project.scope {
        if line.label.trim().is_empty() {
            return Err(Error::validation("scope item label cannot be empty"));
        }
        if line.total < 0 {
            return Err(Error::validation(format!(
                "scope item '{}' has a negative total ({})",
                line.label, line.total
            )));
        }
    }
    validate_catalogue(RequestKind::Material, &new_project.materials)?;
    validate_catalogue(RequestKind::Tool, &new_project.tools)?;

    let txn = db.begin().await?;
    if get_project_by_name(&txn, &name).await?.is_some() {
        return Err(Error::validation(format!("project '{name}' already exists")));
    }

    let now = chrono::Utc::now();
    let project = project::ActiveModel {
        name: Set(name),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for line in new_project.scope {
        scope_item::ActiveModel {
            project_id: Set(project.id),
            label: Set(line.label.trim().to_string()),
            total: Set(line.total),
            received_at_site: Set(0),
            completed: Set(0),
            remarks: Set(None),
            last_updated: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }
    for name in &new_project.materials {
        add_catalogue_item(&txn, project.id, RequestKind::Material, name).await?;
    }
    for name in &new_project.tools {
        add_catalogue_item(&txn, project.id, RequestKind::Tool, name).await?;
    }
    txn.commit().await?;

    info!(project_id = project.id, "project created");
    Ok(project)
}

/// Attaches a supervisor to a project and opens their pending confirmation.
/// Assigning an existing member returns the existing membership unchanged.
#[instrument(skip(db))]
pub async fn assign_supervisor(
    db: &DatabaseConnection,
    project_id: i64,
    actor_id: &str,
) -> Result<project_member::Model> {
    let actor_id = actor_id.trim();
    if actor_id.is_empty() {
        return Err(Error::validation("supervisor id cannot be empty"));
    }

    let txn = db.begin().await?;
    get_project(&txn, project_id).await?;

    if let Some(existing) = access::find_membership(&txn, project_id, actor_id).await? {
        txn.commit().await?;
        debug!(project_id, actor_id, "supervisor already assigned");
        return Ok(existing);
    }

    let membership = project_member::ActiveModel {
        project_id: Set(project_id),
        actor_id: Set(actor_id.to_string()),
        role: Set(Role::Supervisor),
        assigned_at: Set(chrono::Utc::now()),
    };
    let membership = membership.insert(&txn).await?;
    confirmation::open_record(&txn, project_id, actor_id).await?;
    txn.commit().await?;

    info!(project_id, actor_id, "supervisor assigned, confirmation pending");
    Ok(membership)
}

/// Creates every project from the config that does not exist yet and attaches its
/// supervisors. Returns the number of projects created.
pub async fn seed_projects(db: &DatabaseConnection, config: &Config) -> Result<usize> {
    let mut created = 0;
    for project_config in &config.projects {
        let project = match get_project_by_name(db, &project_config.name).await? {
            Some(existing) => {
                debug!(name = %existing.name, "project already present, skipping definition");
                existing
            }
            None => {
                created += 1;
                create_project(db, NewProject::from(project_config)).await?
            }
        };
        for supervisor in &project_config.supervisors {
            assign_supervisor(db, project.id, supervisor).await?;
        }
    }
    info!(created, configured = config.projects.len(), "projects seeded");
    Ok(created)
}

/// Everything known about a project, read in one transaction so the parts agree.
pub async fn snapshot(db: &DatabaseConnection, project_id: i64) -> Result<ProjectSnapshot> {
    let txn = db.begin().await?;
    let project = get_project(&txn, project_id).await?;

    let snapshot = ProjectSnapshot {
        scope_items: ledger::list_scope_items(&txn, project_id).await?,
        materials: list_catalogue(&txn, project_id, RequestKind::Material).await?,
        tools: list_catalogue(&txn, project_id, RequestKind::Tool).await?,
        resource_requests: request::list_project_requests(&txn, project_id).await?,
        confirmations: confirmation::list_records(&txn, project_id).await?,
        membership: access::list_members(&txn, project_id).await?,
        project,
    };
    txn.commit().await?;
    Ok(snapshot)
}

/// Reporting figures for one project.
pub async fn compute_stats<C>(conn: &C, project_id: i64) -> Result<ProjectStats>
where
    C: ConnectionTrait,
{
    get_project(conn, project_id).await?;
    let progress = ledger::aggregate_progress(conn, project_id).await?;

    Ok(ProjectStats {
        project_id,
        pending_material_requests: request::count_pending(conn, project_id, RequestKind::Material)
            .await?,
        pending_tool_requests: request::count_pending(conn, project_id, RequestKind::Tool).await?,
        completion_percent: progress.completion_percent,
        fully_done_items: progress.fully_done,
        scope_item_count: progress.item_count,
        unconfirmed_supervisors: confirmation::count_unconfirmed(conn, project_id).await?,
    })
}

/// Reporting figures for every project. Each project is read independently.
pub async fn compute_stats_all<C>(conn: &C) -> Result<Vec<ProjectStats>>
where
    C: ConnectionTrait,
{
    let mut stats = Vec::new();
    for project in list_projects(conn).await? {
        stats.push(compute_stats(conn, project.id).await?);
    }
    Ok(stats)
}
