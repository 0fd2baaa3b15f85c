use dotenvy::dotenv;
use sitework::{
    config::{database, projects},
    core::project,
    errors::Result,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Load .env first so RUST_LOG and DATABASE_URL from it are honoured
    let dotenv_loaded = dotenv().is_ok();

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    if !dotenv_loaded {
        info!("No .env file found, using the process environment.");
    }

    // 3. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 4. Seed projects from config.toml (or $SITEWORK_CONFIG), if present
    let config = match std::env::var("SITEWORK_CONFIG") {
        Ok(path) => projects::load_config(path),
        Err(_) => projects::load_default_config(),
    };
    match config {
        Ok(config) => {
            project::seed_projects(&db, &config)
                .await
                .inspect_err(|e| error!("Failed to seed projects: {}", e))?;
        }
        Err(e) => warn!("Skipping project seeding: {}", e),
    }

    // 5. Report where every project stands
    for stats in project::compute_stats_all(&db).await? {
        info!(
            project_id = stats.project_id,
            completion_percent = stats.completion_percent,
            fully_done = stats.fully_done_items,
            scope_items = stats.scope_item_count,
            pending_materials = stats.pending_material_requests,
            pending_tools = stats.pending_tool_requests,
            unconfirmed_supervisors = stats.unconfirmed_supervisors,
            "project status"
        );
    }

    Ok(())
}
