//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! grocer migrate
//! ```
//!
//! # Environment Variables
//!
//! - `GROCER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! Migrations live in `crates/orders/migrations/` and are embedded in the
//! binary.

use grocer_orders::{AppState, db};

use super::{CliError, print_json};

/// Apply all pending migrations.
pub async fn run(state: &AppState) -> Result<(), CliError> {
    tracing::info!("Running migrations...");
    db::migrate(state.pool()).await?;

    let applied: Vec<_> = db::MIGRATOR
        .iter()
        .map(|migration| format!("{}_{}", migration.version, migration.description))
        .collect();

    tracing::info!(count = applied.len(), "Migrations complete");
    print_json(&serde_json::json!({ "migrations": applied }))
}
