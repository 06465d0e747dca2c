//! CLI subcommands.

pub mod cart;
pub mod image;
pub mod migrate;
pub mod order;

use grocer_core::{Actor, UserId};
use grocer_orders::{AppState, ConfigError, ErrorBody, ErrorKind, OrdersConfig, ServiceError, db};
use serde::Serialize;
use thiserror::Error;

pub use cart::CartAction;
pub use image::ImageAction;
pub use order::OrderAction;

/// Errors that end a CLI run.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or inconsistent arguments.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn body(&self) -> ErrorBody {
        match self {
            Self::Service(e) => e.report(),
            Self::Usage(message) => ErrorBody {
                kind: ErrorKind::Validation,
                message: message.clone(),
            },
            Self::Json(e) => ErrorBody {
                kind: ErrorKind::Validation,
                message: format!("invalid JSON: {e}"),
            },
            Self::Config(_) | Self::Database(_) | Self::Migration(_) | Self::Io(_) => {
                tracing::error!(error = %self, "Command failed");
                ErrorBody {
                    kind: ErrorKind::Internal,
                    message: self.to_string(),
                }
            }
        }
    }
}

/// Create the pool and engine state.
pub async fn connect(config: OrdersConfig) -> Result<AppState, CliError> {
    tracing::debug!("Connecting to database...");
    let pool = db::create_pool(&config.database_url, config.max_connections).await?;
    Ok(AppState::new(config, pool))
}

/// The `--user` argument, required by most commands.
pub fn require_user(user: Option<i32>) -> Result<UserId, CliError> {
    user.map(UserId::new)
        .ok_or_else(|| CliError::Usage("--user <id> is required for this command".to_string()))
}

/// Resolve `--user` to an actor through the user directory.
pub async fn require_actor(state: &AppState, user: Option<i32>) -> Result<Actor, CliError> {
    let user_id = require_user(user)?;
    Ok(state.orders().actor_for(user_id).await?)
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}

/// Print the error body as JSON on stdout.
pub fn print_error(error: &CliError) {
    let body = error.body();
    let json = serde_json::to_string_pretty(&body)
        .unwrap_or_else(|_| format!(r#"{{"kind":"internal","message":"{}"}}"#, body.message));
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_require_user() {
        assert_eq!(require_user(Some(7)).unwrap(), UserId::new(7));
        assert!(matches!(require_user(None), Err(CliError::Usage(_))));
    }

    #[test]
    fn test_error_bodies() {
        let body = CliError::Usage("--user <id> is required".into()).body();
        assert_eq!(body.kind, ErrorKind::Validation);

        let body = CliError::Service(ServiceError::Locked("order is locked".into())).body();
        assert_eq!(body.kind, ErrorKind::Locked);
        assert_eq!(body.message, "order is locked");
    }
}
