//! Grocer CLI - migrations and operations on carts, orders and images.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! grocer migrate
//!
//! # Add an item to user 7's cart and check out
//! grocer --user 7 cart add "Milk" 1 --store Edeka
//! grocer --user 7 order checkout 3 2025-01-08 evening
//!
//! # Admin suggests a date, customer accepts it
//! grocer --user 1 order suggest 42 2025-01-10 morning
//! grocer --user 7 order accept-suggestion 42
//!
//! # Inspect a transport string
//! grocer image decode 'MULTI:...'
//! ```
//!
//! Results are printed as JSON on stdout. Failures print an error body
//! `{"kind": ..., "message": ...}` and exit with status 1.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use grocer_orders::{LogFormat, OrdersConfig};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{CartAction, CliError, ImageAction, OrderAction};

#[derive(Parser)]
#[command(name = "grocer")]
#[command(author, version, about = "Grocer order engine tools")]
struct Cli {
    /// User id to act as. Admins act as admin, everyone else as customer.
    #[arg(short, long, global = true)]
    user: Option<i32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage the active cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Create orders and drive their lifecycle
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Manage item images and transport strings
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &OrdersConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Logs go to stderr; stdout carries the JSON results.
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "grocer_orders=info,grocer_cli=info".into());

    let json = format == LogFormat::Json;
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Transport string tools work offline.
    if let Commands::Image { action } = &cli.command
        && let Some(result) = commands::image::run_offline(action)
    {
        init_tracing(LogFormat::default());
        std::process::exit(exit_code(result));
    }

    let config = match OrdersConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::default());
            std::process::exit(exit_code(Err(CliError::Config(e))));
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    let code = exit_code(run(cli, config).await);
    // Flush pending Sentry events before exiting
    drop(sentry_guard);
    std::process::exit(code);
}

async fn run(cli: Cli, config: OrdersConfig) -> Result<(), CliError> {
    let state = commands::connect(config).await?;
    match cli.command {
        Commands::Migrate => commands::migrate::run(&state).await,
        Commands::Cart { action } => commands::cart::run(&state, cli.user, action).await,
        Commands::Order { action } => commands::order::run(&state, cli.user, action).await,
        Commands::Image { action } => commands::image::run(&state, cli.user, action).await,
    }
}

fn exit_code(result: Result<(), CliError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            commands::print_error(&e);
            1
        }
    }
}
