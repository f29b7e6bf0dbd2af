use std::process;

use clap::{Parser, Subcommand};
use comfy_table::{modifiers, presets, ContentArrangement, Table};
use terminal_size::{terminal_size, Width};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::fmt;

use instance_admin::config::{self, AppConfig};
use instance_admin::crypto::SecretBox;
use instance_admin::db::{self, DbPool};
use instance_admin::models::instance_configuration::SECRET_MASK;
use instance_admin::models::AppState;
use instance_admin::services::configuration_service::{self, DEFAULT_CONFIGURATIONS};
use instance_admin::services::{admin_service, instance_service};

#[derive(Parser)]
#[command(
    name = "instance-admin",
    author,
    version,
    about = "Administrative API server for a self-hosted instance",
    long_about = r#"Runs the instance administration API and provides the one-off commands an operator
needs around it: registering the instance, seeding its configuration keys and
inspecting admins and configuration from the shell.

Examples:
  1) Register the instance, seed configuration, then serve:
      instance-admin register-instance --name plane
      instance-admin configure-instance
      instance-admin serve --port 8080
  2) Inspect state:
      instance-admin configurations list
      instance-admin admins list
"#,
    after_help = "Use `instance-admin <subcommand> --help` to get subcommand specific options."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to .env file
    #[arg(long, global = true)]
    env_file: Option<String>,
    /// Disable colorized output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Host to bind to (overrides HOST)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the instance record if it does not exist yet
    RegisterInstance {
        /// Machine name of the instance
        #[arg(long)]
        name: String,
    },
    /// Seed known configuration keys from environment variables
    #[command(long_about = "Insert every known configuration key that is not stored yet, taking its value from the environment variable of the same name. Secret keys are encrypted with SECRET_KEY. Existing keys are never overwritten.")]
    ConfigureInstance,
    /// Inspect instance configuration
    Configurations {
        #[command(subcommand)]
        sub: ListCommand,
    },
    /// Inspect instance admins
    Admins {
        #[command(subcommand)]
        sub: ListCommand,
    },
}

#[derive(Subcommand)]
enum ListCommand {
    /// Print a table
    List,
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    tracing::error!(error = %err, "{context}");
    eprintln!("{}: {}", yansi::Paint::red(context), err);
    process::exit(1);
}

async fn open_db() -> DbPool {
    let url = config::get_database_url();
    match db::init_db(&url).await {
        Ok(pool) => pool,
        Err(e) => fail(&format!("Failed to open database {url}"), e),
    }
}

fn secret_box() -> SecretBox {
    match config::get_secret_key() {
        Ok(key) => SecretBox::from_secret(&key),
        Err(e) => fail("Configuration error", e),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

async fn start_server(host: Option<String>, port: Option<u16>) {
    let app_config = match AppConfig::from_env(host.as_deref(), port) {
        Ok(c) => c,
        Err(e) => fail("Configuration error", e),
    };
    tracing::debug!(config = ?app_config, "Loaded configuration");

    let pool = match db::init_db(&app_config.database_url).await {
        Ok(pool) => pool,
        Err(e) => fail(&format!("Failed to open database {}", app_config.database_url), e),
    };
    let state = AppState::new(
        pool,
        SecretBox::from_secret(&app_config.secret_key),
        app_config.cache_ttl,
    );
    let app = instance_admin::build_router(state);

    let addr = app_config.listen_addr;
    tracing::info!(%addr, "Starting instance admin server");
    println!(
        "{} {}",
        yansi::Paint::new("API server running on").green(),
        yansi::Paint::new(format!("http://{}/api/", addr)).cyan()
    );
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%e, "Failed to bind to address; is the port already in use?");
            eprintln!(
                "{}: {}\n{}",
                yansi::Paint::new(format!("Failed to bind to {}", addr)).red(),
                e,
                yansi::Paint::new("Stop any process using this port, or start the server with a different --port value.").yellow()
            );
            process::exit(1);
        }
    };
    let service = app.into_make_service_with_connect_info::<std::net::SocketAddr>();
    if let Err(e) = axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        fail("Server error", e);
    }
}

fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("(empty list)");
        return;
    }
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if let Some((Width(w), _)) = terminal_size() {
        table.set_width(w.saturating_sub(4));
    }
    table.set_header(headers.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("\n{table}\n");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.no_color {
        yansi::whenever(yansi::Condition::NEVER);
    }
    // Before the subscriber, so RUST_LOG may come from the .env file.
    config::load_env_file(cli.env_file.as_deref());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(config::log_filter())
        .init();

    match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Serve { host, port } => start_server(host, port).await,
        Commands::RegisterInstance { name } => {
            let pool = open_db().await;
            match instance_service::register_instance(&pool, name.trim(), env!("CARGO_PKG_VERSION")).await {
                Ok((instance, true)) => println!(
                    "{} '{}' ({})",
                    yansi::Paint::new("Instance registered:").green(),
                    instance.instance_name,
                    instance.id
                ),
                Ok((instance, false)) => println!(
                    "{} '{}'",
                    yansi::Paint::new("Instance already registered:").yellow(),
                    instance.instance_name
                ),
                Err(e) => fail("Failed to register instance", e),
            }
        }
        Commands::ConfigureInstance => {
            let secrets = secret_box();
            let pool = open_db().await;
            match configuration_service::seed_configurations(&pool, &secrets, DEFAULT_CONFIGURATIONS).await {
                Ok(inserted) => println!(
                    "{} {} new, {} already present",
                    yansi::Paint::new("Configuration seeded:").green(),
                    inserted,
                    DEFAULT_CONFIGURATIONS.len() as u64 - inserted
                ),
                Err(e) => fail("Failed to seed configuration", e),
            }
        }
        Commands::Configurations { sub: ListCommand::List } => {
            let pool = open_db().await;
            let configurations = match configuration_service::list_configurations(&pool).await {
                Ok(c) => c,
                Err(e) => fail("Failed to list configurations", e),
            };
            let rows = configurations
                .into_iter()
                .map(|c| {
                    let value = if c.value.is_encrypted() && !c.value.stored().is_empty() {
                        SECRET_MASK.to_string()
                    } else {
                        c.value.stored().to_string()
                    };
                    vec![c.key, c.category, c.is_encrypted.to_string(), value]
                })
                .collect();
            print_table(&["Key", "Category", "Encrypted", "Value"], rows);
        }
        Commands::Admins { sub: ListCommand::List } => {
            let pool = open_db().await;
            let admins = match admin_service::list_admins(&pool).await {
                Ok(a) => a,
                Err(e) => fail("Failed to list admins", e),
            };
            let rows = admins
                .into_iter()
                .map(|a| {
                    vec![
                        a.user_detail.email,
                        a.role.to_string(),
                        a.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    ]
                })
                .collect();
            print_table(&["Email", "Role", "Since"], rows);
        }
    }
}
