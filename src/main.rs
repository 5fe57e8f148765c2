use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use hrdesk::app::App;
use hrdesk::cache::{CacheLayer, CacheStorage, NoopStorage, SqliteStorage};
use hrdesk::config::Config;
use hrdesk::store::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "hrdesk")]
#[command(about = "Self-service client for the HR portal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hrdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Skip the local record cache for this run
  #[arg(long)]
  no_cache: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Log in and remember the session
  Login {
    login: String,
    /// Password (default: $HRDESK_PASSWORD)
    #[arg(long)]
    password: Option<String>,
  },
  /// Forget the stored session
  Logout,
  /// Show who is logged in
  Whoami,
  /// Show your profile, including staged edits
  Profile,
  /// Stage a profile field change without sending it
  Edit { field: String, value: String },
  /// List staged profile changes
  Pending,
  /// Drop all staged profile changes
  Discard,
  /// Send staged profile changes to the server
  Submit,
  /// Download an employee's picture
  Avatar {
    /// Employee id (default: yourself)
    employee_id: Option<u64>,
    #[arg(short, long)]
    out: PathBuf,
  },
  /// List your direct reports (managers only)
  Team {
    /// Number of result batches to load
    #[arg(short, long, default_value_t = 1)]
    batches: u32,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let db_path = match &config.data_path {
    Some(path) => path.clone(),
    None => SqliteStore::default_path()?,
  };
  let _log_guard = init_logging(&db_path)?;

  if args.no_cache || !config.cache.enabled {
    run(args.command, config, &db_path, CacheLayer::new(NoopStorage)).await
  } else {
    let stale = chrono::Duration::minutes(config.cache.stale_minutes);
    let cache = CacheLayer::new(SqliteStorage::open_at(&db_path)?).with_stale_time(stale);
    run(args.command, config, &db_path, cache).await
  }
}

async fn run<S: CacheStorage>(
  command: Command,
  config: Config,
  db_path: &Path,
  cache: CacheLayer<S>,
) -> Result<()> {
  let store = Arc::new(SqliteStore::open_at(db_path)?);
  let mut app = App::new(config, store, cache)?;

  match command {
    Command::Login { login, password } => {
      let password = match password {
        Some(p) => p,
        None => Config::get_password()?,
      };
      app.login(&login, &password).await
    }
    Command::Logout => app.logout(),
    Command::Whoami => app.whoami(),
    Command::Profile => app.profile().await,
    Command::Edit { field, value } => app.edit(&field, &value),
    Command::Pending => app.show_pending(),
    Command::Discard => app.discard(),
    Command::Submit => app.submit().await,
    Command::Avatar { employee_id, out } => app.avatar(employee_id, &out).await,
    Command::Team { batches } => app.team(batches).await,
  }
}

/// Log to a daily file next to the database so stdout stays clean.
fn init_logging(db_path: &Path) -> Result<WorkerGuard> {
  let log_dir = db_path
    .parent()
    .map(|p| p.join("logs"))
    .ok_or_else(|| eyre!("Could not determine log directory"))?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "hrdesk.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter =
    EnvFilter::try_from_env("HRDESK_LOG").unwrap_or_else(|_| EnvFilter::new("hrdesk=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
