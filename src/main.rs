use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use netsync::cache::SqliteCacheStorage;
use netsync::config::Config;
use netsync::db::Database;
use netsync::queue::{BackgroundQueue, QueueEntry, QueuedRequest, SqliteEntryStore};
use netsync::snapshot::RequestSnapshot;
use netsync::strategy::{NetworkFirst, ReqwestFetcher};

#[derive(Parser, Debug)]
#[command(name = "netsync")]
#[command(about = "Network-first fetching with a durable cache and background-sync queue")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/netsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// SQLite database holding the queue and the response cache
  #[arg(long)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a URL from the network, falling back to the cache
  Fetch(RequestArgs),

  /// Inspect or modify a background-sync queue
  Queue {
    /// Queue name
    name: String,

    #[command(subcommand)]
    action: QueueAction,
  },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
  /// Append a request to the tail
  Push(RequestArgs),
  /// Insert a request at the head
  Unshift(RequestArgs),
  /// Remove and print the newest request
  Pop,
  /// Remove and print the oldest request
  Shift,
  /// Print every live request in order
  List,
  /// Print the number of stored requests
  Size,
  /// Delete a request by id
  Delete { id: i64 },
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
  url: String,

  #[arg(short = 'X', long, default_value = "GET")]
  method: String,

  /// Request header as "Name: value" (repeatable)
  #[arg(short = 'H', long = "header")]
  headers: Vec<String>,

  #[arg(short, long)]
  body: Option<String>,

  /// JSON metadata stored alongside a queued request
  #[arg(long)]
  metadata: Option<String>,
}

impl RequestArgs {
  fn to_snapshot(&self) -> Result<RequestSnapshot> {
    url::Url::parse(&self.url).map_err(|e| eyre!("Invalid URL {}: {}", self.url, e))?;

    let mut request = RequestSnapshot::new(self.method.as_str(), self.url.as_str());
    for header in &self.headers {
      let (name, value) = header
        .split_once(':')
        .ok_or_else(|| eyre!("Invalid header {:?}, expected \"Name: value\"", header))?;
      request = request.with_header(name.trim(), value.trim());
    }
    if let Some(body) = &self.body {
      request = request.with_body(body.as_bytes());
    }

    Ok(request)
  }

  fn to_queued(&self) -> Result<QueuedRequest> {
    let queued = QueuedRequest::new(self.to_snapshot()?);
    match &self.metadata {
      Some(raw) => {
        let metadata = serde_json::from_str(raw).map_err(|e| eyre!("Invalid metadata JSON: {}", e))?;
        Ok(queued.with_metadata(metadata))
      }
      None => Ok(queued),
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override database if specified on command line
  if let Some(db) = args.db {
    config.storage.path = Some(db);
  }

  let _log_guard = netsync::logging::init(&config.log)?;

  let db = Arc::new(Database::open(&config.database_path()?)?);

  match args.command {
    Command::Fetch(request) => fetch(&config, db, &request).await,
    Command::Queue { name, action } => queue(&config, db, &name, action),
  }
}

async fn fetch(config: &Config, db: Arc<Database>, args: &RequestArgs) -> Result<()> {
  let request = args.to_snapshot()?;
  let storage = Arc::new(SqliteCacheStorage::new(db));
  let strategy = NetworkFirst::new(ReqwestFetcher::new()?, storage, config.oneshot_strategy_options());

  let result = strategy.handle(&request).await?;

  eprintln!("HTTP {} ({:?})", result.data.status, result.source);
  if let Some(cached_at) = result.cached_at {
    eprintln!("cached at {}", cached_at.to_rfc3339());
  }
  std::io::stdout().write_all(&result.data.body)?;

  Ok(())
}

fn queue(config: &Config, db: Arc<Database>, name: &str, action: QueueAction) -> Result<()> {
  let store = Arc::new(SqliteEntryStore::new(db));
  let queue = BackgroundQueue::new(store, name).with_max_retention(config.queue.max_retention());

  match action {
    QueueAction::Push(args) => println!("{}", queue.push_request(args.to_queued()?)?),
    QueueAction::Unshift(args) => println!("{}", queue.unshift_request(args.to_queued()?)?),
    QueueAction::Pop => print_entry(queue.pop_request()?),
    QueueAction::Shift => print_entry(queue.shift_request()?),
    QueueAction::List => {
      for entry in queue.get_all()? {
        print_entry(Some(entry));
      }
    }
    QueueAction::Size => println!("{}", queue.size()?),
    QueueAction::Delete { id } => queue.delete_entry(id)?,
  }

  Ok(())
}

fn print_entry(entry: Option<QueueEntry>) {
  let Some(entry) = entry else {
    return;
  };

  let queued_at = Utc
    .timestamp_millis_opt(entry.payload.timestamp)
    .single()
    .map(|t| t.to_rfc3339())
    .unwrap_or_else(|| entry.payload.timestamp.to_string());

  println!(
    "{}\t{}\t{}\t{}",
    entry.id.map(|id| id.to_string()).unwrap_or_default(),
    entry.payload.request.method,
    entry.payload.request.url,
    queued_at
  );
}
