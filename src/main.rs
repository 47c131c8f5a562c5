use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;

use shakeguard_offline::cache::{CacheStorage, OfflineCache, Request, SqliteStorage};
use shakeguard_offline::config::Config;
use shakeguard_offline::logging;
use shakeguard_offline::net::{HttpTransport, OnlineFlag};

#[derive(Parser, Debug)]
#[command(name = "shakeguard-offline")]
#[command(about = "Offline-first request cache for the ShakeGuard site")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./shakeguard.yaml or $XDG_CONFIG_HOME/shakeguard/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Override the cache version tag
  #[arg(long, global = true)]
  cache_version: Option<String>,

  /// Override the origin server URL
  #[arg(long, global = true)]
  origin: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Purge stale cache stores and pre-populate the manifest
  Activate,
  /// Run one request through the cache
  Fetch {
    /// Path (or absolute URL) to request
    path: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header, "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Treat the host as offline
    #[arg(long)]
    offline: bool,

    /// Print status, headers and outcome before the body
    #[arg(short, long)]
    include: bool,
  },
  /// List cache stores
  Stores,
  /// List entries in the current cache store
  Entries,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(version) = args.cache_version {
    config.cache.version = version;
  }
  if let Some(origin) = args.origin {
    config.origin = origin;
  }

  let _guard = logging::init(config.log_dir.as_deref())?;

  let storage = SqliteStorage::open(config.cache.path.as_deref())?;
  let online = OnlineFlag::default();
  let cache = OfflineCache::new(
    storage,
    HttpTransport::new()?,
    online.clone(),
    config.cache_settings()?,
  );

  match args.command {
    Command::Activate => {
      let report = cache.activate().await?;
      println!("activated {}", report.store);
      for name in &report.purged {
        println!("  purged  {}", name);
      }
      for path in &report.cached {
        println!("  cached  {}", path);
      }
      for (path, reason) in &report.skipped {
        println!("  skipped {} ({})", path, reason);
      }
    }
    Command::Fetch {
      path,
      method,
      headers,
      data,
      offline,
      include,
    } => {
      online.set_online(!offline);

      let url = cache
        .settings()
        .origin
        .join(&path)
        .map_err(|e| eyre!("Invalid path '{}': {}", path, e))?;
      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

      let mut request = Request::new(method, url);
      for header in &headers {
        let (name, value) = header
          .split_once(':')
          .ok_or_else(|| eyre!("Invalid header '{}', expected \"Name: value\"", header))?;
        request = request.with_header(name.trim(), value.trim());
      }
      if let Some(body) = data {
        request = request.with_body(body);
      }

      let handled = cache.handle(&request).await;

      let mut stdout = std::io::stdout().lock();
      if include {
        writeln!(stdout, "HTTP {} ({})", handled.response.status, handled.outcome)?;
        for (name, value) in handled.response.headers.iter() {
          writeln!(stdout, "{}: {}", name, value)?;
        }
        writeln!(stdout)?;
      }
      stdout.write_all(&handled.response.body)?;
      stdout.flush()?;
    }
    Command::Stores => {
      for name in cache.storage().keys()? {
        let marker = if name == cache.store_name() { "*" } else { " " };
        println!("{} {}", marker, name);
      }
    }
    Command::Entries => {
      for entry in cache.storage().entries(cache.store_name())? {
        println!(
          "{}  {:<6} {} {}",
          entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
          entry.method,
          entry.status,
          entry.url
        );
      }
    }
  }

  Ok(())
}
