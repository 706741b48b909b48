//! versus-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! ranking store, and either serves the API or runs one of the seeding
//! commands used to populate categories and items.
//!
//! ```text
//! versus-server serve
//! versus-server add-category --name portraits
//! versus-server add-item --category portraits --owner <uuid> --label cat.jpg
//! versus-server retire-item --id <uuid>
//! ```

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use versus_core::{engine::Engine, item::NewItem, store::RankingStore};
use versus_server::{BroadcastSink, ServerConfig};
use versus_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Versus ranking server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Create a category.
  AddCategory {
    #[arg(long)]
    name: String,
  },
  /// Add an item to a category, at the configured baseline rating.
  AddItem {
    /// Category name, matched case-insensitively.
    #[arg(long)]
    category: String,
    #[arg(long)]
    owner:    Uuid,
    #[arg(long)]
    label:    String,
  },
  /// Take an item out of play.
  RetireItem {
    #[arg(long)]
    id: Uuid,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config)?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(cfg, store).await,
    Command::AddCategory { name } => {
      let category = store
        .add_category(name)
        .await
        .context("failed to add category")?;
      println!("{}", category.category_id);
      Ok(())
    }
    Command::AddItem { category, owner, label } => {
      let found = store
        .find_category_by_name(category.clone())
        .await
        .context("failed to look up category")?
        .with_context(|| format!("no category named {category:?}"))?;
      let input =
        NewItem::new(found.category_id, owner, label).with_rating(cfg.engine.baseline_rating);
      let item = store.add_item(input).await.context("failed to add item")?;
      println!("{}", item.item_id);
      Ok(())
    }
    Command::RetireItem { id } => {
      if !store.retire_item(id).await.context("failed to retire item")? {
        anyhow::bail!("item {id} does not exist or is already retired");
      }
      println!("retired {id}");
      Ok(())
    }
  }
}

async fn serve(cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let sink = Arc::new(BroadcastSink::new(cfg.event_buffer));
  let engine = Engine::new(Arc::new(store), sink, cfg.engine.clone())
    .context("failed to start engine")?;
  let app = versus_server::app(Arc::new(engine), cfg.identity());
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .with_graceful_shutdown(async {
      if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
      }
    })
    .await
    .context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
