use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use newsline::api::{NewsClient, NewsQuery};
use newsline::config::Config;
use newsline::favorites::FavoritesStore;
use newsline::network::{EndpointProbe, NetworkMonitor, RawConnectivity};
use newsline::repository::NewsRepository;
use newsline::storage::{
    Article, Database, DatabaseError, KeyValueStore, MemoryStore, PersistentCache,
};
use newsline::store::ArticleStore;
use newsline::sync::{LoadOutcome, NewsSyncEngine, Notice};

/// How long the startup reachability probe may take
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Get the config directory path (~/.config/newsline/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsline"))
}

#[derive(Parser, Debug)]
#[command(name = "newsline", about = "Offline-tolerant news feed client")]
struct Args {
    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Keep the cache in memory only; nothing is read from or written to disk
    #[arg(long)]
    ephemeral: bool,

    /// Config file (default: ~/.config/newsline/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the latest news through the sync engine
    Feed {
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,

        /// Behave as if the network were unavailable
        #[arg(long)]
        offline: bool,
    },
    /// One-shot search, served from cache when possible
    Search { query: String },
    /// Manage pinned articles
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Drop cached news (favorites are kept)
    ClearCache,
}

#[derive(Subcommand, Debug)]
enum FavoritesAction {
    List,
    /// Pin an article from the cached feed
    Add { id: String },
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(config = ?config, "Effective configuration");

    let kv: Arc<dyn KeyValueStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(open_database(&config_dir.join("newsline.db"), args.reset_db).await?)
    };
    let cache = PersistentCache::new(kv).with_ttl(config.cache_ttl());

    let command = args.command.unwrap_or(Command::Feed {
        pages: 1,
        offline: false,
    });
    match command {
        Command::Feed { pages, offline } => run_feed(&config, cache, pages, offline).await,
        Command::Search { query } => run_search(&config, cache, query).await,
        Command::Favorites { action } => run_favorites(cache, action).await,
        Command::ClearCache => {
            cache.clear_cache().await;
            println!("News cache cleared.");
            Ok(())
        }
    }
}

async fn open_database(db_path: &Path, reset: bool) -> Result<Database> {
    if reset && db_path.exists() {
        std::fs::remove_file(db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of newsline appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

fn build_client(config: &Config) -> Result<NewsClient> {
    let http_client = reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    NewsClient::new(http_client, &config.api_base_url, config.resolve_api_key())
        .context("Invalid api_base_url")
}

async fn run_feed(config: &Config, cache: PersistentCache, pages: u32, offline: bool) -> Result<()> {
    let client = build_client(config)?;
    let monitor = NetworkMonitor::new(config.platform);
    let watcher_cancel = CancellationToken::new();

    if offline {
        monitor.observe(RawConnectivity::offline());
    } else {
        let probe = Arc::new(EndpointProbe::from_base_url(
            &config.api_base_url,
            PROBE_TIMEOUT,
        )?);
        monitor.check(probe.as_ref()).await;

        // Keep re-probing on platforms that want it while pages load
        if let Some(interval) = config.platform.connectivity_poll_interval() {
            let monitor = monitor.clone();
            let cancel = watcher_cancel.clone();
            let (_signals_tx, signals_rx) = mpsc::channel(1);
            tokio::spawn(async move {
                monitor
                    .watch(probe, signals_rx, Some(interval), cancel)
                    .await;
            });
        }
    }

    let store = ArticleStore::shared();
    let (notice_tx, mut notice_rx) = mpsc::channel::<Notice>(8);
    let engine = NewsSyncEngine::builder(Arc::new(client), store.clone(), cache, monitor)
        .config(config.sync_config())
        .base_query(config.base_query())
        .notices(notice_tx)
        .build();

    let mut result = engine.load(1, false).await;
    let mut loaded = 1;
    while loaded < pages.max(1) && matches!(result, Ok(LoadOutcome::Loaded { .. })) {
        if !engine.can_load_more() {
            break;
        }
        result = engine.load_more().await;
        loaded += 1;
    }

    engine.dispose();
    watcher_cancel.cancel();

    while let Ok(notice) = notice_rx.try_recv() {
        eprintln!("{notice}");
    }

    let store = store.lock().await;
    print_articles(store.articles());
    if store.has_more() && !store.articles().is_empty() {
        println!("\n(more available: --pages {})", loaded + 1);
    }

    result.map(|_| ()).context("Failed to load news")
}

async fn run_search(config: &Config, cache: PersistentCache, query: String) -> Result<()> {
    let client = build_client(config)?;
    let repository = NewsRepository::new(Arc::new(client), cache, config.sync_config())
        .with_memory_capacity(config.memory_cache_entries);

    let query = NewsQuery {
        query: Some(query),
        ..config.base_query()
    };
    let articles = repository
        .latest_news(&query)
        .await
        .context("Search failed")?;
    if articles.is_empty() {
        println!("No results.");
    }
    print_articles(&articles);
    Ok(())
}

async fn run_favorites(cache: PersistentCache, action: FavoritesAction) -> Result<()> {
    let mut favorites = FavoritesStore::load(cache.clone()).await;

    match action {
        FavoritesAction::List => {
            if favorites.list().is_empty() {
                println!("No favorites yet.");
            }
            print_articles(favorites.list());
        }
        FavoritesAction::Add { id } => {
            let cached = cache.get_news_cache().await.articles.unwrap_or_default();
            let article = cached
                .into_iter()
                .find(|a| a.id == id)
                .ok_or_else(|| {
                    anyhow::anyhow!("Article '{id}' is not in the cached feed; run `newsline feed` first")
                })?;
            if favorites.add(article).await {
                println!("Added {id} to favorites.");
            } else {
                println!("{id} is already a favorite.");
            }
        }
        FavoritesAction::Remove { id } => {
            if favorites.remove(&id).await {
                println!("Removed {id} from favorites.");
            } else {
                println!("{id} is not a favorite.");
            }
        }
    }
    Ok(())
}

fn print_articles(articles: &[Article]) {
    for (i, article) in articles.iter().enumerate() {
        println!(
            "{:>3}. {}  [{} | {}]",
            i + 1,
            article.title,
            article.source.name,
            article.published_at.format("%Y-%m-%d %H:%M")
        );
        println!("     {}  ({})", article.url, article.id);
    }
}
