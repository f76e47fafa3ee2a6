//! # SmartShop CLI
//!
//! Operator command line over the SmartShop catalog.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          smartshop                                      │
//! │                                                                         │
//! │   startup:  config ─► local cache ─► seed remote ─► Catalog            │
//! │                                                                         │
//! │   list       ProductListState      first settled state, printed        │
//! │   watch      ProductListState      every state until Ctrl-C            │
//! │   add        ProductDetailState    save(name, price, quantity)          │
//! │   remove     ProductDetailState    delete()                            │
//! │   dashboard  DashboardState        totals + mirror status              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The remote here is the in-process [`MemoryRemoteStore`]. It is seeded
//! from the local cache at startup so every run begins with the remote
//! and the cache in agreement.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::timeout;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use smartshop_core::{total_stock_value, Product};
use smartshop_db::Database;
use smartshop_sync::{Catalog, MemoryRemoteStore, SyncConfig};
use smartshop_views::{
    DashboardState, ProductDetailState, ProductDetailUiState, ProductListState, ProductListUiState,
};

/// How long to wait for a view state to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// SmartShop inventory catalog
#[derive(Parser, Debug)]
#[command(name = "smartshop")]
#[command(about = "Inspect and edit the SmartShop product catalog")]
#[command(version)]
struct Cli {
    /// Config file (defaults to smartshop.toml in the platform config dir)
    #[arg(short, long, env = "SMARTSHOP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every product, ordered by name
    List,
    /// Print the catalog on every change until Ctrl-C
    Watch,
    /// Create a product, or edit one with --id
    Add {
        /// Product name
        #[arg(long)]
        name: String,
        /// Unit price, greater than zero
        #[arg(long)]
        price: String,
        /// Units in stock
        #[arg(long)]
        quantity: String,
        /// Existing product to overwrite
        #[arg(long)]
        id: Option<String>,
    },
    /// Delete a product by id
    Remove {
        /// Product id
        id: String,
    },
    /// Print product count and total stock value
    Dashboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = SyncConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    info!(
        in_memory = config.is_in_memory(),
        prune = config.mirror.prune_remote_deletions,
        "Configuration loaded"
    );

    let remote = MemoryRemoteStore::new();
    seed_remote(&config, &remote).await?;

    let catalog = Catalog::initialize(config, Arc::new(remote))
        .await
        .context("Failed to open catalog")?;

    let outcome = run(cli.command, &catalog).await;

    Catalog::shutdown().await;
    outcome
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=smartshop=trace` - Show trace for smartshop crates only
/// - Default: INFO level, debug for smartshop, warn for sqlx
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,smartshop=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Copies the persisted cache into the in-process remote before the
/// mirror subscribes, so a pruning mirror starts from the same set.
async fn seed_remote(config: &SyncConfig, remote: &MemoryRemoteStore) -> Result<()> {
    if config.is_in_memory() {
        return Ok(());
    }

    let db = Database::new(config.db_config()?)
        .await
        .context("Failed to open local cache")?;
    let products = db.products().list().await?;
    db.close().await;

    debug!(count = products.len(), "Seeding remote from local cache");
    remote.seed(products);
    Ok(())
}

async fn run(command: Command, catalog: &Catalog) -> Result<()> {
    match command {
        Command::List => list(catalog).await,
        Command::Watch => watch(catalog).await,
        Command::Add {
            name,
            price,
            quantity,
            id,
        } => add(catalog, id, &name, &price, &quantity).await,
        Command::Remove { id } => remove(catalog, id).await,
        Command::Dashboard => dashboard(catalog).await,
    }
}

async fn list(catalog: &Catalog) -> Result<()> {
    let view = ProductListState::new(catalog.repository());
    let mut rx = view.subscribe();

    let state = timeout(
        SETTLE_TIMEOUT,
        rx.wait_for(|s| !matches!(s, ProductListUiState::Loading)),
    )
    .await
    .context("Timed out loading products")??
    .clone();

    match state {
        ProductListUiState::Success(products) => {
            print_products(&products);
            Ok(())
        }
        ProductListUiState::Error(message) => Err(anyhow!(message)),
        ProductListUiState::Loading => bail!("Product list never loaded"),
    }
}

async fn watch(catalog: &Catalog) -> Result<()> {
    let view = ProductListState::new(catalog.repository());
    let mut rx = view.subscribe();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                changed?;
                let state = rx.borrow_and_update().clone();
                match state {
                    ProductListUiState::Loading => {}
                    ProductListUiState::Success(products) => {
                        println!("--- {} product(s)", products.len());
                        print_products(&products);
                    }
                    ProductListUiState::Error(message) => bail!(message),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        }
    }
}

async fn add(
    catalog: &Catalog,
    id: Option<String>,
    name: &str,
    price: &str,
    quantity: &str,
) -> Result<()> {
    let view = ProductDetailState::new(catalog.repository(), id);
    settle(&view).await?;

    let product = view
        .save(name, price, quantity)
        .await
        .map_err(|message| anyhow!(message))?;

    println!("Saved {}", format_product(&product));
    Ok(())
}

async fn remove(catalog: &Catalog, id: String) -> Result<()> {
    let view = ProductDetailState::new(catalog.repository(), Some(id));
    settle(&view).await?;

    let product = view.delete().await.map_err(|message| anyhow!(message))?;

    println!("Deleted {}", format_product(&product));
    Ok(())
}

/// Waits until the detail has loaded (or failed to).
async fn settle(view: &ProductDetailState) -> Result<()> {
    let mut rx = view.subscribe();
    let state = timeout(
        SETTLE_TIMEOUT,
        rx.wait_for(|s| !matches!(s, ProductDetailUiState::Loading)),
    )
    .await
    .context("Timed out loading product")??
    .clone();

    match state {
        ProductDetailUiState::Error(message) => Err(anyhow!(message)),
        _ => Ok(()),
    }
}

async fn dashboard(catalog: &Catalog) -> Result<()> {
    let settings = &catalog.config().views;
    let view = DashboardState::new(catalog.repository(), settings);

    let products = catalog.database().products().list().await?;
    let expected_count = products.len() as i64;
    let expected_value = total_stock_value(&products);

    let mut count = view.subscribe_total_count();
    let mut value = view.subscribe_total_value();

    timeout(SETTLE_TIMEOUT, count.wait_for(|c| *c == expected_count))
        .await
        .context("Timed out loading totals")??;
    timeout(
        SETTLE_TIMEOUT,
        value.wait_for(|v| (*v - expected_value).abs() < 1e-6),
    )
    .await
    .context("Timed out loading totals")??;

    let status = catalog.repository().mirror_status();

    println!("Products:     {}", view.total_count());
    println!("Stock value:  {:.2}", view.total_value());
    println!(
        "Mirror:       {} ({} snapshot(s), {} resubscription(s))",
        if status.subscribed { "subscribed" } else { "waiting" },
        status.snapshots_applied,
        status.resubscriptions
    );
    if let Some(error) = status.last_error {
        println!("Last error:   {error}");
    }
    Ok(())
}

fn print_products(products: &[Product]) {
    if products.is_empty() {
        println!("(no products)");
        return;
    }
    for product in products {
        println!("{}", format_product(product));
    }
}

fn format_product(product: &Product) -> String {
    format!(
        "{:<36}  {:<24}  {:>10.2}  x{:<6}",
        product.id, product.name, product.price, product.quantity
    )
}
