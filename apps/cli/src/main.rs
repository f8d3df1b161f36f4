use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    config::{load_settings, Settings},
    CatalogCoordinator, CatalogGateway, CatalogView, CoordinatorConfig, HttpCatalogGateway,
    ViewVariant,
};
use shared::domain::{DrinkType, Product, ProductId, SortKey};
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "catalog", about = "Browse the cocktail catalog")]
struct Cli {
    /// Settings file; defaults to ./catalog.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List products with optional label filter, sort, search and page.
    Browse(BrowseArgs),
    /// Show one product.
    Show { id: i64 },
    /// List the label vocabulary.
    Labels,
}

#[derive(Args, Debug)]
struct BrowseArgs {
    /// Query the remote paged endpoint instead of fetching in bulk.
    #[arg(long, conflicts_with = "search_only")]
    paged: bool,
    /// Start empty and only show search results.
    #[arg(long)]
    search_only: bool,
    #[arg(long)]
    in_stock: bool,
    /// Fixed drink type scope, e.g. `shot`.
    #[arg(long)]
    scope: Option<String>,
    #[arg(long, value_delimiter = ',')]
    labels: Vec<String>,
    #[arg(long)]
    sort: Option<SortKey>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    let gateway = Arc::new(HttpCatalogGateway::from_settings(&settings)?);

    match cli.command {
        Command::Browse(args) => browse(gateway, &settings, args).await,
        Command::Show { id } => show(gateway.as_ref(), ProductId(id)).await,
        Command::Labels => {
            for label in gateway.fetch_labels().await? {
                println!("{}", label.name);
            }
            Ok(())
        }
    }
}

async fn browse(
    gateway: Arc<HttpCatalogGateway>,
    settings: &Settings,
    args: BrowseArgs,
) -> Result<()> {
    let variant = if args.paged {
        ViewVariant::Paged
    } else if args.search_only {
        ViewVariant::SearchOnly
    } else {
        ViewVariant::Bulk {
            in_stock: args.in_stock,
        }
    };
    let config = CoordinatorConfig::from_settings(settings, variant)
        .with_scope(args.scope.map(DrinkType::new));
    let limit = settings.request_timeout() * 2 + settings.search_debounce();

    let coordinator = CatalogCoordinator::new(gateway.clone(), config);
    let mut view = coordinator.subscribe();

    coordinator.on_mount().await;
    settle(&mut view, limit, |_| true).await?;

    if !args.labels.is_empty() {
        coordinator.set_selected_labels(args.labels).await;
        settle(&mut view, limit, |_| true).await?;
    }
    if let Some(sort) = args.sort {
        coordinator.set_sort_key(sort).await;
        settle(&mut view, limit, |_| true).await?;
    }
    if let Some(term) = args.search {
        let term = term.trim().to_string();
        coordinator.set_search_term(&term).await;
        settle(&mut view, limit, |v| v.search_term == term).await?;
    }
    if args.page != 1 {
        coordinator.set_page(args.page).await;
        settle(&mut view, limit, |_| true).await?;
    }

    let current = coordinator.snapshot();
    coordinator.on_unmount().await;

    let signed_in = gateway.identity_present().await;
    println!("signed in: {}", if signed_in { "yes" } else { "no" });
    print_view(&current);
    Ok(())
}

async fn settle(
    view: &mut watch::Receiver<CatalogView>,
    limit: Duration,
    mut done: impl FnMut(&CatalogView) -> bool,
) -> Result<CatalogView> {
    let current = tokio::time::timeout(limit, view.wait_for(|v| !v.loading && done(v)))
        .await
        .map_err(|_| anyhow!("catalog did not settle within {limit:?}"))?
        .context("catalog view closed")?
        .clone();
    if current.error {
        warn!(
            detail = current.error_detail.as_deref().unwrap_or_default(),
            "catalog request failed; showing last known results"
        );
    }
    Ok(current)
}

fn print_view(view: &CatalogView) {
    if view.visible_items.is_empty() {
        println!("No products found matching your criteria.");
    }
    for product in &view.visible_items {
        print_row(product);
    }
    if let Some(total_pages) = view.total_pages {
        println!("page {}/{}", view.page, total_pages);
    }
    if view.error {
        println!("(showing last known results: request failed)");
    }
}

fn print_row(product: &Product) {
    let rating = product
        .rating
        .map(|r| format!("{r:.1}"))
        .unwrap_or_else(|| "-".to_string());
    let labels: Vec<&str> = product.labels.iter().map(|l| l.name.as_str()).collect();
    println!(
        "{:>5}  {:<28} {:>5.1}%  rating {:>4}  [{}]  {}",
        product.id.0,
        product.name,
        product.alcohol_content,
        rating,
        labels.join(", "),
        product.display_image()
    );
}

async fn show(gateway: &dyn CatalogGateway, id: ProductId) -> Result<()> {
    let product = gateway.fetch_product(id).await?;
    println!("{}", product.name);
    println!("{}", product.description);
    println!("Alcohol content: {}%", product.alcohol_content);
    match product.rating {
        Some(rating) => println!("Rating: {rating:.1}"),
        None => println!("Rating: unrated"),
    }
    if let Some(drink_type) = &product.drink_type {
        println!("Type: {drink_type}");
    }
    println!("In stock: {}", if product.in_stock { "yes" } else { "no" });
    println!("Image: {}", product.display_image());
    let labels: Vec<&str> = product.labels.iter().map(|l| l.name.as_str()).collect();
    println!("Labels: {}", labels.join(", "));
    let recipe = product.recipe_lines();
    if recipe.is_empty() {
        println!("No recipe available");
    } else {
        println!("Recipe:");
        for line in recipe {
            println!("  {line}");
        }
    }
    Ok(())
}
