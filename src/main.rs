use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use torrent_search_bot::cli::{Cli, Commands};
use torrent_search_bot::config::Config;
use torrent_search_bot::controller::ConversationController;
use torrent_search_bot::data_models::{Category, SearchRequest};
use torrent_search_bot::search_client::{SearchClient, Searcher};
use torrent_search_bot::session::SessionStore;
use torrent_search_bot::telegram::{self, BotApi};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize tracing subscriber (handles both tracing and log crate)
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(true)
        .init();

    match cli.command() {
        Commands::Bot => run_bot(&config).await,
        Commands::Search {
            query,
            category,
            json,
        } => run_search(&config, &query.join(" "), *category, *json).await,
        Commands::Categories => {
            for category in Category::ALL {
                println!("{:<8} {}", category.key(), category.path_suffix());
            }
            Ok(())
        }
    }
}

async fn run_bot(config: &Config) -> anyhow::Result<()> {
    let token = config.require_token()?;
    log::info!(
        "searching {} with {}s between requests, up to {} results (cache lifetime {}s reserved)",
        config.search_url(),
        config.request_delay.as_secs(),
        config.max_results,
        config.cache_time.as_secs()
    );

    let client = Arc::new(SearchClient::from_config(config)?);
    let controller = Arc::new(ConversationController::new(
        client,
        Arc::new(SessionStore::new()),
    ));
    let api = BotApi::new(&config.telegram_api_url, token)?;
    telegram::run(api, controller).await
}

async fn run_search(
    config: &Config,
    query: &str,
    category: Option<Category>,
    json: bool,
) -> anyhow::Result<()> {
    let Some(request) = SearchRequest::new(query, category.map(Category::key)) else {
        anyhow::bail!("search query is empty");
    };

    let client = SearchClient::from_config(config)?;
    let results = client
        .search(&request.query, request.category)
        .await
        .context("search failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }
    for record in &results {
        println!("{}", record.title);
        println!("  size: {}  seeds: {}  date: {}", record.size, record.seeds, record.date);
        if let Some(magnet) = &record.magnet_link {
            println!("  {magnet}");
        }
    }
    println!("Found {} results", results.len());
    Ok(())
}
