use anyhow::Context;
use clap::Parser;
use rusty_pagecache::{config::Config, http::HttpClient, Cacher, FetchCache};
use std::path::PathBuf;

/// Fetch pages through the redis-backed cache and report how often each was requested.
#[derive(Debug, Parser)]
#[command(name = "pagecache", version)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long, env = "PAGECACHE_CFG_PATH", value_name = "PATH")]
    config: Option<PathBuf>,

    /// How many times to request each URL.
    #[arg(long, default_value_t = 2)]
    repeat: u32,

    /// URLs to fetch.
    #[arg(required = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let level: tracing::Level = config.log_level.parse()?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let cache = prepare_cache(&config).await?;
    run(&cache, &args).await
}

async fn prepare_cache(config: &Config) -> anyhow::Result<FetchCache<Cacher, HttpClient>> {
    let addr = config.redis_addr.clone();
    let pool_size = config.pool_size;
    // building the pool connects eagerly
    let cacher = tokio::task::spawn_blocking(move || Cacher::connect(&addr, pool_size))
        .await?
        .with_context(|| format!("fail to connect to redis at {}", config.redis_addr))?;
    tracing::info!("connected to redis at {}", config.redis_addr);

    let requester = HttpClient::with_timeout(config.fetch_timeout())?;
    Ok(FetchCache::new(cacher, requester, config.cache_settings()?))
}

async fn run(cache: &FetchCache<Cacher, HttpClient>, args: &Args) -> anyhow::Result<()> {
    for url in &args.urls {
        for attempt in 0..args.repeat {
            let fetched = cache.get_detailed(url).await?;
            if attempt == 0 {
                println!("{}", String::from_utf8_lossy(&fetched.content));
            }
            tracing::info!(
                "`{url}`: {} ({} bytes)",
                fetched.source,
                fetched.content.len()
            );
        }

        let count = cache.read(url).await?;
        println!("URL accessed {count} times.");
    }

    Ok(())
}
