use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use futures_util::future::join_all;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use market_common::data::{Instrument, OrderBook, Pair, Symbol};
use market_core::{
    config::Settings,
    exchange::{Exchange, HttpClient, ExchangeRegistry},
    service::{FeedHandle, MarketDataPoller, ServiceError, TradeHistoryPoller},
};

#[derive(Parser)]
#[command(name = "market-feed")]
#[command(about = "Polls cryptocurrency exchanges for market data and trades")]
enum Commands {
    /// Stream market data snapshots for one instrument, e.g. btce/btc_usd
    Ticker {
        instrument: Instrument,
        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Stream new trades for one or more pairs
    Trades {
        exchange: String,
        #[arg(required = true)]
        pairs: Vec<Pair>,
        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// List the pairs an exchange trades
    Pairs { exchange: String },
    /// Show account balances (needs credentials)
    Balance {
        exchange: String,
        symbols: Vec<Symbol>,
    },
    /// Fetch market data once for several pairs
    Snapshot {
        exchange: String,
        #[arg(required = true)]
        pairs: Vec<Pair>,
    },
    /// Show the order book for one instrument, e.g. btce/btc_usd
    Depth {
        instrument: Instrument,
        /// Levels per side
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// List recent account transactions (needs credentials)
    Transactions {
        exchange: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let command = Commands::parse();

    let settings = Settings::new().context("Failed to load settings")?;
    let http = HttpClient::new(settings.http.clone())?;
    let registry = ExchangeRegistry::with_default_drivers(settings.exchanges.clone(), http);

    match command {
        Commands::Ticker {
            instrument,
            interval,
        } => {
            let exchange = registry.create(&instrument.exchange)?;
            let mut config = settings.poller.to_config();
            if let Some(secs) = interval {
                config.interval = Duration::from_secs(secs);
            }

            let handle = MarketDataPoller::new(exchange, instrument.pair.clone())
                .with_config(config)
                .start()
                .await
                .map_err(explain)?;

            info!("Polling {}. Press Ctrl+C to stop.", instrument);
            follow(handle).await?;
        }

        Commands::Trades {
            exchange,
            pairs,
            interval,
        } => {
            let exchange = registry.create(&exchange)?;
            let mut config = settings.trade_history.to_config()?;
            if let Some(secs) = interval {
                config.interval = Duration::from_secs(secs);
            }

            let handle = TradeHistoryPoller::new(exchange, pairs)
                .with_config(config)
                .start()
                .map_err(explain)?;

            info!("Following trades. Press Ctrl+C to stop.");
            follow(handle).await?;
        }

        Commands::Pairs { exchange } => {
            let exchange = registry.create(&exchange)?;
            for pair in exchange.pairs().await? {
                println!("{}", pair);
            }
        }

        Commands::Balance { exchange, symbols } => {
            let exchange = registry.create(&exchange)?;
            let balances = exchange.balance(&symbols).await?;
            if balances.is_empty() {
                println!("No funds");
            }
            for (symbol, amount) in balances {
                println!("{:>6} {}", symbol.as_str().to_uppercase(), amount);
            }
        }

        Commands::Snapshot { exchange, pairs } => {
            let exchange = registry.create(&exchange)?;
            snapshot(exchange, &pairs).await;
        }

        Commands::Depth { instrument, limit } => {
            let exchange = registry.create(&instrument.exchange)?;
            let book = exchange.order_book(&instrument.pair, limit).await?;
            print_book(&book);
        }

        Commands::Transactions { exchange, limit } => {
            let exchange = registry.create(&exchange)?;
            let transactions = exchange.transactions(limit).await?;
            if transactions.is_empty() {
                println!("No transactions");
            }
            for transaction in transactions {
                println!("{}", transaction);
            }
        }
    }

    Ok(())
}

/// Print feed output until Ctrl+C or the feed ends
async fn follow<T: Display>(mut handle: FeedHandle<T>) -> anyhow::Result<()> {
    let shutdown_tx = handle.get_shutdown_tx();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down feed...");
            let _ = shutdown_tx.send(());
        }
    });

    while let Some(value) = handle.recv().await {
        println!("{}", value);
    }

    if !interrupt.is_finished() {
        warn!("Feed ended");
        interrupt.abort();
    }

    let stats = handle.shutdown().await?;
    info!(
        "Feed stopped: {} emitted, {} successful cycles, {} failed",
        stats.emitted, stats.successful_cycles, stats.failed_cycles
    );
    Ok(())
}

async fn snapshot(exchange: Arc<dyn Exchange>, pairs: &[Pair]) {
    let results = join_all(pairs.iter().map(|pair| exchange.market_data(pair))).await;

    for (pair, result) in pairs.iter().zip(results) {
        match result {
            Ok(data) => println!("{}", data),
            Err(e) => error!("{} on {}: {}", pair, exchange.name(), e),
        }
    }
}

fn print_book(book: &OrderBook) {
    match (book.best_ask(), book.best_bid()) {
        (Some(ask), Some(bid)) => println!(
            "{} best ask {} / best bid {} (spread {})",
            book.pair,
            ask.price,
            bid.price,
            ask.price - bid.price
        ),
        _ => println!("{} one side of the book is empty", book.pair),
    }

    println!("{:>16} {:>16}", "ASK", "AMOUNT");
    for level in book.asks.iter().rev() {
        println!("{:>16} {:>16}", level.price, level.amount);
    }
    println!("{:>16} {:>16}", "BID", "AMOUNT");
    for level in &book.bids {
        println!("{:>16} {:>16}", level.price, level.amount);
    }
}

fn explain(e: ServiceError) -> anyhow::Error {
    if e.is_recoverable() {
        warn!("Startup failed with a temporary error, try again later");
    }
    e.into()
}
