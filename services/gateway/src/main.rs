//! Gateway entry point
//!
//! Wires the simulated exchange link, the order book cache, the order
//! registry, and the WebSocket server together, then pumps cached book
//! updates into the broker until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Arg, Command};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_data::sim::SimExchangeLink;
use market_data::MarketDataService;
use oms::{OrderManager, OrderType, Side};
use services_common::ExchangeLink;
use ws_gateway::{Broker, GatewayConfig, WsServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ws_gateway=info,market_data=info,oms=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let matches = Command::new("ws-gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .about("WebSocket fan-out gateway over a simulated exchange feed")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("gateway.toml"),
        )
        .arg(
            Arg::new("demo-order")
                .long("demo-order")
                .help("Place and cancel one resting order at startup")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let default_config = "gateway.toml".to_string();
    let config_path = matches
        .get_one::<String>("config")
        .unwrap_or(&default_config);
    let config = match GatewayConfig::from_file(config_path) {
        Ok(config) => {
            info!("loaded configuration from {config_path}");
            config
        }
        Err(e) => {
            info!("no usable config at {config_path} ({e}); using defaults");
            GatewayConfig::default()
        }
    };

    let link: Arc<dyn ExchangeLink> = Arc::new(SimExchangeLink::new(Duration::from_millis(
        config.exchange.tick_interval_ms,
    )));
    let (book_tx, mut book_rx) = mpsc::unbounded_channel();
    let market_data = Arc::new(MarketDataService::new(Arc::clone(&link), book_tx));
    let orders = Arc::new(OrderManager::new(Arc::clone(&link)));
    let broker = Arc::new(Broker::new());
    let server = Arc::new(WsServer::new(Arc::clone(&broker)));

    if let Err(e) = server.start(&config.server_address()).await {
        error!("cannot start gateway: {e}");
        std::process::exit(1);
    }
    market_data.start().await?;
    for instrument in &config.exchange.instruments {
        market_data.subscribe(instrument).await;
    }

    // Fan every accepted book update out to its subscribers.
    let fanout_broker = Arc::clone(&broker);
    tokio::spawn(async move {
        while let Some(book) = book_rx.recv().await {
            fanout_broker.broadcast_orderbook(&book);
        }
    });

    if matches.get_flag("demo-order") {
        run_order_demo(&orders, &config.exchange.instruments).await;
    }

    info!(
        "gateway running on {} with {} seed instruments",
        config.server_address(),
        config.exchange.instruments.len()
    );
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    market_data.stop().await?;
    server.stop().await;
    Ok(())
}

/// Exercise the order registry once: place a far-from-market resting
/// bid, show the registry's view of it, then cancel it.
async fn run_order_demo(orders: &OrderManager, instruments: &[String]) {
    let Some(instrument) = instruments.first() else {
        return;
    };
    match orders
        .place_order(instrument, Side::Buy, 10_000.0, 0.1, OrderType::Limit)
        .await
    {
        Ok(id) => {
            let order = orders.order(&id);
            info!(
                "demo order {id}: {:?} {} @ {} ({:?})",
                order.side, order.amount, order.price, order.status
            );
            match orders.cancel_order(&id).await {
                Ok(true) => info!("demo order cancelled"),
                Ok(false) => info!("venue refused the demo cancel"),
                Err(e) => error!("demo cancel failed: {e}"),
            }
        }
        Err(e) => error!("demo order placement failed: {e}"),
    }
}
