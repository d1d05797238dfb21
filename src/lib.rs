pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod utils;

pub use commands::{CallDeps, CallHandle};
pub use config::{CallConfig, Cli};
pub use error::{CallError, MediaAccessError};
pub use signaling::SignalingState;

use peer::{HeadlessDevices, LoggingSink, RtcTransportFactory};
use relay::{RelayChannel, RelayInbox, StdioRelay, WsRelay};
use std::sync::Arc;
use tracing::{error, info};

/// Headless-клиент: подключается к relay, ждёт или начинает звонок,
/// пишет статус до Ctrl-C.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.to_config();
    logger::init(&config.log_filter);
    config.validate()?;
    info!("Endpoint id: {}", config.endpoint_id);

    let (relay, relay_inbox): (Arc<dyn RelayChannel>, RelayInbox) = if cli.relay == "stdio" {
        let (relay, inbox) = StdioRelay::spawn();
        (Arc::new(relay), inbox)
    } else {
        let (relay, inbox) = WsRelay::connect(&cli.relay).await?;
        (Arc::new(relay), inbox)
    };

    let (handle, coordinator) = CallHandle::spawn(CallDeps {
        devices: Arc::new(HeadlessDevices::new(config.media)),
        config,
        relay,
        relay_inbox,
        transport: Arc::new(RtcTransportFactory),
        local_sink: Arc::new(LoggingSink::new("local")),
        remote_sink: Arc::new(LoggingSink::new("remote")),
    });

    handle.prepare().await?;
    if cli.call {
        handle.start_call().await?;
    }

    let mut status = handle.status();
    let watcher = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = *status.borrow();
            println!("status: {}", state.status_text());
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted, ending call"),
        res = coordinator => {
            if let Err(e) = res {
                error!("Coordinator task failed: {e}");
            }
        }
    }

    handle.end_call().await;
    watcher.abort();
    Ok(())
}
