use std::sync::Arc;

use clap::Parser;
use printwatch::{
    actors::scheduler::SchedulerHandle,
    config::read_config_file,
    registry::FileRegistry,
    sink::{
        BroadcastLiveChannel, LiveUpdate, MemoryAlertRepository, MemoryStateRepository,
        NotificationSink,
    },
    state::FleetStateTable,
};
use tokio::sync::broadcast;
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("printwatch", LevelFilter::TRACE),
        ("engine", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    // fail fast on a broken config file; later edits are picked up by the
    // periodic re-sync instead
    let config = read_config_file(&args.file)?;
    info!(
        "monitoring {} configured printers",
        config.printers.as_ref().map_or(0, Vec::len)
    );

    let registry = Arc::new(FileRegistry::new(&args.file));
    let table = Arc::new(FleetStateTable::new());
    let live = Arc::new(BroadcastLiveChannel::new(256));
    let sink = Arc::new(NotificationSink::new(
        Arc::new(MemoryStateRepository::new()),
        Arc::new(MemoryAlertRepository::new()),
        live.clone(),
    ));

    // surface live updates in the log until an external push channel is wired
    let mut updates = live.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(LiveUpdate::Status {
                    printer_id, status, ..
                }) => {
                    debug!("{printer_id} is {status}");
                }
                Ok(LiveUpdate::Alert {
                    printer_id,
                    message,
                }) => {
                    info!("alert for {printer_id}: {message}");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("live update logger lagged, skipped {skipped} updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let scheduler = SchedulerHandle::spawn(registry.clone(), registry, table, sink);

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining in-flight cycles");
    scheduler.shutdown().await;

    Ok(())
}
