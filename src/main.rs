use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use fridgemon::{monitor, FridgeClient, FridgeEvent, FridgeSnapshot, MonitorConfig, StatusSink};

/// Fridge monitor for Alpicool / Brass Monkey fridges.
#[derive(Parser)]
#[command(name = "fridgemon", version)]
struct Args {
    /// Bluetooth address of the fridge
    address: String,

    /// Press the settings button on the fridge to confirm fridge selection
    #[arg(short, long)]
    bind: bool,

    /// Poll at regular intervals (default: query once)
    #[arg(short = 'l', long = "loop")]
    poll: bool,

    /// Poll interval in seconds
    #[arg(short = 't', long, default_value_t = 10)]
    poll_interval: u64,

    /// Log command and notification frames
    #[arg(short, long)]
    verbose: bool,
}

/// Publishes status reports as JSON lines on standard output.
struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn publish(&mut self, address: &str, event: FridgeEvent) {
        match event {
            FridgeEvent::Online => info!("fridge {address} is online"),
            FridgeEvent::Offline => info!("fridge {address} is offline"),
            FridgeEvent::StateChanged(snapshot) => print_report(&snapshot),
        }
    }
}

fn print_report(snapshot: &FridgeSnapshot) {
    match serde_json::to_string(&snapshot.report()) {
        Ok(json) => println!("{json}"),
        Err(err) => error!("failed to serialize status: {err}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "info,fridgemon=trace" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let client = FridgeClient::connect(&args.address).await?;
    client.set_status_observer(|snapshot| print_report(snapshot));

    let mut session = client;
    let mut sink = ConsoleSink;
    let config = MonitorConfig {
        bind: args.bind,
        poll: args.poll,
        poll_interval: Duration::from_secs(args.poll_interval),
    };

    let result = monitor::run(&mut session, &mut sink, &args.address, &config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;

    if let Err(err) = session.stop().await {
        warn!("disconnect failed: {err}");
    }

    result?;
    Ok(())
}
