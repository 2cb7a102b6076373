use anyhow::Context;
use clap::{Parser, Subcommand};
use lightlink::infrastructure::ble::scanner;
use lightlink::infrastructure::logging::init_logger;
use lightlink::infrastructure::net::pubsub::PubSubTransport;
use lightlink::infrastructure::net::ws::WsTransport;
use lightlink::infrastructure::net::RemoteTransport;
use lightlink::{
    CommandType, LightBridge, Settings, SettingsService, StateCache, TransportKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "lightlink", about = "Bridge accessory handlers to BLE light bulbs")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the bridge until interrupted
    Run,
    /// Discover bulbs through the external scan command
    Scan {
        /// Only list devices whose name contains this string
        #[arg(long)]
        name: Option<String>,

        /// Scan duration in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u64,

        /// Scan command to shell out to
        #[arg(long, default_value = scanner::DEFAULT_SCAN_COMMAND)]
        command: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let service = SettingsService::new(cli.config)?;
    let settings = service.get().clone();
    let _logging = init_logger(&settings.log_settings)?;

    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Run => run(settings).await,
        Cmd::Scan {
            name,
            timeout,
            command,
        } => {
            let devices = scanner::scan(
                &command,
                name.as_deref(),
                Duration::from_secs(timeout),
            )
            .await?;
            for device in devices {
                println!("{} {}", device.mac, device.name);
            }
            Ok(())
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let cache = Arc::new(StateCache::new());
    let window = Duration::from_millis(settings.throttle_window_ms);

    let transport: Arc<dyn RemoteTransport> = match settings.transport {
        TransportKind::Websocket => {
            WsTransport::spawn(&settings.websocket, Arc::clone(&cache))
                .context("failed to start websocket transport")?
        }
        TransportKind::Pubsub => PubSubTransport::spawn(&settings.pubsub, Arc::clone(&cache))
            .context("failed to start pub/sub transport")?,
        TransportKind::Ble => anyhow::bail!(
            "the BLE strategy needs an embedded GATT backend; use lightlink as a library \
             and attach devices with LightBridge::add_ble_device"
        ),
    };

    let bridge = LightBridge::with_remote(Arc::clone(&cache), window, transport);

    for device in &settings.devices {
        let name = device.name.clone();
        bridge.register_state_handler(
            &device.mac,
            Arc::new(move |state| {
                info!(device = %name, ?state, "state changed");
            }),
        );
        // Prime the cache with a state query for each configured bulb.
        bridge
            .send_command(&device.mac, CommandType::GetState, None)
            .await;
    }

    info!(
        devices = settings.devices.len(),
        "bridge running, press ctrl-c to stop"
    );
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    bridge.shutdown().await;
    Ok(())
}
