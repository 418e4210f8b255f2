use std::env;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use quickmeet::control_surface::DEFAULT_WS_ADDR;
use quickmeet::simulation::{HostScenario, SimulatedCalendar};
use quickmeet::{ControlSurfaceBridge, DialogWatcher, Engine, EngineConfig};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Quickmeet server - watches a simulated calendar dialog and serves control-surface requests over WebSocket"
)]
struct Args {
    /// Address the control surface bridge listens on
    #[arg(short, long, default_value = DEFAULT_WS_ADDR)]
    addr: String,

    /// Host behavior to simulate
    #[arg(short, long, value_enum, default_value = "submenu")]
    scenario: Scenario,

    /// JSON engine configuration; QUICKMEET_* variables override its fields
    #[arg(short, long, env = "QUICKMEET_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Conference link already present
    AlreadyAttached,
    /// Provider-labelled control that attaches directly
    DirectProvider,
    /// Generic control opening a provider submenu
    Submenu,
    /// Generic control that attaches without a submenu
    SilentDirect,
    /// Template link plus a generic submenu control
    PlaceholderLink,
    /// Submenu whose provider item never attaches
    UnresponsiveMenu,
    /// No conferencing control at all
    NoAttachControl,
    /// Dialog without a visible save control
    Preview,
}

impl From<Scenario> for HostScenario {
    fn from(value: Scenario) -> Self {
        match value {
            Scenario::AlreadyAttached => HostScenario::AlreadyAttached,
            Scenario::DirectProvider => HostScenario::DirectProvider,
            Scenario::Submenu => HostScenario::Submenu,
            Scenario::SilentDirect => HostScenario::SilentDirect,
            Scenario::PlaceholderLink => HostScenario::PlaceholderLink,
            Scenario::UnresponsiveMenu => HostScenario::UnresponsiveMenu,
            Scenario::NoAttachControl => HostScenario::NoAttachControl,
            Scenario::Preview => HostScenario::Preview,
        }
    }
}

fn init_logging() -> Result<()> {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging()?;

    let config = EngineConfig::load(args.config.as_deref())?;
    tracing::info!("Provider: {}", config.provider_name);
    tracing::info!("Scenario: {:?}", args.scenario);

    let host = SimulatedCalendar::new(args.scenario.into());
    let engine = Engine::new(host.document(), config)?;
    let watcher = DialogWatcher::new(engine);
    watcher.start()?;

    let dialog = host.open_dialog()?;
    tracing::info!("Opened event dialog {}", dialog.describe());

    let bridge = ControlSurfaceBridge::start(&args.addr, watcher.clone()).await?;
    println!("Control surface listening on ws://{}", bridge.local_addr());
    println!(r#"Send {{"action":"force_check"}} to re-run discovery"#);
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!(
        "Shutting down: {} save click(s), {} attach click(s), {} menu click(s)",
        host.save_clicks(),
        host.attach_clicks(),
        host.menu_item_clicks()
    );
    drop(bridge);
    watcher.stop();

    Ok(())
}
