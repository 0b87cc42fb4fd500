use std::path::PathBuf;

use anyhow::Context as _;
use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use clap::{Parser, ValueEnum};
use log::info;

use vitals_gateway::config::AppConfig;
use vitals_gateway::manager;
use vitals_gateway::retained::{FileRetainedStore, RetainedStore as _};
use vitals_gateway::WakeCause;

#[derive(Parser, Debug)]
#[command(version, about = "Vital-sign sensor gateway")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Wake cause reported for the first boot
    #[arg(long, value_enum, default_value_t = Wake::Other)]
    wake: Wake,

    /// Forget everything retained, as after a full power loss
    #[arg(long)]
    cold_boot: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Wake {
    Trigger,
    Timer,
    Other,
}

impl From<Wake> for WakeCause {
    fn from(wake: Wake) -> Self {
        match wake {
            Wake::Trigger => WakeCause::Trigger,
            Wake::Timer => WakeCause::Timer,
            Wake::Other => WakeCause::Other,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    let mut store = FileRetainedStore::new(config.retained_path());
    if args.cold_boot {
        info!("Cold boot requested, clearing {}", store.path().display());
        store.clear()?;
    }

    let bt_manager = Manager::new().await?;

    // get the first bluetooth adapter
    let adapters = bt_manager.adapters().await?;
    let central = adapters
        .into_iter()
        .next()
        .context("no Bluetooth adapter found")?;

    let core = manager::Manager::new(central, config.settings(), store);
    core.run_loop(args.wake.into()).await
}
