//! lgmux - inspect Logitech receivers, keyboards and mice over hidraw.

#![deny(clippy::unwrap_used)]

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use lgmux::backends::hid::{matching_devices, open_path};
use lgmux::{logging, Config, Device, DeviceManager, ScrollMode, ScrollModeSetting};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "lgmux")]
#[command(about = "Multiplexer for Logitech extended HID reports")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List HID devices with a registered driver
    Probe,

    /// Attach every matching device and log traffic until Enter is pressed
    Monitor,

    /// Print the battery level of a device
    Battery {
        /// hidraw path of the transport
        path: String,

        /// Receiver slot (1-3) when the path is a receiver
        #[arg(short, long)]
        slot: Option<u8>,
    },

    /// Print or change the scroll mode of an MX Revolution
    ScrollMode {
        /// hidraw path of the transport
        path: String,

        /// Receiver slot (1-3) when the path is a receiver
        #[arg(short, long)]
        slot: Option<u8>,

        /// New mode: 1-4 static, 5 automatic, 7 button switch, 8 button toggle
        #[arg(long)]
        set: Option<u8>,

        /// First mode parameter (up threshold or button)
        #[arg(long, requires = "set")]
        first: Option<u8>,

        /// Second mode parameter (down threshold or button)
        #[arg(long, requires = "set")]
        second: Option<u8>,

        /// Store the mode as the mouse's default
        #[arg(long, requires = "set")]
        default: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    logging::init(&config.log.filter);

    let api = hidapi::HidApi::new().context("initializing hidapi")?;
    let manager = DeviceManager::with_pool(config).context("starting task pool")?;

    match cli.command {
        Commands::Probe => probe(&api, &manager),
        Commands::Monitor => monitor(&api, &manager),
        Commands::Battery { path, slot } => {
            let device = resolve(&api, &manager, &path, slot)?;
            println!("{}%", device.battery()?);
            Ok(())
        }
        Commands::ScrollMode {
            path,
            slot,
            set,
            first,
            second,
            default,
        } => {
            let device = resolve(&api, &manager, &path, slot)?;
            if let Some(id) = set {
                let mode = ScrollMode::from_parts(id, first, second)?;
                device.set_scroll_mode(&ScrollModeSetting::new(mode, default))?;
            }
            println!("{}", device.scroll_mode()?);
            Ok(())
        }
    }
}

fn probe(api: &hidapi::HidApi, manager: &DeviceManager) -> Result<()> {
    let registry = manager.registry();
    for info in matching_devices(api, registry) {
        let key = lgmux::backends::hid::match_key_of(info);
        let driver = registry
            .find_by_match_key(key)
            .map(|d| d.name())
            .unwrap_or("?");
        println!("{}  {key}  {driver}", info.path().to_string_lossy());
    }
    Ok(())
}

fn monitor(api: &hidapi::HidApi, manager: &DeviceManager) -> Result<()> {
    let devices = manager.attach_hid(api);
    if devices.is_empty() {
        bail!("no matching devices");
    }
    println!("monitoring {} device(s), press Enter to stop", devices.len());
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    println!("{}", manager.snapshot().to_json()?);
    manager.detach_all();
    Ok(())
}

/// Attaches `path` and returns either its device or, with `slot`, the device that
/// logs on at that receiver slot.
fn resolve(
    api: &hidapi::HidApi,
    manager: &DeviceManager,
    path: &str,
    slot: Option<u8>,
) -> Result<Arc<Device>> {
    let transport = open_path(api, manager.registry(), path)
        .ok_or_else(|| anyhow!("{path}: no matching device"))??;
    let device = manager.attach(Arc::new(transport))?;
    let Some(slot) = slot else {
        return Ok(device);
    };

    let receiver = device
        .as_receiver()
        .ok_or_else(|| anyhow!("{path} is not a receiver"))?;
    let deadline = Instant::now() + manager.config().requests.timeout();
    loop {
        if let Some(found) = receiver.slot(slot) {
            return Ok(found);
        }
        if Instant::now() >= deadline {
            bail!("no device logged on at slot {slot}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
