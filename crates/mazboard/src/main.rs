//! mazboard - play MIDI on a spare keyboard, release Tab to go back to typing

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use mazboard::{
    config::Config,
    device::{list_devices, KeyboardDevice},
    dispatcher::{KeyEventDispatcher, POLL_INTERVAL},
    keymap::{note_name, KeyMap},
    midi::{self, MidiBackend},
};

#[derive(Parser)]
#[command(name = "mazboard")]
#[command(author, version, about = "Keyboard to MIDI with a Tab-toggled typewriter mode", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (default: ~/.config/mazboard/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Open this event node instead of searching by USB id
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// USB vendor id (decimal or 0x hex)
    #[arg(long, value_parser = parse_id)]
    vendor_id: Option<u16>,

    /// USB product id (decimal or 0x hex)
    #[arg(long, value_parser = parse_id)]
    product_id: Option<u16>,

    /// MIDI output backend
    #[arg(short, long, value_enum)]
    backend: Option<MidiBackend>,

    /// MIDI output port name
    #[arg(long)]
    port_name: Option<String>,

    /// MIDI channel (0-15)
    #[arg(long)]
    channel: Option<u8>,

    /// Velocity (1-127)
    #[arg(long)]
    velocity: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init,
    /// Show the configuration file path
    ConfigPath,
    /// List input devices with their USB ids
    ListDevices,
}

impl Cli {
    /// Command line values win over the config file. Range checks are left
    /// to the dispatcher.
    fn apply_overrides(self, config: &mut Config) {
        if let Some(path) = self.device {
            config.device.path = Some(path);
        }
        if let Some(vendor_id) = self.vendor_id {
            config.device.vendor_id = vendor_id;
        }
        if let Some(product_id) = self.product_id {
            config.device.product_id = product_id;
        }
        if let Some(backend) = self.backend {
            config.midi.backend = backend;
        }
        if let Some(port_name) = self.port_name {
            config.midi.port_name = port_name;
        }
        if let Some(channel) = self.channel {
            config.midi.channel = channel;
        }
        if let Some(velocity) = self.velocity {
            config.midi.velocity = velocity;
        }
    }
}

fn parse_id(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid id {:?}: {}", s, e))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut cli = Cli::parse();

    match cli.command.take() {
        Some(Commands::Init) => {
            let path = Config::create_default_config_file()?;
            println!("Created default config at: {}", path.display());
            return Ok(());
        }
        Some(Commands::ConfigPath) => {
            let path = Config::config_path()?;
            println!("{}", path.display());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            println!("Available input devices:");
            for device in list_devices() {
                println!("  {}", device);
            }
            return Ok(());
        }
        None => {}
    }

    // Load config
    let mut config = if let Some(path) = &cli.config {
        Config::load_from(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default()
    };

    cli.apply_overrides(&mut config);

    run(config)
}

fn run(config: Config) -> Result<()> {
    for device in list_devices() {
        log::debug!("Input device: {}", device);
    }

    let mut device = match &config.device.path {
        Some(path) => KeyboardDevice::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?,
        None => KeyboardDevice::find(config.device.vendor_id, config.device.product_id)
            .context("Please check the vendor and product IDs")?,
    };

    let mut midi_output = midi::open_output(&config.midi)?;

    let keymap = KeyMap::reference();
    for mapping in keymap.mappings() {
        log::debug!("{:?} -> {} ({})", mapping.key, mapping.note, note_name(mapping.note));
    }
    let mut dispatcher = KeyEventDispatcher::new(keymap)
        .with_channel(config.midi.channel)
        .with_velocity(config.midi.velocity);

    // First signal stops the loop, a second one exits immediately
    let quit = Arc::new(AtomicBool::new(false));
    for &signal in signal_hook::consts::TERM_SIGNALS {
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&quit))?;
        signal_hook::flag::register(signal, Arc::clone(&quit))?;
    }

    log::info!(
        "Listening to {} for MIDI events (release {:?} to switch modes)",
        device.info().name,
        dispatcher.keymap().toggle_key()
    );

    dispatcher
        .run(&mut device, midi_output.as_mut(), &quit, POLL_INTERVAL)
        .context("Lost the keyboard device")
}
