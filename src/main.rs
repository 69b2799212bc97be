mod adjustor;
mod cli;
mod config;
mod device;
mod editor;
mod enumerate;
mod keymap;
mod knobs;
mod midi;
mod navigation;
mod params;
mod tui;
mod ui;

use std::io::Write;
use std::time::SystemTime;

use clap::Parser;
use cli::{Cli, Command, RunArgs};

use crate::device::{DeviceEvent, DeviceLink, MidiDevice, OfflineDevice};
use crate::editor::Editor;
use crate::midi::{KnobEvent, MidiManager};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Enumerate => {
            env_logger::init();
            enumerate::midi()
        }
        Command::Describe { ui, synth } => {
            env_logger::init();
            let ui = ui::load(&ui)?;
            let synth = params::load(&synth)?;
            let mut editor = Editor::new(ui, Box::new(synth), Box::new(OfflineDevice));
            print!("{}", editor.describe());
            Ok(())
        }
        Command::Run(args) => run(args),
    }
}

/// Custom logger that writes to stderr with \r\n line endings for raw mode.
struct RawModeLogger;

impl log::Log for RawModeLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default();
            let secs = now.as_secs() % 86400; // time of day
            let h = secs / 3600;
            let m = (secs % 3600) / 60;
            let s = secs % 60;
            let ms = now.subsec_millis();
            let _ = write!(
                std::io::stderr(),
                "[{h:02}:{m:02}:{s:02}.{ms:03} {} {}] {}\r\n",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static RAW_MODE_LOGGER: RawModeLogger = RawModeLogger;

fn run(args: RunArgs) -> anyhow::Result<()> {
    // Set up raw mode logger early so load messages are visible
    log::set_logger(&RAW_MODE_LOGGER).ok();
    log::set_max_level(
        std::env::var("RUST_LOG")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
    );

    match &args.config {
        Some(path) => config::init(config::load(path)?),
        None => config::init(config::Config::default()),
    }

    let ui = ui::load(&args.ui)?;
    let synth = params::load(&args.synth)?;
    log::info!("Loaded synth '{}' with {} parameter(s)", synth.name, synth.params.len());

    // Create channels
    let (device_tx, device_rx) = crossbeam_channel::bounded::<DeviceEvent>(1024);
    let (knob_tx, knob_rx) = crossbeam_channel::bounded::<KnobEvent>(256);

    let device_port = args.device.as_deref().or(config::device_port());
    let device: Box<dyn DeviceLink> = match device_port {
        Some(filter) => Box::new(MidiDevice::connect(filter, device_tx)?),
        None => {
            log::warn!("No device port configured, running offline");
            Box::new(OfflineDevice)
        }
    };

    let knobs_config = config::knobs();
    let knobs = match args.knobs.clone().or(knobs_config.port.clone()) {
        Some(filter) => {
            let mut manager = MidiManager::new(knob_tx, Some(filter), &knobs_config);
            manager.open_ports()?;
            log::info!("Knob controllers connected: {}", manager.connection_count());
            Some(manager)
        }
        None => None,
    };

    let mut editor = Editor::new(ui, Box::new(synth), device);
    log::info!("{}. Ctrl+Q or Ctrl+C to quit.", editor.title());

    tui::run(
        &mut editor,
        tui::Inputs {
            device_rx,
            knob_rx,
            knobs,
        },
    )?;

    log::info!("Stopping...");
    Ok(())
}
