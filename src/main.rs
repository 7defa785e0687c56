//! `labserial` command-line front end.
//!
//! ```bash
//! labserial ports --filter ACM
//! labserial apply --port /dev/ttyACM0 --voltage 1000
//! labserial apply --port /dev/ttyACM0 --voltage 1000 --frequency 5 --user my_commands.json
//! labserial stop --port /dev/ttyACM0
//! labserial zero    # the only port matching the load cell's port_filter
//! labserial measure --port /dev/ttyUSB0 --count 10 --interval-ms 500
//! labserial --dry-run apply --port mock --voltage 1000
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use labserial::adapters::{Adapter, MockAdapter};
use labserial::catalog::CommandCatalog;
use labserial::config::{check_baud_rate, DeviceSettings, Settings, DEFAULT_SETTINGS_PATH};
use labserial::connection::ConnectionConfig;
use labserial::discovery::SystemPorts;
use labserial::error::AppResult;
use labserial::instrument::{HighVoltageController, Instrument, Loadcell};
use labserial::logging;
use labserial::resolver::ResolutionQuery;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "labserial", version, about = "Drive the DIY high-voltage supply and the load cell over serial")]
struct Cli {
    /// Settings file (TOML); missing file means defaults
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Use an in-memory port and print the frames instead of touching hardware
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports matching the device's port filter
    Ports {
        #[arg(long, value_enum, default_value_t = DeviceKind::HighVoltage)]
        device: DeviceKind,
        /// Description substring; overrides the configured filter
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show the merged command catalog
    Catalog {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Print the effective settings as TOML
    Settings,
    /// Resolve a voltage (and frequency) and send the command
    Apply {
        #[command(flatten)]
        port: PortArgs,
        #[command(flatten)]
        catalog: CatalogArgs,
        #[arg(long)]
        voltage: String,
        /// Selects dynamic mode when given
        #[arg(long)]
        frequency: Option<String>,
    },
    /// Send the catalog's stop command
    Stop {
        #[command(flatten)]
        port: PortArgs,
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Read tension from the load cell
    Measure {
        #[command(flatten)]
        port: PortArgs,
        #[arg(long, default_value_t = 1)]
        count: u32,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Zero the load cell
    Zero {
        #[command(flatten)]
        port: PortArgs,
    },
    /// Send a literal command
    Raw {
        #[command(flatten)]
        port: PortArgs,
        #[arg(long, value_enum, default_value_t = DeviceKind::HighVoltage)]
        device: DeviceKind,
        /// Wait for and print one response line
        #[arg(long)]
        query: bool,
        command: String,
    },
}

#[derive(Args, Debug)]
struct PortArgs {
    /// Port path, e.g. /dev/ttyACM0 or COM3; defaults to the only port
    /// matching the device's port filter
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baud: Option<u32>,
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct CatalogArgs {
    /// User command file overlaying the defaults
    #[arg(long)]
    user: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DeviceKind {
    HighVoltage,
    Loadcell,
}

enum HvAction {
    Apply(ResolutionQuery),
    Stop,
}

enum LoadcellAction {
    Measure { count: u32, interval: Duration },
    Zero,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load settings from '{}'", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        settings.application.log_level = level;
        settings.validate()?;
    }
    logging::init(&settings.application.log_level);

    match cli.command {
        Command::Ports { device, filter } => {
            let mut device_config = device_settings(&settings, device).clone();
            if let Some(filter) = filter {
                device_config.port_filter = filter;
            }
            let config = device_config.connection_config("");
            let mut selection = match device {
                DeviceKind::HighVoltage => HighVoltageController::new(config)
                    .with_port_filter(device_config.port_filter)
                    .port_selection(),
                DeviceKind::Loadcell => Loadcell::new(config)
                    .with_port_filter(device_config.port_filter)
                    .port_selection(),
            };
            selection.refresh().context("Failed to list serial ports")?;
            if selection.ports().is_empty() {
                println!("No serial ports match {:?}", selection.filter());
            }
            for port in selection.ports() {
                println!("{:<40} {}", port.label(), port.description);
            }
        }
        Command::Catalog { catalog } => {
            let catalog = load_catalog(&settings, &catalog)?;
            print_catalog(&catalog);
        }
        Command::Settings => {
            print!("{}", settings.to_toml()?);
        }
        Command::Apply {
            port,
            catalog,
            voltage,
            frequency,
        } => {
            let catalog = load_catalog(&settings, &catalog)?;
            let query = match frequency {
                Some(frequency) => ResolutionQuery::for_dynamic(voltage, frequency),
                None => ResolutionQuery::for_static(voltage),
            };
            let setup = DeviceSetup::new(&settings.high_voltage, &port, cli.dry_run)?;
            dispatch_hv(setup, cli.dry_run, &catalog, HvAction::Apply(query))?;
        }
        Command::Stop { port, catalog } => {
            let catalog = load_catalog(&settings, &catalog)?;
            let setup = DeviceSetup::new(&settings.high_voltage, &port, cli.dry_run)?;
            dispatch_hv(setup, cli.dry_run, &catalog, HvAction::Stop)?;
        }
        Command::Measure {
            port,
            count,
            interval_ms,
        } => {
            let setup = DeviceSetup::new(&settings.loadcell, &port, cli.dry_run)?;
            let action = LoadcellAction::Measure {
                count,
                interval: Duration::from_millis(interval_ms),
            };
            dispatch_loadcell(setup, cli.dry_run, action)?;
        }
        Command::Zero { port } => {
            let setup = DeviceSetup::new(&settings.loadcell, &port, cli.dry_run)?;
            dispatch_loadcell(setup, cli.dry_run, LoadcellAction::Zero)?;
        }
        Command::Raw {
            port,
            device,
            query,
            command,
        } => {
            let setup = DeviceSetup::new(device_settings(&settings, device), &port, cli.dry_run)?;
            let filter = setup.port_filter.clone();
            let mock = MockAdapter::new();
            if query {
                mock.push_line("");
            }
            let response = match (device, cli.dry_run) {
                (DeviceKind::HighVoltage, false) => raw(
                    HighVoltageController::new(setup.config).with_port_filter(filter),
                    &command,
                    query,
                )?,
                (DeviceKind::HighVoltage, true) => raw(
                    HighVoltageController::with_adapter(mock.clone(), setup.config),
                    &command,
                    query,
                )?,
                (DeviceKind::Loadcell, false) => raw(
                    Loadcell::new(setup.config).with_port_filter(filter),
                    &command,
                    query,
                )?,
                (DeviceKind::Loadcell, true) => raw(
                    Loadcell::with_adapter(mock.clone(), setup.config),
                    &command,
                    query,
                )?,
            };
            if let Some(response) = response {
                println!("{}", response);
            }
            if cli.dry_run {
                print_frames(&mock);
            }
        }
    }

    Ok(())
}

fn device_settings(settings: &Settings, device: DeviceKind) -> &DeviceSettings {
    match device {
        DeviceKind::HighVoltage => &settings.high_voltage,
        DeviceKind::Loadcell => &settings.loadcell,
    }
}

/// Connection settings and port filter for one device invocation.
struct DeviceSetup {
    config: ConnectionConfig,
    port_filter: String,
}

impl DeviceSetup {
    /// Settings overlaid by the command line. An empty port is picked later
    /// from the device's port filter; dry runs never look at the host.
    fn new(device: &DeviceSettings, args: &PortArgs, dry_run: bool) -> Result<Self> {
        let port = match (&args.port, dry_run) {
            (Some(port), _) => port.clone(),
            (None, true) => "mock".to_string(),
            (None, false) => String::new(),
        };
        let mut config = device.connection_config(port);
        if let Some(baud) = args.baud {
            check_baud_rate(baud).context("Invalid --baud")?;
            config.baud_rate = baud;
        }
        if let Some(timeout_ms) = args.timeout_ms {
            config.timeout = Duration::from_millis(timeout_ms);
        }
        Ok(Self {
            config,
            port_filter: device.port_filter.clone(),
        })
    }
}

fn ensure_port<I: Instrument>(instrument: &mut I) -> AppResult<()> {
    if instrument.connection().config().port.is_empty() {
        let port = instrument.auto_select_port(SystemPorts)?;
        println!("Using {} for the {}", port, instrument.id());
    }
    Ok(())
}

fn load_catalog(settings: &Settings, args: &CatalogArgs) -> Result<CommandCatalog> {
    let mut settings = settings.clone();
    if let Some(user) = &args.user {
        settings.catalog.user_path = Some(user.clone());
    }
    settings
        .load_catalog()
        .context("Failed to load command catalog")
}

fn print_catalog(catalog: &CommandCatalog) {
    println!("stop: {}", catalog.stop_command());
    println!("static voltages: {}", catalog.static_voltages().join(", "));
    println!("dynamic voltages: {}", catalog.dynamic_voltages().join(", "));
    println!("dynamic frequencies: {}", catalog.dynamic_frequencies().join(", "));
    println!();
    for entry in catalog.static_entries() {
        println!("static  V={:<8} -> {}", entry.voltage, entry.command);
    }
    for entry in catalog.dynamic_entries() {
        println!(
            "dynamic V={:<8} f={:<6} -> {}",
            entry.voltage, entry.frequency, entry.command
        );
    }
}

fn print_frames(mock: &MockAdapter) {
    for frame in mock.written_frames() {
        println!("> {:?}", frame);
    }
}

fn dispatch_hv(
    setup: DeviceSetup,
    dry_run: bool,
    catalog: &CommandCatalog,
    action: HvAction,
) -> Result<()> {
    if dry_run {
        let mock = MockAdapter::new();
        let hv = HighVoltageController::with_adapter(mock.clone(), setup.config);
        run_hv(hv, catalog, action)?;
        print_frames(&mock);
    } else {
        let hv = HighVoltageController::new(setup.config).with_port_filter(setup.port_filter);
        run_hv(hv, catalog, action)?;
    }
    Ok(())
}

fn run_hv<A: Adapter>(
    mut hv: HighVoltageController<A>,
    catalog: &CommandCatalog,
    action: HvAction,
) -> Result<()> {
    // Resolve before claiming the port so an unknown selection touches nothing
    if let HvAction::Apply(query) = &action {
        labserial::resolver::resolve(catalog, query)?;
    }
    ensure_port(&mut hv)?;
    hv.open()
        .with_context(|| format!("Failed to open the {}", hv.id()))?;
    match action {
        HvAction::Apply(query) => {
            let command = hv.apply(catalog, &query)?;
            println!("Sent '{}' ({})", command, query);
        }
        HvAction::Stop => {
            hv.stop(catalog)?;
            println!("Sent stop '{}'", catalog.stop_command());
        }
    }
    hv.close();
    Ok(())
}

fn dispatch_loadcell(setup: DeviceSetup, dry_run: bool, action: LoadcellAction) -> Result<()> {
    if dry_run {
        let mock = MockAdapter::new();
        if let LoadcellAction::Measure { count, .. } = &action {
            for _ in 0..*count {
                mock.push_line("0.0");
            }
        }
        run_loadcell(Loadcell::with_adapter(mock.clone(), setup.config), action)?;
        print_frames(&mock);
    } else {
        let cell = Loadcell::new(setup.config).with_port_filter(setup.port_filter);
        run_loadcell(cell, action)?;
    }
    Ok(())
}

fn run_loadcell<A: Adapter>(mut cell: Loadcell<A>, action: LoadcellAction) -> Result<()> {
    ensure_port(&mut cell)?;
    cell.open()
        .with_context(|| format!("Failed to open the {}", cell.id()))?;
    match action {
        LoadcellAction::Measure { count, interval } => {
            cell.reset_buffers()?;
            for index in 0..count {
                if index > 0 {
                    std::thread::sleep(interval);
                }
                match cell.measure() {
                    Ok(reading) => println!("{} {} {}", reading.parameter, reading.value, reading.unit),
                    Err(e) if e.is_recoverable() => warn!("Reading {} skipped: {}", index + 1, e),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        LoadcellAction::Zero => {
            cell.fix_zero()?;
            println!("Load cell zeroed");
        }
    }
    cell.close();
    Ok(())
}

fn raw<I: Instrument>(mut instrument: I, command: &str, query: bool) -> AppResult<Option<String>> {
    ensure_port(&mut instrument)?;
    instrument.open()?;
    let response = if query {
        Some(instrument.query(command)?)
    } else {
        instrument.send(command)?;
        None
    };
    instrument.close();
    Ok(response)
}
