mod commands;
mod config;
mod shutdown;
mod source;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use structlens_core::{SharedCatalog, VTableDirectory};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commands::Session;
use commands::chain::ChainArgs;
use commands::hex_utils::parse_hex_address;
use commands::map::MapArgs;
use commands::offsets::OffsetsArgs;
use commands::string::StringArgs;
use commands::vector::VectorArgs;
use commands::vtable::VTableCommand;
use commands::watch::WatchArgs;
use config::{Config, DEFAULT_CONFIG_PATH};
use shutdown::ShutdownSignal;
use source::SourceArgs;

#[derive(Parser)]
#[command(name = "structlens")]
#[command(about = "Schema-driven memory inspector")]
#[command(version)]
struct Args {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Schema document; overrides the config
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    /// Raw memory dump to read instead of a live process
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Load address of the snapshot (hex) when it has no `.maps` sidecar
    #[arg(long, global = true, value_parser = parse_hex_address)]
    base: Option<u64>,

    /// Attach to this process ID
    #[arg(long, global = true)]
    pid: Option<u32>,

    /// Attach to the configured process by name
    #[arg(long, global = true)]
    attach: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the schema and print its counts
    Check,
    /// Lay out a type at an address and print every field
    Offsets(OffsetsArgs),
    /// Print an entity's class chain and virtual functions
    Chain(ChainArgs),
    /// Walk a std::map / std::set
    Map(MapArgs),
    /// Decode a std::string / std::wstring
    String(StringArgs),
    /// List a std::vector
    Vector(VectorArgs),
    /// Query the virtual function table directory
    Vtable {
        #[command(subcommand)]
        command: VTableCommand,
    },
    /// Refresh a view until interrupted, printing changed values
    Watch(WatchArgs),
    /// Dump raw memory
    Hexdump {
        #[arg(value_parser = parse_hex_address)]
        address: u64,
        #[arg(short = 'n', long, default_value_t = 256)]
        size: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("structlens=info".parse()?))
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        let config = Config::load(&args.config)?;
        info!("Loaded config from {}", args.config.display());
        config
    } else {
        if args.config.as_os_str() != DEFAULT_CONFIG_PATH {
            warn!("Config {} not found, using defaults", args.config.display());
        }
        Config::default()
    };

    let session = Session::new(
        config,
        args.schema,
        SourceArgs {
            snapshot: args.snapshot,
            base: args.base,
            pid: args.pid,
            attach: args.attach,
        },
    );

    match args.command {
        Commands::Check => commands::check::run(&session.schema),
        Commands::Offsets(offsets) => {
            let catalog = session.load_catalog()?;
            let source = session.open_source()?;
            commands::offsets::run(&catalog, &source, session.layout_options(), &offsets)
        }
        Commands::Chain(chain) => {
            let catalog = session.load_catalog()?;
            let Some(address) = chain.addr else {
                for line in commands::chain::describe(&catalog, &chain) {
                    println!("{}", line);
                }
                return Ok(());
            };
            let source = session.open_source()?;
            let directory = match commands::vtable::load_directory(
                &source,
                &session.config.vtable,
                source.default_scan_region(),
            ) {
                Ok(directory) => directory,
                Err(e) => {
                    warn!("No vtable directory, slots will be unnamed: {:#}", e);
                    VTableDirectory::new()
                }
            };
            let lines =
                commands::chain::describe_resolved(&catalog, &source, address, &chain, &directory)?;
            for line in lines {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Map(map) => {
            let catalog = session.load_catalog()?;
            let source = session.open_source()?;
            commands::map::run(&catalog, &source, &map)
        }
        Commands::String(string) => {
            let source = session.open_source()?;
            commands::string::run(&source, &string)
        }
        Commands::Vector(vector) => {
            let catalog = session.load_catalog()?;
            let source = session.open_source()?;
            commands::vector::run(&catalog, &source, &vector)
        }
        Commands::Vtable { command } => {
            let source = session.open_source()?;
            let mut directory = commands::vtable::load_directory(
                &source,
                &session.config.vtable,
                source.default_scan_region(),
            )?;
            commands::vtable::run(&mut directory, &command)
        }
        Commands::Watch(watch) => {
            let shared = SharedCatalog::new(session.load_catalog()?);
            let source = session.open_source()?;
            let signal = ShutdownSignal::install_ctrlc()?;
            let interval =
                Duration::from_millis(watch.interval_ms.unwrap_or(session.config.refresh_interval_ms));
            commands::watch::run(
                &shared,
                &session.schema,
                &source,
                session.layout_options(),
                &watch,
                interval,
                &signal,
            )
        }
        Commands::Hexdump { address, size } => {
            let source = session.open_source()?;
            commands::hexdump::run(&source, address, size)
        }
    }
}
