//! VBAN Receptor
//!
//! Plays one VBAN audio stream on a local output and announces itself to the
//! sender with periodic service beacons.
//!
//! # Usage
//!
//! ```bash
//! vban-receptor -i 192.168.1.22 -p 6980 -s Stream1
//! vban-receptor -i 0.0.0.0 -p 6980 -s Stream1 -b pipe -c 1,0 | aplay -f S16_LE -c 2 -r 48000
//! vban-receptor --list-devices
//! ```

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use vban_link::{
    audio::{
        backend::MAX_QUALITY, list_output_devices, parse_channel_list, requested_buffer_frames,
        BackendOptions, BackendRegistry,
    },
    beacon::{self, BeaconBuilder, Role},
    config,
    constants::*,
    logging::{self, MAX_LOG_LEVEL},
    network::{ReceptorSocket, SocketOptions},
    protocol::{StreamName, STREAM_NAME_SIZE},
    receptor::{Receptor, ReceptorSettings},
    shutdown::{spawn_signal_listener, ShutdownToken},
};

#[derive(Parser)]
#[command(name = "vban-receptor")]
#[command(author, version, about = "VBAN audio receptor")]
struct Args {
    /// IP address of the sender (0.0.0.0 accepts any source)
    #[arg(short = 'i', long = "ipaddress", required_unless_present = "list_devices")]
    ipaddress: Option<IpAddr>,

    /// UDP port to listen on
    #[arg(short = 'p', long, required_unless_present = "list_devices")]
    port: Option<u16>,

    /// Stream name to play (up to 16 bytes)
    #[arg(short = 's', long = "streamname", required_unless_present = "list_devices")]
    streamname: Option<String>,

    /// Output backend
    #[arg(short = 'b', long, default_value = DEFAULT_BACKEND)]
    backend: String,

    /// Network quality 0..16; higher buffers more against jitter
    #[arg(
        short = 'q',
        long,
        default_value_t = DEFAULT_QUALITY,
        value_parser = clap::value_parser!(u8).range(0..=MAX_QUALITY as i64)
    )]
    quality: u8,

    /// Comma separated 0-based source channels to play, e.g. "1,0"
    #[arg(short = 'c', long)]
    channels: Option<String>,

    /// Output device name, or file path for the file backend
    #[arg(short = 'd', long)]
    device: Option<String>,

    /// Log level 0..4 (RUST_LOG overrides)
    #[arg(
        short = 'l',
        long,
        default_value_t = DEFAULT_LOG_LEVEL,
        value_parser = clap::value_parser!(u8).range(0..=MAX_LOG_LEVEL as i64)
    )]
    loglevel: u8,

    /// Configuration file (defaults to config.toml in the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List output devices of the cpal backend and exit
    #[arg(long)]
    list_devices: bool,
}

fn usage_error(kind: ErrorKind, message: impl std::fmt::Display) -> ! {
    Args::command().error(kind, message).exit()
}

fn print_devices() {
    println!("\n=== Available Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.loglevel);

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let (Some(ip), Some(port), Some(stream_name)) = (args.ipaddress, args.port, args.streamname)
    else {
        usage_error(
            ErrorKind::MissingRequiredArgument,
            "--ipaddress, --port and --streamname are required",
        );
    };

    if stream_name.len() > STREAM_NAME_SIZE {
        tracing::warn!(
            "Stream name {:?} is longer than {} bytes and will be truncated",
            stream_name,
            STREAM_NAME_SIZE
        );
    }

    let channel_selection = match args.channels.as_deref() {
        Some(list) => {
            parse_channel_list(list).unwrap_or_else(|e| usage_error(ErrorKind::ValueValidation, e))
        }
        None => Vec::new(),
    };

    let registry = BackendRegistry::with_defaults();
    if !registry.contains(&args.backend) {
        usage_error(
            ErrorKind::InvalidValue,
            format!(
                "unknown backend '{}'\n\nAvailable backends:\n{}",
                args.backend,
                registry.help()
            ),
        );
    }

    let config = config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let peer = SocketAddr::new(ip, port);
    let descriptor = beacon::descriptor(&config.identity, Role::Receptor, peer);
    let beacon = BeaconBuilder::new(descriptor).build()?;

    let settings = ReceptorSettings {
        stream_name: StreamName::new(&stream_name),
        channel_selection,
        buffer_frames: requested_buffer_frames(args.quality),
        beacon_interval: config.receptor.beacon_interval,
    };

    tracing::info!("Starting VBAN receptor for stream {}", settings.stream_name);

    let socket_options = SocketOptions {
        recv_buffer_size: config.receptor.recv_buffer_size,
        read_timeout: Some(Duration::from_millis(config.receptor.read_timeout_ms)),
        broadcast: true,
    };
    let socket = ReceptorSocket::bind(peer, &socket_options)?;

    let shutdown = ShutdownToken::new();
    let _signals = spawn_signal_listener(shutdown.clone());

    let backend_name = args.backend;
    let backend_options = BackendOptions {
        device: args.device,
    };

    // Playback handles are not Send, so the whole pipeline lives on one
    // blocking thread
    tokio::task::spawn_blocking(move || -> Result<()> {
        let backend = registry.create(&backend_name, &backend_options)?;
        let mut receptor = Receptor::new(socket, backend, settings, beacon);
        let result = receptor.run(&shutdown);
        receptor.stats().log_summary();
        Ok(result?)
    })
    .await
    .context("Receive loop panicked")??;

    tracing::info!("Receptor stopped");
    Ok(())
}
