//! VBAN Emitter
//!
//! Sends a single service beacon with a free-text message and exits.
//!
//! # Usage
//!
//! ```bash
//! vban-emitter -i 192.168.1.255 -p 6980 "studio B online"
//! ```

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use vban_link::{
    beacon::{self, BeaconBuilder, Role, MAX_MESSAGE_LEN},
    config,
    constants::DEFAULT_LOG_LEVEL,
    error::ProtocolError,
    logging::{self, MAX_LOG_LEVEL},
    network::send_datagram,
};

#[derive(Parser)]
#[command(name = "vban-emitter")]
#[command(author, version, about = "Send a VBAN service beacon")]
struct Args {
    /// Destination IP address (broadcast allowed)
    #[arg(short = 'i', long = "ipaddress")]
    ipaddress: IpAddr,

    /// Destination UDP port
    #[arg(short = 'p', long)]
    port: u16,

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

    /// Text appended to the beacon
    message: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.loglevel);

    let config = config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let dest = SocketAddr::new(args.ipaddress, args.port);
    let descriptor = beacon::descriptor(&config.identity, Role::Emitter, dest);

    let datagram = match BeaconBuilder::new(descriptor).message(args.message).build() {
        Ok(datagram) => datagram,
        Err(e @ ProtocolError::MessageTooLong { .. }) => Args::command()
            .error(
                ErrorKind::ValueValidation,
                format!("{} (messages are limited to {} bytes)", e, MAX_MESSAGE_LEN),
            )
            .exit(),
        Err(e) => return Err(e.into()),
    };

    send_datagram(dest, &datagram)?;
    tracing::info!("Sent {} byte beacon to {}", datagram.len(), dest);
    Ok(())
}
