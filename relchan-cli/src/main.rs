use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use relchan_cli::commands::{self, chat::Endpoint, soak::SoakOptions};
use relchan_cli::{load_config, wire_format};
use relchan_core::pipe::Faults;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "relchan")]
#[command(about = "Relchan - Reliable message channel over noisy byte media", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON channel configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON array of messages as DAT packets
    Encode {
        /// Input JSON file (array of payloads)
        #[arg(short, long)]
        input: String,

        /// Output file for encoded packets
        #[arg(short, long)]
        output: String,

        /// Index of the first packet
        #[arg(long, default_value = "0")]
        start_index: u32,

        /// Big-endian length and index fields
        #[arg(long)]
        big_endian: bool,

        /// CRC-32C checksums instead of XOR
        #[arg(long)]
        crc32c: bool,
    },

    /// Scan a damaged capture and recover packets
    Scan {
        /// Input file to scan
        #[arg(short, long)]
        input: String,

        /// Output JSON file for recovered packets
        #[arg(short, long)]
        output: Option<String>,

        /// Show statistics only
        #[arg(long)]
        stats_only: bool,

        /// Big-endian length and index fields
        #[arg(long)]
        big_endian: bool,

        /// CRC-32C checksums instead of XOR
        #[arg(long)]
        crc32c: bool,
    },

    /// Check that a capture is a clean back-to-back packet stream
    Verify {
        /// Input file to verify ("-" for stdin)
        #[arg(short, long)]
        input: String,

        /// Big-endian length and index fields
        #[arg(long)]
        big_endian: bool,

        /// CRC-32C checksums instead of XOR
        #[arg(long)]
        crc32c: bool,
    },

    /// Push messages between two channels over a faulty in-memory link
    Soak {
        /// Number of messages
        #[arg(long, default_value = "100")]
        messages: usize,

        /// Payload size in bytes
        #[arg(long, default_value = "64")]
        size: usize,

        /// Probability of dropping a whole write
        #[arg(long, default_value = "0")]
        loss: f64,

        /// Probability of dropping a single byte
        #[arg(long, default_value = "0")]
        byte_loss: f64,

        /// Probability of flipping a bit in a single byte
        #[arg(long, default_value = "0")]
        bit_flip: f64,

        /// Fault RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Retransmission interval in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Chat with a peer over TCP
    Chat {
        /// Address to listen on
        #[arg(long, conflicts_with = "connect", required_unless_present = "connect")]
        listen: Option<String>,

        /// Address to connect to
        #[arg(long)]
        connect: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    // Execute command
    match cli.command {
        Commands::Encode {
            input,
            output,
            start_index,
            big_endian,
            crc32c,
        } => {
            let wire = wire_format(config.wire, big_endian, crc32c);
            commands::encode::execute(&input, &output, start_index, &wire)
        }

        Commands::Scan {
            input,
            output,
            stats_only,
            big_endian,
            crc32c,
        } => {
            let wire = wire_format(config.wire, big_endian, crc32c);
            commands::scan::execute(&input, output.as_deref(), stats_only, &wire)
        }

        Commands::Verify {
            input,
            big_endian,
            crc32c,
        } => {
            let wire = wire_format(config.wire, big_endian, crc32c);
            let report = commands::verify::execute(&input, &wire)?;
            if !report.is_clean() {
                bail!("Verification failed");
            }
            Ok(())
        }

        Commands::Soak {
            messages,
            size,
            loss,
            byte_loss,
            bit_flip,
            seed,
            timeout_ms,
        } => {
            if let Some(ms) = timeout_ms {
                let timeout = Duration::from_millis(ms);
                let connect_timeout = config.connect_timeout.max(timeout);
                config = config
                    .timeout(timeout)
                    .frame_timeout(timeout)
                    .connect_timeout(connect_timeout);
                config.validate()?;
            }

            let mut faults = Faults::none().loss(loss).byte_loss(byte_loss).bit_flip(bit_flip);
            if let Some(seed) = seed {
                faults = faults.seed(seed);
            }

            let options = SoakOptions {
                messages,
                size,
                faults,
                progress: true,
            };
            let report = commands::soak::execute(&config, &options)?;
            if !report.is_complete() {
                bail!("Soak run lost or reordered messages");
            }
            Ok(())
        }

        Commands::Chat { listen, connect } => {
            let endpoint = match (listen, connect) {
                (Some(addr), _) => Endpoint::Listen(addr),
                (None, Some(addr)) => Endpoint::Connect(addr),
                (None, None) => bail!("Either --listen or --connect is required"),
            };
            commands::chat::execute(&config, &endpoint)
        }
    }
}
