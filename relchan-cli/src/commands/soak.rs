use anyhow::{bail, Context, Result};
use bytes::Bytes;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use relchan_core::{
    pipe::{duplex, Faults},
    ChannelConfig, ReliableChannel,
};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Parameters for one soak run
#[derive(Debug, Clone)]
pub struct SoakOptions {
    /// Messages pushed from one end to the other
    pub messages: usize,
    /// Payload size of each message
    pub size: usize,
    /// Faults applied to both directions of the link
    pub faults: Faults,
    /// Show a progress bar while receiving
    pub progress: bool,
}

impl Default for SoakOptions {
    fn default() -> Self {
        Self {
            messages: 100,
            size: 64,
            faults: Faults::none(),
            progress: true,
        }
    }
}

/// What came out of the far end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoakReport {
    pub sent: usize,
    /// Distinct messages received
    pub delivered: usize,
    /// Extra copies of the message received just before
    pub duplicates: usize,
    pub in_order: bool,
    pub elapsed: Duration,
}

impl SoakReport {
    /// Every message arrived, in order, possibly more than once
    pub fn is_complete(&self) -> bool {
        self.delivered == self.sent && self.in_order
    }

    /// Every message arrived exactly once, in order
    pub fn is_perfect(&self) -> bool {
        self.is_complete() && self.duplicates == 0
    }
}

/// Deterministic payload for message `n`: its number, padded to `size`
fn message(n: usize, size: usize) -> Bytes {
    let mut body = format!("{:08}", n).into_bytes();
    body.resize(size.max(body.len()), b'.');
    Bytes::from(body)
}

/// Run two channels over a faulty in-memory link and push messages through
pub fn run(config: &ChannelConfig, options: &SoakOptions) -> Result<SoakReport> {
    let (a_end, b_end) = duplex();
    let b_faults = match options.faults.seed {
        Some(seed) => options.faults.seed(seed.wrapping_add(1)),
        None => options.faults,
    };

    let sender = ReliableChannel::new(
        a_end.sink.with_faults(options.faults),
        a_end.source,
        config.clone().name(format!("{}-tx", config.name)),
    )?;
    let receiver = ReliableChannel::new(
        b_end.sink.with_faults(b_faults),
        b_end.source,
        config.clone().name(format!("{}-rx", config.name)),
    )?;
    sender.start()?;
    receiver.start()?;

    let started = Instant::now();
    if !sender.connect() {
        sender.stop()?;
        receiver.stop()?;
        bail!("Handshake did not complete within {:?}", config.connect_timeout);
    }
    info!("Connected, sending {} messages of {} bytes", options.messages, options.size);

    for n in 0..options.messages {
        if !sender.send(message(n, options.size)) {
            warn!("Sender dropped out of ESTABLISHED at message {}", n);
            break;
        }
    }

    let progress = if options.progress {
        ProgressBar::new(options.messages as u64)
    } else {
        ProgressBar::hidden()
    };
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );

    let mut delivered = 0;
    let mut duplicates = 0;
    let mut in_order = true;
    while delivered < options.messages {
        match receiver.receive_timeout(config.connect_timeout) {
            Some(got) if delivered > 0 && got == message(delivered - 1, options.size) => {
                duplicates += 1;
            }
            Some(got) => {
                if got != message(delivered, options.size) {
                    in_order = false;
                }
                delivered += 1;
                progress.inc(1);
            }
            None => {
                warn!("Gave up waiting after {} deliveries", delivered);
                break;
            }
        }
    }
    progress.finish_with_message("done");

    if !sender.disconnect() {
        warn!("Disconnect did not complete cleanly");
    }
    sender.stop()?;
    receiver.stop()?;

    Ok(SoakReport {
        sent: options.messages,
        delivered,
        duplicates,
        in_order,
        elapsed: started.elapsed(),
    })
}

pub fn execute(config: &ChannelConfig, options: &SoakOptions) -> Result<SoakReport> {
    info!(
        "Soak: loss={} byte_loss={} bit_flip={} seed={:?}",
        options.faults.loss, options.faults.byte_loss, options.faults.bit_flip, options.faults.seed
    );

    let report = run(config, options)?;
    let secs = report.elapsed.as_secs_f64().max(f64::EPSILON);

    println!("\n=== Soak Results ===");
    println!("Messages sent:      {}", report.sent);
    println!("Messages delivered: {}", report.delivered);
    println!("Duplicates:         {}", report.duplicates);
    println!("Elapsed:            {:.2}s", secs);
    println!("Throughput:         {:.1} msg/s", report.delivered as f64 / secs);

    println!("\n=== Summary ===");
    if report.is_perfect() {
        println!("{} Every message arrived in order", "✓".green());
    } else if report.is_complete() {
        println!(
            "{} Every message arrived in order, {} duplicated (XOR checksums do not cover the index)",
            "!".yellow(),
            report.duplicates
        );
    } else if !report.in_order {
        println!("{} Messages arrived out of order", "✗".red());
    } else {
        println!(
            "{} {} messages missing",
            "✗".red(),
            report.sent - report.delivered
        );
    }

    Ok(report)
}
