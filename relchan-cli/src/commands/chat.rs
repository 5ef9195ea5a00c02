use anyhow::{bail, Context, Result};
use bytes::Bytes;
use relchan_core::{ChannelConfig, ReliableChannel, State};
use std::io::{self, BufRead};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Where the TCP stream comes from
#[derive(Debug, Clone)]
pub enum Endpoint {
    Listen(String),
    Connect(String),
}

fn open(endpoint: &Endpoint) -> Result<TcpStream> {
    match endpoint {
        Endpoint::Listen(addr) => {
            let listener =
                TcpListener::bind(addr).with_context(|| format!("Failed to bind {}", addr))?;
            info!("Waiting for a peer on {}", addr);
            let (stream, peer) = listener.accept().context("Failed to accept peer")?;
            info!("Peer connected from {}", peer);
            Ok(stream)
        }
        Endpoint::Connect(addr) => {
            TcpStream::connect(addr).with_context(|| format!("Failed to connect to {}", addr))
        }
    }
}

/// Line-oriented chat over a TCP stream: stdin lines go out, messages from
/// the peer are printed as they arrive
pub fn execute(config: &ChannelConfig, endpoint: &Endpoint) -> Result<()> {
    let stream = open(endpoint)?;
    stream.set_nodelay(true)?;
    let sink = stream.try_clone().context("Failed to clone TCP stream")?;

    let channel = Arc::new(ReliableChannel::new(sink, stream, config.clone())?);
    channel.start()?;

    if matches!(endpoint, Endpoint::Connect(_)) && !channel.connect() {
        channel.stop()?;
        bail!("Handshake did not complete within {:?}", config.connect_timeout);
    }

    let printer = {
        let channel = channel.clone();
        thread::spawn(move || loop {
            match channel.receive_timeout(Duration::from_millis(200)) {
                Some(message) => println!("< {}", String::from_utf8_lossy(&message)),
                None if channel.state() == State::NotRunning => break,
                None => {}
            }
        })
    };

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if !channel.send(Bytes::from(line)) {
            warn!("Not connected ({}); line dropped", channel.state());
        }
    }

    if channel.state() == State::Established && !channel.disconnect() {
        warn!("Disconnect did not complete cleanly");
    }
    channel.stop()?;
    if printer.join().is_err() {
        warn!("Printer thread panicked");
    }

    Ok(())
}
