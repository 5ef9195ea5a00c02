//! Two channels echoing messages over a simulated noisy link

use bytes::Bytes;
use relchan_core::{
    pipe::{duplex, Faults},
    ChannelConfig, ReliableChannel,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Relchan Loopback Echo Example\n");

    let faults = Faults::none().loss(0.1).byte_loss(0.001).seed(2024);
    let (left, right) = duplex();

    let config = ChannelConfig::new()
        .timeout(Duration::from_millis(100))
        .frame_timeout(Duration::from_millis(100));

    let client = ReliableChannel::new(
        left.sink.with_faults(faults),
        left.source,
        config.clone().name("client"),
    )?;
    let server = Arc::new(ReliableChannel::new(
        right.sink.with_faults(faults.seed(2025)),
        right.source,
        config.name("server"),
    )?);
    client.start()?;
    server.start()?;

    let echo = {
        let server = server.clone();
        thread::spawn(move || {
            for _ in 0..5 {
                let message = server.receive();
                let mut reply = b"echo: ".to_vec();
                reply.extend_from_slice(&message);
                server.send(reply);
            }
        })
    };

    if !client.connect() {
        return Err("connect timed out".into());
    }
    println!("Connected ({})", client.state());

    for i in 1..=5 {
        let message = format!("hello #{}", i);
        client.send(Bytes::from(message.clone()));
        match client.receive_timeout(Duration::from_secs(10)) {
            Some(reply) => println!("{} -> {}", message, String::from_utf8_lossy(&reply)),
            None => println!("{} -> (no reply)", message),
        }
    }

    echo.join().map_err(|_| "echo thread panicked")?;
    println!("\nDisconnected cleanly: {}", client.disconnect());

    client.stop()?;
    server.stop()?;
    Ok(())
}
