//! Thread-safe public API
//!
//! A [`ReliableChannel`] may be shared between any number of threads (wrap
//! it in an `Arc`). Every method only enqueues work for the engine thread or
//! reads its published status; none of them touch the medium directly.
//!
//! ```no_run
//! use relchan_core::{pipe::duplex, ChannelConfig, ReliableChannel};
//!
//! let (a_end, b_end) = duplex();
//! let a = ReliableChannel::new(a_end.sink, a_end.source, ChannelConfig::new().name("a"))?;
//! let b = ReliableChannel::new(b_end.sink, b_end.source, ChannelConfig::new().name("b"))?;
//! a.start()?;
//! b.start()?;
//!
//! assert!(a.connect());
//! assert!(a.send(&b"hello"[..]));
//! assert_eq!(b.receive().as_ref(), b"hello");
//! assert!(a.disconnect());
//! # Ok::<(), relchan_core::ChannelError>(())
//! ```

use crate::config::ChannelConfig;
use crate::engine::{Engine, Shared};
use crate::error::ChannelError;
use crate::medium::ByteSource;
use crate::state::{Command, State};
use bytes::Bytes;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(feature = "logging")]
use tracing::warn;

/// Reliable, message-oriented channel over a noisy byte medium
pub struct ReliableChannel {
    config: ChannelConfig,
    shared: Arc<Shared>,
    engine: Mutex<Option<Engine>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReliableChannel {
    /// Build a channel over `sink` and `source`
    ///
    /// The engine is not started yet; the state is [`State::NotRunning`]
    /// until [`ReliableChannel::start`].
    pub fn new<W, S>(sink: W, source: S, config: ChannelConfig) -> Result<Self, ChannelError>
    where
        W: Write + Send + 'static,
        S: ByteSource + 'static,
    {
        config.validate()?;

        let shared = Arc::new(Shared::new(source.interrupt_handle()));
        let engine = Engine::new(config.clone(), Box::new(sink), Box::new(source), shared.clone());

        Ok(Self {
            config,
            shared,
            engine: Mutex::new(Some(engine)),
            handle: Mutex::new(None),
        })
    }

    /// Spawn the engine thread
    pub fn start(&self) -> Result<(), ChannelError> {
        let engine = self.engine.lock().take().ok_or(ChannelError::AlreadyStarted)?;

        self.shared.publish_state(State::Closed);
        let spawned = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || engine.run());

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.publish_state(State::NotRunning);
                Err(ChannelError::Spawn(e.to_string()))
            }
        }
    }

    /// Close the channel and wait for the engine thread to exit
    pub fn stop(&self) -> Result<(), ChannelError> {
        self.close();
        match self.handle.lock().take() {
            Some(handle) => handle.join().map_err(|_| ChannelError::EnginePanicked),
            None => Ok(()),
        }
    }

    /// Open a connection to the peer
    ///
    /// Blocks for at most `connect_timeout`. Returns true iff the channel is
    /// ESTABLISHED afterwards; calling it on an open connection is a no-op
    /// that returns true.
    pub fn connect(&self) -> bool {
        let ticket = self.shared.submit(Command::Connect);
        let status = self.shared.wait_status(self.config.connect_timeout, |s| {
            s.state != State::NotRunning
                && (s.completed < ticket || matches!(s.state, State::SynSent | State::SynRcvd))
        });
        status.state == State::Established
    }

    /// Tear the connection down
    ///
    /// Queued messages are delivered first (STP, then FIN once the queue is
    /// drained). Blocks for at most `connect_timeout`; returns true iff the
    /// channel is CLOSED afterwards.
    pub fn disconnect(&self) -> bool {
        let ticket = self.shared.submit(Command::Disconnect);
        let status = self.shared.wait_status(self.config.connect_timeout, |s| {
            s.state != State::NotRunning
                && (s.completed < ticket || matches!(s.state, State::StpSent | State::Closing))
        });
        status.state == State::Closed
    }

    /// Queue a message for delivery
    ///
    /// Returns false unless the connection is ESTABLISHED and the message
    /// fits the configured payload limit.
    pub fn send(&self, message: impl Into<Bytes>) -> bool {
        let message = message.into();
        if message.len() > self.config.wire.max_payload_len as usize {
            #[cfg(feature = "logging")]
            warn!(channel = %self.config.name, "refusing {}-byte message over the payload limit", message.len());
            return false;
        }
        if !self.shared.state().accepts_data() {
            return false;
        }

        self.shared.outbound.push(message);
        self.shared.wake();
        true
    }

    /// Take the oldest delivered message, waiting as long as it takes
    pub fn receive(&self) -> Bytes {
        self.shared.inbound.pop_blocking()
    }

    /// Take the oldest delivered message if there is one
    pub fn try_receive(&self) -> Option<Bytes> {
        self.shared.inbound.pop()
    }

    /// Take the oldest delivered message, waiting at most `timeout`
    pub fn receive_timeout(&self, timeout: Duration) -> Option<Bytes> {
        self.shared.inbound.pop_timeout(timeout)
    }

    /// Ask the engine to shut down
    ///
    /// Returns immediately; the engine exits after finishing its current
    /// iteration and the state becomes [`State::NotRunning`].
    pub fn close(&self) {
        self.shared.submit(Command::Close);
    }

    /// False once a protocol violation has left the channel BROKEN
    pub fn is_valid(&self) -> bool {
        self.state() != State::Broken
    }

    /// Current connection state
    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// Messages queued for sending, including the one in flight
    pub fn pending_outbound(&self) -> usize {
        self.shared.outbound.len()
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Channel configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl Drop for ReliableChannel {
    fn drop(&mut self) {
        if self.handle.get_mut().is_some() {
            self.close();
        }
    }
}
