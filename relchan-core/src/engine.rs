//! The engine loop
//!
//! One dedicated thread owns the sink, the source, the connection state and
//! every sequence counter. Callers talk to it only through [`Shared`]: the
//! outbound and inbound queues, the command queue, and the status cell.
//!
//! Each iteration runs the queued commands, transmits the head of the
//! outbound queue if nothing is in flight, waits a bounded time for one
//! packet (resynchronizing on corruption), and feeds the packet or the
//! expiry of the retransmission timer into the state machine.

use crate::config::ChannelConfig;
use crate::decoder::read_packet;
use crate::encoder::encode_packet;
use crate::error::PacketError;
use crate::medium::{ByteSource, Interrupt};
use crate::queue::Queue;
use crate::reader::ByteReader;
use crate::scanner::resync;
use crate::state::{on_command, transition, Action, Command, Context, Event, State, Transition};
use crate::types::{Packet, PacketType};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::{debug, info, warn};

/// What callers can observe about the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Status {
    pub state: State,
    /// Highest command ticket the engine has finished
    pub completed: u64,
}

/// State shared between the engine thread and caller threads
pub(crate) struct Shared {
    pub outbound: Queue<Bytes>,
    pub inbound: Queue<Bytes>,
    commands: Queue<(u64, Command)>,
    next_ticket: Mutex<u64>,
    status: Mutex<Status>,
    status_changed: Condvar,
    interrupt: Option<Interrupt>,
}

impl Shared {
    pub fn new(interrupt: Option<Interrupt>) -> Self {
        Self {
            outbound: Queue::new(),
            inbound: Queue::new(),
            commands: Queue::new(),
            next_ticket: Mutex::new(0),
            status: Mutex::new(Status::default()),
            status_changed: Condvar::new(),
            interrupt,
        }
    }

    /// Queue a command for the engine and return its ticket
    pub fn submit(&self, command: Command) -> u64 {
        let ticket = {
            // Held across the push so tickets enter the queue in order
            let mut next = self.next_ticket.lock();
            *next += 1;
            self.commands.push((*next, command));
            *next
        };
        self.wake();
        ticket
    }

    /// Cut the engine's current read short, if the source allows it
    pub fn wake(&self) {
        if let Some(interrupt) = &self.interrupt {
            interrupt.fire();
        }
    }

    pub fn state(&self) -> State {
        self.status.lock().state
    }

    /// Block while `waiting` holds, for at most `timeout`
    pub fn wait_status(&self, timeout: Duration, mut waiting: impl FnMut(&Status) -> bool) -> Status {
        let mut status = self.status.lock();
        self.status_changed
            .wait_while_for(&mut status, |s| waiting(s), timeout);
        *status
    }

    pub fn publish_state(&self, state: State) {
        let mut status = self.status.lock();
        status.state = state;
        self.status_changed.notify_all();
    }

    fn complete(&self, ticket: u64) {
        let mut status = self.status.lock();
        status.completed = status.completed.max(ticket);
        self.status_changed.notify_all();
    }
}

/// The DAT waiting for an ACK, kept encoded so retransmissions are verbatim
struct InFlight {
    index: u32,
    encoded: Bytes,
}

/// What one read attempt produced
enum Input {
    Packet(Packet),
    /// The retransmission timer expired
    Silence,
    /// Woken early (interrupt, I/O hiccup, unfinished resync)
    Nothing,
}

pub(crate) struct Engine {
    config: ChannelConfig,
    sink: Box<dyn Write + Send>,
    reader: ByteReader<Box<dyn ByteSource>>,
    shared: Arc<Shared>,
    state: State,
    next_index: u32,
    last_rcvd: Option<u32>,
    in_flight: Option<InFlight>,
    retransmit_at: Instant,
}

impl Engine {
    pub fn new(
        config: ChannelConfig,
        sink: Box<dyn Write + Send>,
        source: Box<dyn ByteSource>,
        shared: Arc<Shared>,
    ) -> Self {
        let retransmit_at = Instant::now() + config.timeout;
        Self {
            config,
            sink,
            reader: ByteReader::new(source),
            shared,
            state: State::NotRunning,
            next_index: 0,
            last_rcvd: None,
            in_flight: None,
            retransmit_at,
        }
    }

    /// Run until a Close command is drained
    pub fn run(mut self) {
        #[cfg(feature = "logging")]
        info!(channel = %self.config.name, "engine started");

        self.set_state(State::Closed);
        self.restart_timer();

        loop {
            if self.run_commands() {
                break;
            }
            self.pump();

            match self.next_input() {
                Input::Packet(packet) => self.step(Event::Packet(&packet), Some(&packet)),
                Input::Silence => self.step(Event::Silence, None),
                Input::Nothing => {}
            }
        }

        self.in_flight = None;
        self.set_state(State::NotRunning);

        #[cfg(feature = "logging")]
        info!(channel = %self.config.name, "engine stopped");
    }

    fn context(&self) -> Context {
        Context {
            last_rcvd: self.last_rcvd,
            in_flight: self.in_flight.as_ref().map(|f| f.index),
            queued: self.shared.outbound.len(),
        }
    }

    /// Execute every queued command; returns true if one of them was Close
    fn run_commands(&mut self) -> bool {
        let mut shutdown = false;
        for (ticket, command) in self.shared.commands.drain() {
            if command == Command::Close {
                shutdown = true;
            } else {
                let t = on_command(self.state, command, &self.context());
                #[cfg(feature = "logging")]
                debug!(channel = %self.config.name, "{:?} in {}", command, self.state);
                self.apply(t, None);
                self.restart_timer();
            }
            self.shared.complete(ticket);
        }
        shutdown
    }

    /// Transmit the head of the outbound queue if nothing is in flight
    fn pump(&mut self) {
        if !self.state.pumps_data() || self.in_flight.is_some() {
            return;
        }
        let Some(payload) = self.shared.outbound.peek() else {
            return;
        };

        let index = self.take_index();
        let packet = Packet::new(PacketType::Dat, index, payload, &self.config.wire);
        match encode_packet(&packet, &self.config.wire) {
            Ok(encoded) => {
                self.transmit(&encoded, PacketType::Dat, index);
                self.in_flight = Some(InFlight { index, encoded });
                self.restart_timer();
            }
            Err(_err) => {
                // `send` checks sizes, so only a payload over the hard limit lands here
                #[cfg(feature = "logging")]
                warn!(channel = %self.config.name, "dropping unsendable message: {}", _err);
                self.shared.outbound.pop();
            }
        }
    }

    fn next_input(&mut self) -> Input {
        if self.state == State::SynRcvd {
            return Input::Silence;
        }

        let now = Instant::now();
        if now >= self.retransmit_at {
            self.restart_timer();
            return Input::Silence;
        }

        match self.reader.wait_readable(self.retransmit_at - now) {
            Ok(true) => self.decode(),
            Ok(false) => Input::Nothing,
            Err(_err) => {
                #[cfg(feature = "logging")]
                warn!(channel = %self.config.name, "source error: {}", _err);
                // Nothing to wait on; sit out the rest of the interval
                thread::sleep(self.retransmit_at.saturating_duration_since(Instant::now()));
                Input::Nothing
            }
        }
    }

    fn decode(&mut self) -> Input {
        let wire = self.config.wire;
        let deadline = Instant::now() + self.config.frame_timeout;

        match read_packet(&mut self.reader, &wire, deadline) {
            Ok(packet) => return Input::Packet(packet),
            Err(PacketError::Io(_err)) => {
                #[cfg(feature = "logging")]
                warn!(channel = %self.config.name, "source error: {}", _err);
                return Input::Nothing;
            }
            Err(_err) => {
                #[cfg(feature = "logging")]
                warn!(channel = %self.config.name, "corrupt input, resynchronizing: {}", _err);
            }
        }

        let deadline = Instant::now() + self.config.frame_timeout;
        match resync(&mut self.reader, &wire, deadline) {
            Ok(Some(packet)) => Input::Packet(packet),
            Ok(None) => Input::Nothing,
            Err(_err) => {
                #[cfg(feature = "logging")]
                warn!(channel = %self.config.name, "source error during resync: {}", _err);
                Input::Nothing
            }
        }
    }

    fn step(&mut self, event: Event<'_>, packet: Option<&Packet>) {
        #[cfg(feature = "logging")]
        if let Some(p) = packet {
            debug!(
                channel = %self.config.name,
                "received {} #{} ({} bytes) in {}",
                p.kind(),
                p.index(),
                p.payload.len(),
                self.state
            );
        }

        // A SYN opens a new session; the peer's DAT indices may restart
        if packet.is_some_and(|p| p.kind() == PacketType::Syn) {
            self.last_rcvd = None;
        }

        let t = transition(self.state, event, &self.context());
        self.apply(t, packet);
    }

    fn apply(&mut self, t: Transition, packet: Option<&Packet>) {
        #[cfg(feature = "logging")]
        if t.is_violation() {
            warn!(channel = %self.config.name, "protocol violation in {}", self.state);
        }

        match t.action {
            Action::Nothing => {}
            Action::Reply(kind) => {
                let index = self.take_index();
                self.send_control(kind, index);
            }
            Action::Accept { index } => {
                if let Some(packet) = packet {
                    self.shared.inbound.push(packet.payload.clone());
                }
                self.last_rcvd = Some(index);
                self.send_control(PacketType::Ack, index);
            }
            Action::Reack { index } => self.send_control(PacketType::Ack, index),
            Action::Advance => {
                self.shared.outbound.pop();
                self.in_flight = None;
            }
            Action::AdvanceThenFin => {
                self.shared.outbound.pop();
                self.in_flight = None;
                let index = self.take_index();
                self.send_control(PacketType::Fin, index);
            }
            Action::Retransmit => {
                if let Some(flight) = self.in_flight.take() {
                    self.transmit(&flight.encoded, PacketType::Dat, flight.index);
                    self.in_flight = Some(flight);
                }
            }
        }

        self.set_state(t.next);
        self.pump();
    }

    fn set_state(&mut self, next: State) {
        if next == self.state {
            return;
        }

        #[cfg(feature = "logging")]
        info!(channel = %self.config.name, "{} -> {}", self.state, next);

        self.state = next;
        if next == State::SynSent {
            self.last_rcvd = None;
        }
        if matches!(next, State::Closed | State::Broken) {
            // Queued messages wait for the next connection under fresh indices
            self.in_flight = None;
        }
        self.restart_timer();
        self.shared.publish_state(next);
    }

    fn take_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        index
    }

    fn restart_timer(&mut self) {
        self.retransmit_at = Instant::now() + self.config.timeout;
    }

    fn send_control(&mut self, kind: PacketType, index: u32) {
        let packet = Packet::control(kind, index, &self.config.wire);
        match encode_packet(&packet, &self.config.wire) {
            Ok(encoded) => self.transmit(&encoded, kind, index),
            Err(_err) => {
                #[cfg(feature = "logging")]
                warn!(channel = %self.config.name, "failed to encode {}: {}", kind, _err);
            }
        }
    }

    fn transmit(&mut self, encoded: &[u8], _kind: PacketType, _index: u32) {
        #[cfg(feature = "logging")]
        debug!(channel = %self.config.name, "sending {} #{} ({} bytes)", _kind, _index, encoded.len());

        if let Err(_err) = self.sink.write_all(encoded).and_then(|()| self.sink.flush()) {
            #[cfg(feature = "logging")]
            warn!(channel = %self.config.name, "sink write failed: {}", _err);
        }
    }
}
