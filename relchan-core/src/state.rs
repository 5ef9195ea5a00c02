//! Connection state machine
//!
//! Pure functions from (state, input, context) to the next state plus at most
//! one outbound action. The engine owns the state and carries out actions;
//! nothing here touches queues or the medium.

use crate::types::{Packet, PacketType};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum State {
    /// Engine not started, or stopped
    #[default]
    NotRunning,
    /// Engine running, no connection
    Closed,
    /// SYN sent, waiting for SYNACK
    SynSent,
    /// SYN received, SYNACK goes out on the next tick
    SynRcvd,
    /// Connection open
    Established,
    /// STP sent, draining our outbound queue
    StpSent,
    /// Peer sent STP, still accepting its data
    StpRcvd,
    /// FIN sent, waiting for FINACK
    Closing,
    /// Protocol violation seen; waiting for the peer to reopen or close
    Broken,
}

impl State {
    /// Whether user data may be queued in this state
    pub fn accepts_data(self) -> bool {
        self == State::Established
    }

    /// Whether the engine transmits queued DATs in this state
    pub fn pumps_data(self) -> bool {
        matches!(self, State::Established | State::StpSent)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::NotRunning => "NOT_RUNNING",
            State::Closed => "CLOSED",
            State::SynSent => "SYN_SENT",
            State::SynRcvd => "SYN_RCVD",
            State::Established => "ESTABLISHED",
            State::StpSent => "STP_SENT",
            State::StpRcvd => "STP_RCVD",
            State::Closing => "CLOSING",
            State::Broken => "BROKEN",
        };
        f.write_str(name)
    }
}

/// Input from the medium
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// A validated packet
    Packet(&'a Packet),
    /// A full retransmission interval passed with no packet
    Silence,
}

/// User-initiated operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open a connection
    Connect,
    /// Tear the connection down, draining queued data first
    Disconnect,
    /// Stop the engine
    Close,
}

/// Sequence bookkeeping the transition functions read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    /// Index of the last delivered DAT
    pub last_rcvd: Option<u32>,
    /// Index of the DAT awaiting an ACK
    pub in_flight: Option<u32>,
    /// Messages in the outbound queue, including the one in flight
    pub queued: usize,
}

/// What the engine does after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing
    Nothing,
    /// Send a control packet of this type
    Reply(PacketType),
    /// Deliver the DAT's payload, then ACK `index`
    Accept {
        /// Index of the DAT
        index: u32,
    },
    /// ACK a DAT that was already delivered
    Reack {
        /// Index of the DAT
        index: u32,
    },
    /// The in-flight DAT was acknowledged; drop it and send the next
    Advance,
    /// The last queued DAT was acknowledged; drop it and send FIN
    AdvanceThenFin,
    /// Resend the in-flight DAT unchanged
    Retransmit,
}

/// Result of a transition function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State to move to
    pub next: State,
    /// Action to carry out
    pub action: Action,
}

impl Transition {
    fn to(next: State, action: Action) -> Self {
        Self { next, action }
    }

    fn stay(state: State) -> Self {
        Self::to(state, Action::Nothing)
    }

    fn reply(next: State, kind: PacketType) -> Self {
        Self::to(next, Action::Reply(kind))
    }

    /// Move to BROKEN and tell the peer with a FIN
    pub fn violation() -> Self {
        Self::reply(State::Broken, PacketType::Fin)
    }

    /// Whether this transition is a protocol violation
    pub fn is_violation(&self) -> bool {
        *self == Self::violation()
    }
}

/// Next state and action for an event from the medium
pub fn transition(state: State, event: Event<'_>, ctx: &Context) -> Transition {
    use PacketType::*;

    let packet = match event {
        Event::Silence => return on_silence(state, ctx),
        Event::Packet(packet) => packet,
    };
    let kind = packet.kind();
    let index = packet.index();

    match state {
        State::NotRunning => Transition::stay(state),

        State::Closed => match kind {
            Syn => Transition::stay(State::SynRcvd),
            Fin => Transition::reply(State::Closed, FinAck),
            _ => Transition::violation(),
        },

        State::SynSent => match kind {
            SynAck => Transition::stay(State::Established),
            Dat | Stp | Fin => Transition::reply(State::SynSent, Syn),
            Syn | Ack | FinAck => Transition::violation(),
        },

        // The engine skips reading in SYN_RCVD, so whatever arrives only
        // completes the handshake
        State::SynRcvd => Transition::reply(State::Established, SynAck),

        State::Established => match kind {
            Syn => Transition::reply(State::Established, SynAck),
            SynAck => Transition::stay(State::Established),
            Dat => Transition::to(State::Established, receive_dat(index, ctx)),
            Ack if ctx.in_flight == Some(index) => Transition::to(State::Established, Action::Advance),
            Ack => Transition::stay(State::Established),
            Stp => Transition::stay(State::StpRcvd),
            Fin => Transition::reply(State::Closed, FinAck),
            FinAck => Transition::violation(),
        },

        State::StpSent => match kind {
            Syn => Transition::reply(State::StpSent, SynAck),
            Dat => Transition::reply(State::StpSent, Stp),
            Ack => match ctx.in_flight {
                Some(expected) if expected == index => {
                    if ctx.queued > 1 {
                        Transition::to(State::StpSent, Action::Advance)
                    } else {
                        Transition::to(State::Closing, Action::AdvanceThenFin)
                    }
                }
                Some(_) => Transition::stay(State::StpSent),
                None => Transition::reply(State::Closing, Fin),
            },
            Stp => Transition::reply(State::Closing, Fin),
            Fin => Transition::reply(State::Closed, FinAck),
            SynAck | FinAck => Transition::violation(),
        },

        State::StpRcvd => match kind {
            Dat => Transition::to(State::StpRcvd, receive_dat(index, ctx)),
            Stp => Transition::stay(State::StpRcvd),
            Fin => Transition::reply(State::Closed, FinAck),
            Ack | Syn | SynAck | FinAck => Transition::violation(),
        },

        State::Closing => match kind {
            Dat | Stp | Ack => Transition::reply(State::Closing, Fin),
            Syn => Transition::reply(State::Closing, SynAck),
            Fin => Transition::reply(State::Closed, FinAck),
            FinAck => Transition::stay(State::Closed),
            SynAck => Transition::violation(),
        },

        State::Broken => match kind {
            Syn => Transition::reply(State::Established, SynAck),
            Fin => Transition::reply(State::Closed, FinAck),
            FinAck => Transition::stay(State::Closed),
            _ => Transition::reply(State::Broken, Fin),
        },
    }
}

fn receive_dat(index: u32, ctx: &Context) -> Action {
    if ctx.last_rcvd == Some(index) {
        Action::Reack { index }
    } else {
        Action::Accept { index }
    }
}

fn on_silence(state: State, ctx: &Context) -> Transition {
    match state {
        State::SynSent => Transition::reply(state, PacketType::Syn),
        State::SynRcvd => Transition::reply(State::Established, PacketType::SynAck),
        State::Established if ctx.in_flight.is_some() => Transition::to(state, Action::Retransmit),
        State::StpSent if ctx.in_flight.is_some() => Transition::to(state, Action::Retransmit),
        State::StpSent => Transition::reply(state, PacketType::Stp),
        State::Closing => Transition::reply(state, PacketType::Fin),
        State::NotRunning
        | State::Closed
        | State::Established
        | State::StpRcvd
        | State::Broken => Transition::stay(state),
    }
}

/// Next state and action for a user command
///
/// [`Command::Close`] never changes the connection state; the engine handles
/// it by shutting down.
pub fn on_command(state: State, command: Command, ctx: &Context) -> Transition {
    match command {
        Command::Connect => match state {
            State::Closed => Transition::reply(State::SynSent, PacketType::Syn),
            _ => Transition::stay(state),
        },
        Command::Disconnect => match state {
            State::Established if ctx.queued > 0 => Transition::reply(State::StpSent, PacketType::Stp),
            State::Established | State::StpRcvd => Transition::reply(State::Closing, PacketType::Fin),
            State::Closed => Transition::stay(state),
            _ => Transition::violation(),
        },
        Command::Close => Transition::stay(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WireFormat;

    fn packet(kind: PacketType, index: u32) -> Packet {
        Packet::control(kind, index, &WireFormat::default())
    }

    fn on_packet(state: State, kind: PacketType, index: u32, ctx: &Context) -> Transition {
        transition(state, Event::Packet(&packet(kind, index)), ctx)
    }

    #[test]
    fn test_handshake_passive_side() {
        let ctx = Context::default();
        let t = on_packet(State::Closed, PacketType::Syn, 0, &ctx);
        assert_eq!(t, Transition::stay(State::SynRcvd));

        let t = transition(State::SynRcvd, Event::Silence, &ctx);
        assert_eq!(t.next, State::Established);
        assert_eq!(t.action, Action::Reply(PacketType::SynAck));
    }

    #[test]
    fn test_handshake_active_side() {
        let ctx = Context::default();
        let t = on_command(State::Closed, Command::Connect, &ctx);
        assert_eq!(t, Transition::reply(State::SynSent, PacketType::Syn));

        assert_eq!(
            transition(State::SynSent, Event::Silence, &ctx),
            Transition::reply(State::SynSent, PacketType::Syn)
        );
        assert_eq!(
            on_packet(State::SynSent, PacketType::SynAck, 0, &ctx),
            Transition::stay(State::Established)
        );
        for kind in [PacketType::Dat, PacketType::Stp, PacketType::Fin] {
            assert_eq!(
                on_packet(State::SynSent, kind, 0, &ctx),
                Transition::reply(State::SynSent, PacketType::Syn)
            );
        }
        for kind in [PacketType::Syn, PacketType::Ack, PacketType::FinAck] {
            assert!(on_packet(State::SynSent, kind, 0, &ctx).is_violation());
        }
    }

    #[test]
    fn test_connect_only_from_closed() {
        let ctx = Context::default();
        for state in [State::Established, State::Broken, State::Closing, State::SynSent] {
            assert_eq!(on_command(state, Command::Connect, &ctx), Transition::stay(state));
        }
    }

    #[test]
    fn test_duplicate_dat_is_only_acked() {
        let ctx = Context {
            last_rcvd: Some(9),
            ..Default::default()
        };
        assert_eq!(
            on_packet(State::Established, PacketType::Dat, 9, &ctx).action,
            Action::Reack { index: 9 }
        );
        assert_eq!(
            on_packet(State::Established, PacketType::Dat, 10, &ctx).action,
            Action::Accept { index: 10 }
        );
        assert_eq!(
            on_packet(State::StpRcvd, PacketType::Dat, 9, &ctx),
            Transition::to(State::StpRcvd, Action::Reack { index: 9 })
        );
    }

    #[test]
    fn test_ack_must_match_in_flight() {
        let ctx = Context {
            in_flight: Some(4),
            queued: 2,
            ..Default::default()
        };
        assert_eq!(
            on_packet(State::Established, PacketType::Ack, 4, &ctx),
            Transition::to(State::Established, Action::Advance)
        );
        assert_eq!(
            on_packet(State::Established, PacketType::Ack, 3, &ctx),
            Transition::stay(State::Established)
        );
    }

    #[test]
    fn test_silence_retransmits_only_with_data_in_flight() {
        let idle = Context::default();
        let busy = Context {
            in_flight: Some(1),
            queued: 1,
            ..Default::default()
        };
        assert_eq!(
            transition(State::Established, Event::Silence, &idle),
            Transition::stay(State::Established)
        );
        assert_eq!(
            transition(State::Established, Event::Silence, &busy).action,
            Action::Retransmit
        );
        assert_eq!(
            transition(State::StpSent, Event::Silence, &busy).action,
            Action::Retransmit
        );
        assert_eq!(
            transition(State::StpSent, Event::Silence, &idle).action,
            Action::Reply(PacketType::Stp)
        );
        assert_eq!(
            transition(State::Closing, Event::Silence, &idle).action,
            Action::Reply(PacketType::Fin)
        );
    }

    #[test]
    fn test_stp_sent_drains_then_fins() {
        let more = Context {
            in_flight: Some(7),
            queued: 3,
            ..Default::default()
        };
        let last = Context {
            in_flight: Some(7),
            queued: 1,
            ..Default::default()
        };
        assert_eq!(
            on_packet(State::StpSent, PacketType::Ack, 7, &more),
            Transition::to(State::StpSent, Action::Advance)
        );
        assert_eq!(
            on_packet(State::StpSent, PacketType::Ack, 7, &last),
            Transition::to(State::Closing, Action::AdvanceThenFin)
        );
        assert_eq!(
            on_packet(State::StpSent, PacketType::Ack, 6, &last),
            Transition::stay(State::StpSent)
        );
        assert_eq!(
            on_packet(State::StpSent, PacketType::Ack, 6, &Context::default()),
            Transition::reply(State::Closing, PacketType::Fin)
        );
        assert_eq!(
            on_packet(State::StpSent, PacketType::Dat, 1, &last),
            Transition::reply(State::StpSent, PacketType::Stp)
        );
    }

    #[test]
    fn test_disconnect() {
        let empty = Context::default();
        let queued = Context {
            queued: 2,
            ..Default::default()
        };
        assert_eq!(
            on_command(State::Established, Command::Disconnect, &queued),
            Transition::reply(State::StpSent, PacketType::Stp)
        );
        assert_eq!(
            on_command(State::Established, Command::Disconnect, &empty),
            Transition::reply(State::Closing, PacketType::Fin)
        );
        assert_eq!(
            on_command(State::StpRcvd, Command::Disconnect, &empty),
            Transition::reply(State::Closing, PacketType::Fin)
        );
        assert_eq!(
            on_command(State::Closed, Command::Disconnect, &empty),
            Transition::stay(State::Closed)
        );
        assert!(on_command(State::SynSent, Command::Disconnect, &empty).is_violation());
    }

    #[test]
    fn test_closing_and_broken() {
        let ctx = Context::default();
        assert_eq!(
            on_packet(State::Closing, PacketType::FinAck, 0, &ctx),
            Transition::stay(State::Closed)
        );
        assert_eq!(
            on_packet(State::Closing, PacketType::Fin, 0, &ctx),
            Transition::reply(State::Closed, PacketType::FinAck)
        );
        assert_eq!(
            on_packet(State::Closing, PacketType::Ack, 0, &ctx),
            Transition::reply(State::Closing, PacketType::Fin)
        );
        assert!(on_packet(State::Closing, PacketType::SynAck, 0, &ctx).is_violation());

        assert_eq!(
            on_packet(State::Broken, PacketType::Syn, 0, &ctx),
            Transition::reply(State::Established, PacketType::SynAck)
        );
        assert_eq!(
            on_packet(State::Broken, PacketType::FinAck, 0, &ctx),
            Transition::stay(State::Closed)
        );
        assert_eq!(
            on_packet(State::Broken, PacketType::Dat, 0, &ctx),
            Transition::reply(State::Broken, PacketType::Fin)
        );
        assert_eq!(
            transition(State::Broken, Event::Silence, &ctx),
            Transition::stay(State::Broken)
        );
    }

    #[test]
    fn test_closed_rejects_unexpected_packets() {
        let ctx = Context::default();
        assert_eq!(
            on_packet(State::Closed, PacketType::Fin, 0, &ctx),
            Transition::reply(State::Closed, PacketType::FinAck)
        );
        for kind in [PacketType::Dat, PacketType::Ack, PacketType::SynAck] {
            assert!(on_packet(State::Closed, kind, 0, &ctx).is_violation());
        }
    }

    #[test]
    fn test_not_running_ignores_everything() {
        let ctx = Context::default();
        for kind in PacketType::ALL {
            assert_eq!(
                on_packet(State::NotRunning, kind, 0, &ctx),
                Transition::stay(State::NotRunning)
            );
        }
    }

    #[test]
    fn test_every_state_handles_every_input() {
        let ctx = Context {
            last_rcvd: Some(1),
            in_flight: Some(2),
            queued: 1,
        };
        let states = [
            State::Closed,
            State::SynSent,
            State::SynRcvd,
            State::Established,
            State::StpSent,
            State::StpRcvd,
            State::Closing,
            State::Broken,
        ];
        for state in states {
            for kind in PacketType::ALL {
                let t = on_packet(state, kind, 2, &ctx);
                assert_ne!(t.next, State::NotRunning, "{state} + {kind}");
            }
            let _ = transition(state, Event::Silence, &ctx);
        }
    }
}
