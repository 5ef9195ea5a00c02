//! In-memory byte pipes with optional fault injection
//!
//! A [`pipe`] has a [`PipeWriter`] (a `std::io::Write` sink) and a
//! [`PipeReader`] (a [`ByteSource`]). Readers block on a condition variable
//! until bytes arrive or their [`Interrupt`] fires, so no polling is involved.
//! [`duplex`] wires two pipes crosswise to model a full-duplex link.
//!
//! The writer side can damage traffic on its way through:
//!
//! | Fault          | Applies to | Effect                                   |
//! |----------------|------------|------------------------------------------|
//! | `loss`         | each write | the whole write disappears               |
//! | `byte_loss`    | each byte  | the byte disappears                      |
//! | `bit_flip`     | each byte  | one random bit of the byte is inverted   |
//! | filter hook    | each write | deliver, drop, or deliver twice          |

use crate::medium::{ByteSource, Interrupt};
use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

/// Fault model applied by a [`PipeWriter`]
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Faults {
    /// Probability that a whole write is dropped
    pub loss: f64,
    /// Probability that an individual byte is dropped
    pub byte_loss: f64,
    /// Probability that an individual byte has one bit flipped
    pub bit_flip: f64,
    /// RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Faults {
    /// No faults
    pub fn none() -> Self {
        Self::default()
    }

    /// Drop whole writes with probability `p`
    pub fn loss(mut self, p: f64) -> Self {
        self.loss = p.clamp(0.0, 1.0);
        self
    }

    /// Drop individual bytes with probability `p`
    pub fn byte_loss(mut self, p: f64) -> Self {
        self.byte_loss = p.clamp(0.0, 1.0);
        self
    }

    /// Flip one bit of individual bytes with probability `p`
    pub fn bit_flip(mut self, p: f64) -> Self {
        self.bit_flip = p.clamp(0.0, 1.0);
        self
    }

    /// Use a fixed RNG seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn is_clean(&self) -> bool {
        self.loss <= 0.0 && self.byte_loss <= 0.0 && self.bit_flip <= 0.0
    }
}

/// Verdict of a write filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Pass the write through
    Deliver,
    /// Silently discard the write
    Drop,
    /// Deliver the write twice in a row
    Duplicate,
}

type Filter = Box<dyn FnMut(&[u8]) -> Delivery + Send>;

struct PipeState {
    bytes: VecDeque<u8>,
    interrupts: u64,
}

struct Shared {
    state: Mutex<PipeState>,
    ready: Condvar,
}

impl Shared {
    fn push(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.bytes.extend(data.iter().copied());
        self.ready.notify_all();
    }

    fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupts = state.interrupts.wrapping_add(1);
        self.ready.notify_all();
    }
}

/// Create a one-way pipe
pub fn pipe() -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(PipeState {
            bytes: VecDeque::new(),
            interrupts: 0,
        }),
        ready: Condvar::new(),
    });
    let writer = PipeWriter {
        shared: shared.clone(),
        faults: Faults::none(),
        rng: StdRng::from_entropy(),
        filter: None,
    };
    let reader = PipeReader {
        shared,
        seen_interrupts: 0,
    };
    (writer, reader)
}

/// One end of a [`duplex`] link
pub struct Endpoint {
    /// Bytes written here reach the other endpoint's source
    pub sink: PipeWriter,
    /// Bytes written by the other endpoint arrive here
    pub source: PipeReader,
}

/// Create two endpoints wired crosswise: A's sink feeds B's source and vice versa
pub fn duplex() -> (Endpoint, Endpoint) {
    let (a_sink, b_source) = pipe();
    let (b_sink, a_source) = pipe();
    (
        Endpoint {
            sink: a_sink,
            source: a_source,
        },
        Endpoint {
            sink: b_sink,
            source: b_source,
        },
    )
}

/// Writing end of a pipe
pub struct PipeWriter {
    shared: Arc<Shared>,
    faults: Faults,
    rng: StdRng,
    filter: Option<Filter>,
}

impl PipeWriter {
    /// Apply a fault model to everything written from now on
    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.rng = match faults.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.faults = faults;
        self
    }

    /// Decide per write whether it is delivered, dropped or duplicated
    ///
    /// The filter sees each write before the fault model does. The channel
    /// engine writes one whole packet per call.
    pub fn with_filter(mut self, filter: impl FnMut(&[u8]) -> Delivery + Send + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    fn damage(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if self.faults.is_clean() {
            return Some(data.to_vec());
        }
        if chance(&mut self.rng, self.faults.loss) {
            return None;
        }

        let mut out = Vec::with_capacity(data.len());
        for &byte in data {
            if chance(&mut self.rng, self.faults.byte_loss) {
                continue;
            }
            if chance(&mut self.rng, self.faults.bit_flip) {
                out.push(byte ^ (1u8 << self.rng.gen_range(0..8)));
            } else {
                out.push(byte);
            }
        }
        Some(out)
    }

    fn deliver(&mut self, data: &[u8]) {
        if let Some(damaged) = self.damage(data) {
            self.shared.push(&damaged);
        }
    }
}

fn chance(rng: &mut StdRng, p: f64) -> bool {
    p > 0.0 && rng.gen::<f64>() < p
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let verdict = match self.filter.as_mut() {
            Some(filter) => filter(buf),
            None => Delivery::Deliver,
        };
        match verdict {
            Delivery::Deliver => self.deliver(buf),
            Delivery::Drop => {}
            Delivery::Duplicate => {
                self.deliver(buf);
                self.deliver(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reading end of a pipe
pub struct PipeReader {
    shared: Arc<Shared>,
    seen_interrupts: u64,
}

impl PipeReader {
    /// Bytes currently waiting in the pipe
    pub fn available(&self) -> usize {
        self.shared.state.lock().bytes.len()
    }
}

impl ByteSource for PipeReader {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let mut state = self.shared.state.lock();
        let seen = self.seen_interrupts;
        if state.bytes.is_empty() && state.interrupts == seen && !timeout.is_zero() {
            self.shared.ready.wait_while_for(
                &mut state,
                |s| s.bytes.is_empty() && s.interrupts == seen,
                timeout,
            );
        }
        self.seen_interrupts = state.interrupts;

        let n = buf.len().min(state.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(state.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn interrupt_handle(&self) -> Option<Interrupt> {
        let shared = self.shared.clone();
        Some(Interrupt::new(move || shared.interrupt()))
    }
}
