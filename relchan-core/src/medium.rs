//! Byte media the channel runs over
//!
//! The engine writes encoded packets to any [`std::io::Write`] sink and pulls
//! bytes from a [`ByteSource`]. A source may hand out an [`Interrupt`] so the
//! channel can cut a blocked read short when a caller queues new work;
//! sources without one are simply polled at the retransmission interval.

use std::fmt;
use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

/// A byte input with bounded-wait reads
pub trait ByteSource: Send {
    /// Read whatever is available into `buf`, waiting at most `timeout` for
    /// the first byte
    ///
    /// `Ok(0)` means nothing arrived: either the wait elapsed or the read was
    /// interrupted.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Handle that wakes a blocked [`ByteSource::read_timeout`] early
    fn interrupt_handle(&self) -> Option<Interrupt> {
        None
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read_timeout(buf, timeout)
    }

    fn interrupt_handle(&self) -> Option<Interrupt> {
        (**self).interrupt_handle()
    }
}

/// Wakes a reader blocked in [`ByteSource::read_timeout`]
#[derive(Clone)]
pub struct Interrupt(Arc<dyn Fn() + Send + Sync>);

impl Interrupt {
    /// Wrap a wake-up callback
    pub fn new(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(wake))
    }

    /// Wake the reader
    pub fn fire(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Interrupt")
    }
}

/// Socket reads cannot be woken early, so there is no [`Interrupt`]: work
/// queued while the engine waits here is picked up once the read times out,
/// at most one retransmission interval later.
impl ByteSource for TcpStream {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if timeout.is_zero() {
            return Ok(0);
        }
        self.set_read_timeout(Some(timeout))?;
        match io::Read::read(self, buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the stream",
            )),
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_interrupt_fires_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let interrupt = Interrupt::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        interrupt.clone().fire();
        interrupt.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_tcp_source_times_out_then_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let mut buf = [0u8; 16];
        let started = Instant::now();
        assert_eq!(
            ByteSource::read_timeout(&mut server, &mut buf, Duration::from_millis(50)).unwrap(),
            0
        );
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(server.interrupt_handle().is_none());

        client.write_all(b"ping").unwrap();
        let n = ByteSource::read_timeout(&mut server, &mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(&buf[..n], b"ping");

        drop(client);
        let err = ByteSource::read_timeout(&mut server, &mut buf, Duration::from_secs(2)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
