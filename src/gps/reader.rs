// src/gps/reader.rs
//! Per-port read loop

use super::{
    nmea::{self, FixFragment},
    port::{NmeaPort, PortRead},
};
use std::{sync::Arc, time::Duration};
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};

/// Default pause between reads.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(80);

/// Anything that can absorb decoded fragments.
pub trait FragmentSink: Send + Sync {
    fn update(&self, fragment: &FixFragment);
}

/// Reads one port until shut down, forwarding every decoded fragment.
///
/// Never closes the port. Fragments from one port reach the sink in the
/// order they were read.
pub struct PortReader {
    port: Arc<NmeaPort>,
    sink: Arc<dyn FragmentSink>,
    shutdown: CancellationToken,
    idle_delay: Duration,
}

#[derive(Debug, Default)]
struct ReadStats {
    lines: u64,
    fragments: u64,
    discarded: u64,
    errors: u64,
}

impl PortReader {
    pub fn new(port: Arc<NmeaPort>, sink: Arc<dyn FragmentSink>, shutdown: CancellationToken) -> Self {
        Self {
            port,
            sink,
            shutdown,
            idle_delay: DEFAULT_IDLE_DELAY,
        }
    }

    pub fn with_idle_delay(mut self, idle_delay: Duration) -> Self {
        self.idle_delay = idle_delay;
        self
    }

    /// Spawn the loop on `handle`, inside the caller's current span
    pub fn spawn(self, handle: &Handle) -> JoinHandle<()> {
        handle.spawn(self.run().instrument(tracing::Span::current()))
    }

    pub async fn run(self) {
        let port_name = self.port.name().to_string();
        let mut stats = ReadStats::default();
        info!(port = %port_name, "GPS reader started");

        while !self.shutdown.is_cancelled() {
            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                read = self.port.read_line() => read,
            };

            match read {
                Ok(PortRead::Line(line)) => {
                    stats.lines += 1;
                    trace!(port = %port_name, "NMEA: {}", line);
                    match nmea::decode(&line) {
                        Some(fragment) => {
                            stats.fragments += 1;
                            self.sink.update(&fragment);
                        }
                        None => {
                            stats.discarded += 1;
                            debug!(port = %port_name, sentence = %line, "Discarded sentence");
                        }
                    }
                }
                Ok(PortRead::Idle) => {}
                Ok(PortRead::Closed) => {
                    info!(port = %port_name, "Port closed, reader exiting");
                    break;
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!(port = %port_name, error = %e, "Error reading from port");
                }
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.idle_delay) => {}
            }
        }

        info!(
            port = %port_name,
            lines = stats.lines,
            fragments = stats.fragments,
            discarded = stats.discarded,
            errors = stats.errors,
            "GPS reader stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        pin::Pin,
        sync::Mutex,
        task::{Context, Poll},
    };
    use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};

    #[derive(Default)]
    struct Collect(Mutex<Vec<FixFragment>>);

    impl FragmentSink for Collect {
        fn update(&self, fragment: &FixFragment) {
            self.0.lock().unwrap().push(fragment.clone());
        }
    }

    /// Fails the first read, then serves `data` and stays open
    struct FlakyStream {
        failed: bool,
        data: &'static [u8],
    }

    impl AsyncRead for FlakyStream {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            if !self.failed {
                self.failed = true;
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "framing error")));
            }
            let data = self.data;
            if data.is_empty() {
                return Poll::Pending;
            }
            let n = data.len().min(buf.remaining());
            buf.put_slice(&data[..n]);
            self.data = &data[n..];
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_error_is_logged_and_reading_continues() {
        let stream = FlakyStream {
            failed: false,
            data: b"$HCHDG,359.6,0.0,E,2.2,W*59\r\n",
        };
        let sink = Arc::new(Collect::default());
        let shutdown = CancellationToken::new();
        let handle = PortReader::new(Arc::new(NmeaPort::new("flaky", stream)), sink.clone(), shutdown.clone())
            .with_idle_delay(Duration::from_millis(1))
            .spawn(&Handle::current());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*sink.0.lock().unwrap(), vec![FixFragment::Hdg { heading: 359.6 }]);
        assert!(!handle.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reader should stop after a read error")
            .unwrap();
    }

    #[tokio::test]
    async fn test_forwards_valid_fragments_in_order() {
        let data: &'static [u8] = b"$HCHDG,359.6,0.0,E,2.2,W*59\r\n\
            $GPGLL,4916.45,N,12311.12,W,225444,A,A*5C\r\n\
            not nmea at all\r\n\
            $GPVTG,232.7,T,234.9,M,1.3,N,2.4,K,A*2F\r\n";
        let sink = Arc::new(Collect::default());
        let reader = PortReader::new(
            Arc::new(NmeaPort::new("mem", data)),
            sink.clone(),
            CancellationToken::new(),
        )
        .with_idle_delay(Duration::from_millis(1));

        // Ends on its own at end of stream
        tokio::time::timeout(Duration::from_secs(2), reader.run())
            .await
            .expect("reader should exit when the port closes");

        let got = sink.0.lock().unwrap().clone();
        assert_eq!(
            got,
            vec![
                FixFragment::Hdg { heading: 359.6 },
                FixFragment::Vtg { heading: 232.7, speed: 1.3 },
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocked_read() {
        let (_tx, rx) = tokio::io::duplex(64);
        let shutdown = CancellationToken::new();
        let reader = PortReader::new(
            Arc::new(NmeaPort::new("silent", rx)),
            Arc::new(Collect::default()),
            shutdown.clone(),
        );

        let handle = reader.spawn(&Handle::current());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reader should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_keeps_reading_live_stream() {
        let (mut tx, rx) = tokio::io::duplex(256);
        let sink = Arc::new(Collect::default());
        let shutdown = CancellationToken::new();
        let handle = PortReader::new(Arc::new(NmeaPort::new("live", rx)), sink.clone(), shutdown.clone())
            .with_idle_delay(Duration::from_millis(1))
            .spawn(&Handle::current());

        tx.write_all(b"$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.write_all(b"$HCHDG,045.0,0.0,E,2.2,W*51\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![FixFragment::Gsa { fix_quality: 3 }, FixFragment::Hdg { heading: 45.0 }]
        );
    }
}
