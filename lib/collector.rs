// Collector: receive -> strip -> fanout -> count, until shutdown
use slogd_core::{message_text, strip, FrequencyTable, MalformedMessage, Recorded, Report};
use slogd_fanout::{Fanout, FanoutError};
use slogd_transport::{DatagramSource, Received, ShutdownToken};
use std::io::{self, Write};
use tracing::{debug, warn};

/// Why the receive loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown token cancelled (SIGINT).
    Cancelled,
    /// The source reported it has nothing more to deliver.
    SourceClosed,
    /// The source failed to receive; treated like end of stream.
    ReceiveFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Malformed(#[from] MalformedMessage),
    #[error(transparent)]
    Fanout(#[from] FanoutError),
    #[error("failed to echo received message: {0}")]
    Echo(#[source] io::Error),
    #[error("failed to release the listening socket: {0}")]
    Close(#[source] io::Error),
}

/// Raw line plus newline, bytes untouched.
fn echo_line<O: Write>(out: &mut O, line: &[u8]) -> io::Result<()> {
    out.write_all(line)?;
    out.write_all(b"\n")?;
    out.flush()
}

pub struct Collector<S: DatagramSource, W: Write> {
    source: S,
    fanout: Fanout<W>,
    table: FrequencyTable,
    echo_raw: bool,
    accepted: u64,
}

impl<S: DatagramSource, W: Write> Collector<S, W> {
    pub fn new(source: S, fanout: Fanout<W>, table: FrequencyTable) -> Self {
        Collector {
            source,
            fanout,
            table,
            echo_raw: false,
            accepted: 0,
        }
    }

    /// Print every received line on stdout before it is parsed.
    pub fn echo_raw(mut self, on: bool) -> Self {
        self.echo_raw = on;
        self
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn table(&self) -> &FrequencyTable {
        &self.table
    }

    /// Serve datagrams until the token is cancelled or the source stops.
    ///
    /// The token is checked after every receive; a message that was already
    /// received is always fully processed. A malformed message or a sink
    /// failure ends the loop with an error.
    pub fn run(&mut self, shutdown: &ShutdownToken) -> Result<StopReason, CollectorError> {
        loop {
            match self.source.receive(shutdown) {
                Ok(Received::Datagram(raw)) => self.accept(&raw)?,
                Ok(Received::Interrupted) => return Ok(StopReason::Cancelled),
                Ok(Received::Closed) => return Ok(StopReason::SourceClosed),
                Err(e) => {
                    warn!("receive failed, stopping: {}", e);
                    return Ok(StopReason::ReceiveFailed);
                }
            }
            if shutdown.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
        }
    }

    /// Process one raw datagram.
    pub fn accept(&mut self, raw: &[u8]) -> Result<(), CollectorError> {
        let line = message_text(raw);
        if self.echo_raw {
            echo_line(&mut io::stdout().lock(), line).map_err(CollectorError::Echo)?;
        }

        let payload = strip(line)?;
        self.fanout.write(payload)?;

        match self.table.record(payload) {
            Recorded::Merged { index } => debug!(index, "bucket already names another message, counts merged"),
            recorded => debug!(index = recorded.index(), "message recorded"),
        }
        self.accepted += 1;
        Ok(())
    }

    pub fn report(&self) -> Report {
        self.table.report()
    }

    /// Close the sinks in order, then release the source.
    pub fn close(self) -> Result<(), CollectorError> {
        let Collector {
            mut source, fanout, ..
        } = self;
        fanout.close()?;
        source.close().map_err(CollectorError::Close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slogd_core::CollisionPolicy;
    use std::collections::VecDeque;
    use std::io::ErrorKind;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SCENARIO_A: &[u8] = b"<13>May 14 01:42:39 filip: SPRAVA";

    /// Replays a fixed script, then reports the source closed.
    struct Scripted {
        script: VecDeque<io::Result<Received>>,
        cancel_on_receive: Option<ShutdownToken>,
        closes: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(script: Vec<io::Result<Received>>) -> Self {
            Scripted {
                script: script.into(),
                cancel_on_receive: None,
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl DatagramSource for Scripted {
        fn receive(&mut self, _shutdown: &ShutdownToken) -> io::Result<Received> {
            if let Some(token) = &self.cancel_on_receive {
                token.cancel();
            }
            self.script.pop_front().unwrap_or(Ok(Received::Closed))
        }

        fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn datagram(bytes: &[u8]) -> io::Result<Received> {
        Ok(Received::Datagram(bytes.to_vec()))
    }

    fn table(capacity: usize, policy: CollisionPolicy) -> FrequencyTable {
        FrequencyTable::new(NonZeroUsize::new(capacity).unwrap(), policy)
    }

    #[test]
    fn identical_messages_reach_every_sink_and_the_report() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        let token = ShutdownToken::new().unwrap();

        let source = Scripted::new((0..5).map(|_| datagram(SCENARIO_A)).collect());
        let closes = source.closes.clone();
        let mut fanout = Fanout::new();
        fanout.push("first", &mut first);
        fanout.push("second", &mut second);

        let mut collector = Collector::new(source, fanout, table(999, CollisionPolicy::Faithful));
        assert_eq!(collector.run(&token).unwrap(), StopReason::SourceClosed);
        assert_eq!(collector.accepted(), 5);
        assert_eq!(collector.report().to_string(), "5 --> filip: SPRAVA");
        collector.close().unwrap();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        let expected = "filip: SPRAVA\n".repeat(5);
        assert_eq!(String::from_utf8(first).unwrap(), expected);
        assert_eq!(String::from_utf8(second).unwrap(), expected);
    }

    #[test]
    fn malformed_message_is_fatal_and_not_written() {
        let mut sink = Vec::new();
        let token = ShutdownToken::new().unwrap();
        let source = Scripted::new(vec![
            datagram(SCENARIO_A),
            datagram(b"malformed"),
            datagram(SCENARIO_A),
        ]);
        let mut fanout = Fanout::new();
        fanout.push("sink", &mut sink);

        let mut collector = Collector::new(source, fanout, table(999, CollisionPolicy::Faithful));
        match collector.run(&token) {
            Err(CollectorError::Malformed(e)) => assert_eq!(e.line, "malformed"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(collector.accepted(), 1);
        drop(collector);
        assert_eq!(sink, b"filip: SPRAVA\n");
    }

    #[test]
    fn interrupted_receive_stops_the_loop() {
        let token = ShutdownToken::new().unwrap();
        let source = Scripted::new(vec![
            datagram(SCENARIO_A),
            Ok(Received::Interrupted),
            datagram(SCENARIO_A),
        ]);
        let mut collector: Collector<_, Vec<u8>> =
            Collector::new(source, Fanout::new(), table(999, CollisionPolicy::Faithful));
        assert_eq!(collector.run(&token).unwrap(), StopReason::Cancelled);
        assert_eq!(collector.accepted(), 1);
    }

    #[test]
    fn message_received_before_cancel_is_still_processed() {
        let mut sink = Vec::new();
        let token = ShutdownToken::new().unwrap();
        let mut source = Scripted::new(vec![datagram(SCENARIO_A), datagram(SCENARIO_A)]);
        source.cancel_on_receive = Some(token.clone());
        let mut fanout = Fanout::new();
        fanout.push("sink", &mut sink);

        let mut collector = Collector::new(source, fanout, table(999, CollisionPolicy::Faithful));
        assert_eq!(collector.run(&token).unwrap(), StopReason::Cancelled);
        assert_eq!(collector.accepted(), 1);
        assert_eq!(collector.report().to_string(), "1 --> filip: SPRAVA");
        collector.close().unwrap();
        assert_eq!(sink, b"filip: SPRAVA\n");
    }

    #[test]
    fn receive_error_ends_loop_normally() {
        let token = ShutdownToken::new().unwrap();
        let source = Scripted::new(vec![
            datagram(SCENARIO_A),
            Err(io::Error::new(ErrorKind::Other, "socket gone")),
        ]);
        let mut collector: Collector<_, Vec<u8>> =
            Collector::new(source, Fanout::new(), table(999, CollisionPolicy::Faithful));
        assert_eq!(collector.run(&token).unwrap(), StopReason::ReceiveFailed);
        assert_eq!(collector.report().to_string(), "1 --> filip: SPRAVA");
    }

    #[test]
    fn no_messages_report() {
        let token = ShutdownToken::new().unwrap();
        token.cancel();
        let source = Scripted::new(vec![Ok(Received::Interrupted)]);
        let mut collector: Collector<_, Vec<u8>> =
            Collector::new(source, Fanout::new(), table(999, CollisionPolicy::Faithful));
        assert_eq!(collector.run(&token).unwrap(), StopReason::Cancelled);
        assert_eq!(collector.report(), Report::NoMessages);
        assert_eq!(collector.report().to_string(), "No messages");
    }

    #[test]
    fn nul_byte_ends_the_message() {
        let mut sink = Vec::new();
        let token = ShutdownToken::new().unwrap();
        let source = Scripted::new(vec![datagram(b"<13>May 14 01:42:39 host: msg\0tail")]);
        let mut fanout = Fanout::new();
        fanout.push("sink", &mut sink);

        let mut collector = Collector::new(source, fanout, table(999, CollisionPolicy::Faithful));
        collector.run(&token).unwrap();
        assert_eq!(collector.report().to_string(), "1 --> host: msg");
        drop(collector);
        assert_eq!(sink, b"host: msg\n");
    }

    #[test]
    fn long_payload_is_cut_the_same_for_sinks_and_table() {
        let mut sink = Vec::new();
        let token = ShutdownToken::new().unwrap();
        let mut raw = b"<13>May 14 01:42:39 ".to_vec();
        raw.extend(std::iter::repeat(b'z').take(380));
        let source = Scripted::new(vec![datagram(&raw), datagram(&raw)]);
        let mut fanout = Fanout::new();
        fanout.push("sink", &mut sink);

        let mut collector = Collector::new(source, fanout, table(999, CollisionPolicy::Faithful));
        collector.run(&token).unwrap();
        let best = collector.table().most_common().unwrap();
        assert_eq!(best.count, 2);
        assert_eq!(best.message.len(), 380);
        drop(collector);
        assert_eq!(sink.len(), 2 * 381);
    }

    #[test]
    fn echo_writes_line_bytes_verbatim() {
        let mut out = Vec::new();
        echo_line(&mut out, b"<13>May 14 01:42:39 h: caf\xe9").unwrap();
        assert_eq!(out, b"<13>May 14 01:42:39 h: caf\xe9\n");
    }

    #[test]
    fn colliding_messages_merge_under_first_arrival() {
        let token = ShutdownToken::new().unwrap();
        let source = Scripted::new(vec![
            datagram(b"<13>May 14 01:42:39 a: rare"),
            datagram(b"<13>May 14 01:42:39 b: common"),
            datagram(b"<13>May 14 01:42:39 b: common"),
        ]);
        let mut collector: Collector<_, Vec<u8>> =
            Collector::new(source, Fanout::new(), table(1, CollisionPolicy::Faithful));
        collector.run(&token).unwrap();
        assert_eq!(collector.report().to_string(), "3 --> a: rare");

        let source = Scripted::new(vec![
            datagram(b"<13>May 14 01:42:39 a: rare"),
            datagram(b"<13>May 14 01:42:39 b: common"),
            datagram(b"<13>May 14 01:42:39 b: common"),
        ]);
        let mut collector: Collector<_, Vec<u8>> =
            Collector::new(source, Fanout::new(), table(2, CollisionPolicy::Separate));
        collector.run(&token).unwrap();
        assert_eq!(collector.report().to_string(), "2 --> b: common");
    }
}
