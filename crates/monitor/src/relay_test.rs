//! Tests for the buffered relay

use super::*;
use crate::diagnostics::{DiagnosticOutput, DiagnosticWriter};
use crate::sink::SinkRegistry;
use std::io::{self, Write};

/// Writer whose contents stay readable after being handed to the relay
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().clone())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Relay whose drop warnings land in the returned buffer
fn make_relay(capacity: usize) -> (BufferedRelay, SharedBuf) {
    let warnings = SharedBuf::default();
    let options = LoggerOptions::new()
        .with_diagnostics(DiagnosticOutput::Writer(DiagnosticWriter::new(warnings.clone())));
    let relay = BufferedRelay::new(capacity, Arc::new(SinkRegistry::new()), options).unwrap();
    (relay, warnings)
}

fn drain(relay: &mut BufferedRelay) -> Vec<LogFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = relay.frames.try_recv() {
        frames.push(frame);
    }
    frames
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_zero_capacity_rejected() {
    let result = BufferedRelay::new(0, Arc::new(SinkRegistry::new()), LoggerOptions::new());
    assert!(matches!(
        result,
        Err(MonitorError::InvalidCapacity { capacity: 0 })
    ));
}

#[test]
fn test_new_relay_is_empty() {
    let (relay, _warnings) = make_relay(4);
    assert_eq!(relay.capacity(), 4);
    assert_eq!(
        relay.stats(),
        RelayStats {
            accepted: 0,
            dropped: 0,
            pending_drops: 0,
            queued: 0,
        }
    );
}

#[test]
fn test_writer_carries_logger_options() {
    let options = LoggerOptions::new()
        .with_level(Level::DEBUG)
        .with_format(LogFormat::Json);
    let relay = BufferedRelay::new(1, Arc::new(SinkRegistry::new()), options).unwrap();

    let writer = relay.writer();
    assert_eq!(SinkHandler::level(&*writer), Level::DEBUG);
    assert_eq!(SinkHandler::format(&*writer), LogFormat::Json);
}

// ============================================================================
// Admission policy
// ============================================================================

#[test]
fn test_full_queue_drops_newest() {
    let (mut relay, warnings) = make_relay(2);

    for frame in ["A", "B", "C", "D"] {
        relay.accept(LogFrame::from_static(frame));
    }

    let stats = relay.stats();
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.pending_drops, 2);
    assert_eq!(stats.queued, 2);
    assert!(warnings.lines().is_empty());

    assert_eq!(
        drain(&mut relay),
        vec![LogFrame::from_static("A"), LogFrame::from_static("B")]
    );
}

#[test]
fn test_draining_makes_room_again() {
    let (mut relay, _warnings) = make_relay(1);

    relay.accept(LogFrame::from_static("first"));
    relay.accept(LogFrame::from_static("dropped"));
    assert_eq!(drain(&mut relay), vec![LogFrame::from_static("first")]);

    relay.accept(LogFrame::from_static("second"));
    assert_eq!(drain(&mut relay), vec![LogFrame::from_static("second")]);
    assert_eq!(relay.stats().dropped, 1);
}

#[test]
fn test_no_warning_at_threshold() {
    let (relay, warnings) = make_relay(1);

    relay.accept(LogFrame::from_static("fill"));
    for _ in 0..DROP_WARNING_THRESHOLD {
        relay.accept(LogFrame::from_static("drop"));
    }

    assert_eq!(relay.stats().pending_drops, DROP_WARNING_THRESHOLD);
    assert!(warnings.lines().is_empty());
}

#[test]
fn test_warning_when_threshold_exceeded() {
    let (relay, warnings) = make_relay(1);

    relay.accept(LogFrame::from_static("fill"));
    for _ in 0..=DROP_WARNING_THRESHOLD {
        relay.accept(LogFrame::from_static("drop"));
    }

    let lines = warnings.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("monitor dropped 11 logs during monitor request"));
    assert_eq!(relay.stats().pending_drops, 0);
    assert_eq!(relay.stats().dropped, 11);
}

#[test]
fn test_one_warning_per_eleven_drops() {
    let (relay, warnings) = make_relay(1);

    relay.accept(LogFrame::from_static("fill"));
    for _ in 0..50 {
        relay.accept(LogFrame::from_static("drop"));
    }

    // 50 = 4 * 11 + 6
    assert_eq!(warnings.lines().len(), 4);
    assert_eq!(relay.stats().pending_drops, 6);
    assert_eq!(relay.stats().dropped, 50);
}

#[test]
fn test_closed_queue_is_not_a_drop() {
    let (relay, warnings) = make_relay(1);
    let writer = relay.writer();
    drop(relay);

    for _ in 0..20 {
        writer.accept(LogFrame::from_static("late"));
    }

    assert_eq!(writer.pending_drops(), 0);
    assert_eq!(writer.dropped.load(Ordering::Relaxed), 0);
    assert!(warnings.lines().is_empty());
}

#[test]
fn test_concurrent_producers_lose_no_counts() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 100;

    let (relay, warnings) = make_relay(10);
    let writer = relay.writer();

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let writer = Arc::clone(&writer);
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    writer.accept(LogFrame::from(format!("{t}-{i}")));
                }
            });
        }
    });

    let stats = relay.stats();
    let drops = (THREADS * PER_THREAD - 10) as u64;
    assert_eq!(stats.accepted, 10);
    assert_eq!(stats.dropped, drops);
    assert_eq!(warnings.lines().len() as u64, drops / 11);
    assert_eq!(stats.pending_drops, drops % 11);
}

#[test]
fn test_admitted_frames_keep_order() {
    let (mut relay, _warnings) = make_relay(16);

    for seq in 0..16 {
        relay.accept(LogFrame::from(format!("seq={seq}")));
    }

    let frames = drain(&mut relay);
    let expected: Vec<_> = (0..16).map(|seq| LogFrame::from(format!("seq={seq}"))).collect();
    assert_eq!(frames, expected);
}
