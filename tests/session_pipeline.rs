//! End-to-end tests: session configuration through producers, queues and the
//! host loop to the final statistics.

use depthwatch::{
    DeviceSession, DrainPolicy, FileSink, PacketSink, SessionConfig, StopReason, StreamError, StreamMonitor,
};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("depthwatch-it-{}-{}", std::process::id(), name));
    std::fs::create_dir_all(&dir).expect("temp dir is writable");
    dir
}

const SYNTHETIC: &str = r#"
streams:
  - name: rgb
    max_size: 2
    blocking: true
    source:
      kind: synthetic
      fps: 200
      payload_bytes: 16
      drop_every: 4
      frames: 12
  - name: depth
    max_size: 2
    blocking: true
    source:
      kind: synthetic
      fps: 200
      payload_bytes: 8
      frames: 12
      latency_ms: 5
monitor:
  policy: blocking
  reference_stream: rgb
"#;

#[tokio::test]
async fn blocking_session_reports_loss_per_stream() {
    let config = SessionConfig::from_yaml_str(SYNTHETIC).expect("valid session");
    let session = DeviceSession::open(config).await.expect("session opens");
    let drainer = session.drainer(CancellationToken::new());
    let mut monitor = StreamMonitor::for_session(&session).expect("streams exist");

    let summary = tokio::time::timeout(Duration::from_secs(5), monitor.run(&drainer, &mut [], None))
        .await
        .expect("finite streams end the loop")
        .expect("clean exit");
    session.close().await;

    assert_eq!(summary.reason, StopReason::SessionClosed);
    assert_eq!(summary.cycles, 12);

    let rgb = &summary.snapshots[0];
    assert_eq!(rgb.stream, "rgb");
    assert_eq!(rgb.packets, 12);
    // 0 1 2 _ 4 5 6 _ 8 9 10 _ 12 13 14
    assert_eq!(rgb.lost_total, 3);
    assert_eq!(rgb.last_sequence, Some(14));
    assert_eq!(rgb.bytes, 12 * 16);

    let depth = &summary.snapshots[1];
    assert_eq!(depth.packets, 12);
    assert_eq!(depth.lost_total, 0);
    assert!(depth.latency_ms.expect("observed") >= 5.0, "latency includes the simulated delay");
    assert!(depth.skew_ms.is_some(), "skew is measured against rgb");
    assert!(depth.rate_hz > 0.0);
}

#[tokio::test]
async fn trace_replay_feeds_file_sink() {
    let dir = scratch_dir("trace");
    let trace = dir.join("left.yaml");
    std::fs::write(
        &trace,
        "- { sequence: 0, timestamp: 1.000, size: 4 }\n\
         - { sequence: 1, timestamp: 1.010, size: 4 }\n\
         - { sequence: 2, timestamp: 1.020, size: 4 }\n\
         - { sequence: 5, timestamp: 1.030, size: 4 }\n\
         - { sequence: 4, timestamp: 1.040, size: 4 }\n",
    )
    .expect("trace written");

    let yaml = format!(
        "streams:\n  - name: left\n    blocking: true\n    source:\n      kind: trace\n      path: '{}'\n",
        trace.display()
    );
    let config = SessionConfig::from_yaml_str(&yaml).expect("valid session");
    let session = DeviceSession::open(config).await.expect("session opens");
    let drainer = session.drainer(CancellationToken::new());
    let mut monitor = StreamMonitor::for_session(&session).expect("streams exist");

    let out = dir.join("out");
    let mut sinks: Vec<Box<dyn PacketSink>> = vec![Box::new(FileSink::create(&out, "bin").expect("creatable"))];
    let summary = tokio::time::timeout(Duration::from_secs(5), monitor.run(&drainer, &mut sinks, None))
        .await
        .expect("trace ends the loop")
        .expect("clean exit");
    session.close().await;

    let left = &summary.snapshots[0];
    assert_eq!(left.packets, 5);
    assert_eq!(left.lost_total, 2);
    assert_eq!(left.reordered_total, 1);
    assert_eq!(left.last_gap, Some(-2));
    assert_eq!(std::fs::read(out.join("left.bin")).expect("sink closed and flushed").len(), 20);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn non_blocking_trace_replay_keeps_last_batch() {
    let dir = scratch_dir("non-blocking");
    let trace = dir.join("depth.yaml");
    let records: String = (0..8u64)
        .filter(|seq| *seq != 3)
        .map(|seq| format!("- {{ sequence: {}, timestamp: {:.3}, size: 2 }}\n", seq, seq as f64 * 0.002))
        .collect();
    std::fs::write(&trace, records).expect("trace written");

    let yaml = format!(
        "streams:\n  - name: depth\n    max_size: 16\n    source:\n      kind: trace\n      path: '{}'\n\
         monitor:\n  policy: non_blocking\n",
        trace.display()
    );
    let config = SessionConfig::from_yaml_str(&yaml).expect("valid session");
    let session = DeviceSession::open(config).await.expect("session opens");
    let drainer = session.drainer(CancellationToken::new());
    let mut monitor = StreamMonitor::for_session(&session).expect("streams exist");

    let out = dir.join("out");
    let mut sinks: Vec<Box<dyn PacketSink>> = vec![Box::new(FileSink::create(&out, "raw").expect("creatable"))];
    let summary = tokio::time::timeout(Duration::from_secs(5), monitor.run(&drainer, &mut sinks, None))
        .await
        .expect("trace ends the loop")
        .expect("clean exit");
    session.close().await;

    assert_eq!(summary.reason, StopReason::SessionClosed);
    let depth = &summary.snapshots[0];
    assert_eq!(depth.packets, 7);
    assert_eq!(depth.lost_total, 1);
    assert_eq!(depth.last_sequence, Some(7));
    assert_eq!(std::fs::read(out.join("depth.raw")).expect("sink closed and flushed").len(), 14);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn latest_only_sheds_backlog_and_stops_on_shutdown() {
    let mut config = SessionConfig::from_yaml_str(SYNTHETIC).expect("valid session");
    for stream in &mut config.streams {
        stream.blocking = false;
    }
    config.monitor.policy = DrainPolicy::LatestOnly;

    let session = DeviceSession::open(config).await.expect("session opens");
    let shutdown = CancellationToken::new();
    let drainer = session.drainer(shutdown.clone());
    let mut monitor = StreamMonitor::for_session(&session).expect("streams exist");
    let mut updates = monitor.reports();

    let summary = monitor.run(&drainer, &mut [], None).await.expect("clean exit");
    assert_eq!(summary.reason, StopReason::SessionClosed);
    for snapshot in &summary.snapshots {
        assert!(snapshot.packets >= 1 && snapshot.packets <= 12, "{snapshot}");
    }

    let published = tokio::time::timeout(Duration::from_secs(1), updates.next())
        .await
        .expect("at least one batch published")
        .expect("stream open");
    assert_eq!(published.len(), 2);

    shutdown.cancel();
    let result = drainer.drain_latest(&["rgb"]).await;
    assert!(matches!(result, Err(StreamError::SessionClosed { .. }) | Err(StreamError::Interrupted)));
    session.close().await;
}

#[tokio::test]
async fn unknown_trace_is_a_config_error() {
    let yaml = "streams:\n  - name: left\n    source:\n      kind: trace\n      path: /nonexistent/depthwatch.yaml\n";
    let config = SessionConfig::from_yaml_str(yaml).expect("parses");
    let result = DeviceSession::open(config).await;
    assert!(matches!(result, Err(StreamError::Config { .. })));
}
