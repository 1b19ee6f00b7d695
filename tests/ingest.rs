use std::sync::Arc;
use std::time::Duration;

use logdriver::stream::MemoryStreams;
use logdriver::{
    DriverConfig, DriverError, IngestEnd, LogDriver, PartialMetadata, WorkloadLogContext,
};
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;

mod support;

use support::{context, entry, frame, lines, malformed_frame, memory_harness, wait_until, IMAGE};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn frames_are_persisted_in_order_with_metadata() {
    let harness = memory_harness();
    let mut writer = harness.streams.connect("/run/fifo/one");
    harness
        .driver
        .start_logging("/run/fifo/one", context())
        .await
        .expect("start logging");

    let mut bytes = frame(entry("first", 1_000));
    bytes.extend(frame(support::partial_entry("sec", 2_000, "p1", 1, false)));
    bytes.extend(frame(support::partial_entry("ond", 3_000, "p1", 2, true)));
    writer.write_all(&bytes).await.expect("write frames");

    let store = harness.store.clone();
    assert!(wait_until(WAIT, || store.records(IMAGE).len() == 3).await);

    let records = harness.store.records(IMAGE);
    assert_eq!(lines(&records), ["first", "sec", "ond"]);
    assert_eq!(records[0].partial, None);
    assert_eq!(
        records[2].partial,
        Some(PartialMetadata {
            id: "p1".to_owned(),
            last: true,
            ordinal: 2,
        })
    );
    assert_eq!(records[1].timestamp.unix_timestamp_nanos(), 2_000);

    let report = harness
        .driver
        .stop_logging("/run/fifo/one")
        .await
        .expect("session was running");
    assert_eq!(report.frames, 3);
    assert_eq!(report.end, IngestEnd::Stopped);
    assert!(harness.driver.registry().is_empty());
}

#[tokio::test]
async fn malformed_frame_is_skipped_and_ingestion_continues() {
    let harness = memory_harness();
    let mut writer = harness.streams.connect("s");
    harness
        .driver
        .start_logging("s", context())
        .await
        .expect("start logging");

    let mut bytes = frame(entry("before", 1));
    bytes.extend(malformed_frame());
    bytes.extend(frame(entry("after", 2)));
    writer.write_all(&bytes).await.expect("write frames");

    let store = harness.store.clone();
    assert!(wait_until(WAIT, || store.records(IMAGE).len() == 2).await);
    assert_eq!(lines(&harness.store.records(IMAGE)), ["before", "after"]);

    let report = harness.driver.stop_logging("s").await.expect("running");
    assert_eq!(report.decode_errors, 1);
    assert_eq!(report.frames, 2);
}

#[tokio::test]
async fn oversized_length_prefix_is_skipped() {
    let harness = memory_harness();
    let mut writer = harness.streams.connect("s");
    harness
        .driver
        .start_logging("s", context())
        .await
        .expect("start logging");

    let mut bytes = 1_000_001u32.to_be_bytes().to_vec();
    bytes.extend(frame(entry("survivor", 1)));
    writer.write_all(&bytes).await.expect("write frames");

    let store = harness.store.clone();
    assert!(wait_until(WAIT, || store.records(IMAGE).len() == 1).await);
    assert_eq!(lines(&harness.store.records(IMAGE)), ["survivor"]);
}

#[tokio::test]
async fn duplicate_start_is_rejected_and_first_session_keeps_running() {
    let harness = memory_harness();
    let mut writer = harness.streams.connect("dup");
    harness
        .driver
        .start_logging("dup", context())
        .await
        .expect("first start");

    let error = harness
        .driver
        .start_logging("dup", context())
        .await
        .expect_err("second start must fail");
    assert!(matches!(error, DriverError::AlreadyExists { ref stream_id } if stream_id == "dup"));
    assert!(error.to_string().contains("already exists"));

    writer
        .write_all(&frame(entry("still flowing", 1)))
        .await
        .expect("write frame");
    let store = harness.store.clone();
    assert!(wait_until(WAIT, || store.records(IMAGE).len() == 1).await);
    assert_eq!(harness.driver.registry().len(), 1);
}

#[tokio::test]
async fn missing_image_name_is_rejected_before_anything_opens() {
    let harness = memory_harness();
    let _writer = harness.streams.connect("s");

    let error = harness
        .driver
        .start_logging("s", WorkloadLogContext::default())
        .await
        .expect_err("image name is required");
    assert!(matches!(error, DriverError::MissingImageName));
    assert!(harness.driver.registry().is_empty());
}

#[tokio::test]
async fn sink_open_failure_is_reported() {
    let harness = memory_harness();
    let _writer = harness.streams.connect("s");
    harness.store.fail_next_opens(1);

    let error = harness
        .driver
        .start_logging("s", context())
        .await
        .expect_err("sink cannot open");
    assert!(matches!(error, DriverError::SinkInit(_)));
    assert!(harness.driver.registry().is_empty());
}

#[tokio::test]
async fn unopenable_stream_is_reported() {
    let harness = memory_harness();

    let error = harness
        .driver
        .start_logging("/nowhere", context())
        .await
        .expect_err("no stream connected");
    assert!(matches!(error, DriverError::OpenStream { ref stream_id, .. } if stream_id == "/nowhere"));
    assert!(harness.driver.registry().is_empty());
}

#[tokio::test]
async fn closing_the_writer_ends_the_session() {
    let harness = memory_harness();
    let mut writer = harness.streams.connect("s");
    harness
        .driver
        .start_logging("s", context())
        .await
        .expect("start logging");

    writer
        .write_all(&frame(entry("last words", 1)))
        .await
        .expect("write frame");
    drop(writer);

    let registry_empty = || harness.driver.registry().is_empty();
    assert!(wait_until(WAIT, registry_empty).await);
    assert_eq!(lines(&harness.store.records(IMAGE)), ["last words"]);

    assert!(harness.driver.stop_logging("s").await.is_none());

    let mut writer = harness.streams.connect("s");
    harness
        .driver
        .start_logging("s", context())
        .await
        .expect("id can be reused after the session ended");
    writer
        .write_all(&frame(entry("second life", 2)))
        .await
        .expect("write frame");
    let store = harness.store.clone();
    assert!(wait_until(WAIT, || store.records(IMAGE).len() == 2).await);
}

#[tokio::test]
async fn stop_unblocks_an_idle_worker() {
    let harness = memory_harness();
    let _writer = harness.streams.connect("idle");
    harness
        .driver
        .start_logging("idle", context())
        .await
        .expect("start logging");

    let report = tokio::time::timeout(WAIT, harness.driver.stop_logging("idle"))
        .await
        .expect("stop should not hang on an idle stream")
        .expect("session was running");
    assert_eq!(report.end, IngestEnd::Stopped);
    assert_eq!(report.frames, 0);
}

#[tokio::test]
async fn stop_of_unknown_stream_is_a_no_op() {
    let harness = memory_harness();
    assert!(harness.driver.stop_logging("never-started").await.is_none());
}

#[tokio::test]
async fn write_failures_are_logged_and_skipped() {
    let harness = memory_harness();
    let mut writer = harness.streams.connect("s");
    harness
        .driver
        .start_logging("s", context())
        .await
        .expect("start logging");
    harness.store.fail_next_writes(1);

    let mut bytes = frame(entry("dropped", 1));
    bytes.extend(frame(entry("kept", 2)));
    writer.write_all(&bytes).await.expect("write frames");

    let store = harness.store.clone();
    assert!(wait_until(WAIT, || store.records(IMAGE).len() == 1).await);

    let report = harness.driver.stop_logging("s").await.expect("running");
    assert_eq!(report.write_errors, 1);
    assert_eq!(report.frames, 2);
    assert_eq!(lines(&harness.store.records(IMAGE)), ["kept"]);
}

#[tokio::test]
async fn sessions_are_independent() {
    let harness = memory_harness();
    let mut web = harness.streams.connect("web");
    let mut db = harness.streams.connect("db");
    harness
        .driver
        .start_logging("web", context())
        .await
        .expect("start web");
    harness
        .driver
        .start_logging("db", WorkloadLogContext::for_image("postgres:16"))
        .await
        .expect("start db");

    web.write_all(&frame(entry("GET /", 1))).await.expect("write");
    db.write_all(&frame(entry("checkpoint", 1))).await.expect("write");
    drop(db);

    let store = harness.store.clone();
    assert!(
        wait_until(WAIT, || {
            store.records(IMAGE).len() == 1 && store.records("postgres:16").len() == 1
        })
        .await
    );
    let driver = &harness.driver;
    assert!(wait_until(WAIT, || !driver.registry().contains("db")).await);
    assert!(harness.driver.registry().contains("web"));
}

#[tokio::test]
async fn shutdown_stops_every_session() {
    let harness = memory_harness();
    let _a = harness.streams.connect("a");
    let _b = harness.streams.connect("b");
    for id in ["a", "b"] {
        harness
            .driver
            .start_logging(id, context())
            .await
            .expect("start logging");
    }
    assert_eq!(harness.driver.registry().len(), 2);

    tokio::time::timeout(WAIT, harness.driver.shutdown())
        .await
        .expect("shutdown should finish");
    assert!(harness.driver.registry().is_empty());
}

#[tokio::test]
async fn decode_backoff_still_delivers_later_frames() {
    let streams = MemoryStreams::new();
    let store = logdriver::sink::MemoryStore::new();
    let driver = LogDriver::new(
        Arc::new(store.factory()),
        Arc::new(streams.clone()),
        DriverConfig::default().with_decode_error_backoff(Duration::from_millis(20)),
    );
    let mut writer = streams.connect("s");
    driver.start_logging("s", context()).await.expect("start");

    let mut bytes = malformed_frame();
    bytes.extend(frame(entry("after backoff", 1)));
    writer.write_all(&bytes).await.expect("write frames");

    let stored = store.clone();
    assert!(wait_until(WAIT, || stored.records(IMAGE).len() == 1).await);
    let report = driver.stop_logging("s").await.expect("running");
    assert_eq!(report.decode_errors, 1);
}
