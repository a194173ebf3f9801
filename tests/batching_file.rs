//! End-to-end batching behavior: size trigger, age trigger, and drain
//! on close, all observed through the file on disk.

use emberlog::event::Event;
use emberlog::layout::PatternLayout;
use emberlog::level::Level;
use emberlog::sink::{BatchingFileSink, Sink};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn size_triggered_flush_writes_exact_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.log");
    let sink = BatchingFileSink::with_batch_time("batch", &path, 5, Duration::from_secs(30)).unwrap();
    sink.set_layout(Arc::new(PatternLayout::new("%message%n")));

    for i in 0..4 {
        sink.append(&Event::builder("app", Level::Info).message(format!("{i}")).build());
    }
    assert!(std::fs::read_to_string(&path).unwrap().is_empty());

    sink.append(&Event::builder("app", Level::Info).message("4").build());
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "0\n1\n2\n3\n4\n");
    sink.close();
}

#[test]
fn age_triggered_flush_happens_without_filling_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.log");
    let sink = BatchingFileSink::with_batch_time("batch", &path, 10_000, Duration::from_millis(30)).unwrap();
    sink.set_layout(Arc::new(PatternLayout::new("%message%n")));

    sink.append(&Event::builder("app", Level::Info).message("lonely").build());
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "lonely\n");
    sink.close();
}

#[test]
fn close_drains_partial_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.log");
    let sink = BatchingFileSink::with_batch_time("batch", &path, 10_000, Duration::from_secs(30)).unwrap();
    sink.set_layout(Arc::new(PatternLayout::new("%message%n")));

    sink.append(&Event::builder("app", Level::Info).message("a").build());
    sink.append(&Event::builder("app", Level::Info).message("b").build());
    sink.close();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
}
