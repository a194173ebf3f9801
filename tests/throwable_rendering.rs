//! A `Throwable` attached to an `Event` must reach disk when routed
//! through a pattern-layout sink, since `PatternLayout` has no `%throwable`
//! token and relies on the sink to append it separately.

use emberlog::event::{Event, Throwable};
use emberlog::level::Level;
use emberlog::sink::{RollingFileSink, Sink};

#[test]
fn pattern_layout_sink_appends_stack_trace_and_cause_chain() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RollingFileSink::new("rolling", dir.path().join("app.log"), 1024 * 1024, 5, None).unwrap();

    let cause = Throwable::new("java.io.IOException", "disk full");
    let throwable = Throwable::new("RuntimeException", "write failed")
        .with_cause(cause);
    let mut throwable = throwable;
    throwable.stack_frames.push("App.write(App.java:42)".to_string());
    throwable.stack_frames.push("App.main(App.java:10)".to_string());

    let event = Event::builder("app", Level::Error)
        .message("flush failed")
        .throwable(throwable)
        .build();
    sink.append(&event);
    sink.close();

    let contents = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
    assert!(contents.contains("flush failed"));
    assert!(contents.contains("RuntimeException: write failed"));
    assert!(contents.contains("\tat App.write(App.java:42)"));
    assert!(contents.contains("\tat App.main(App.java:10)"));
    assert!(contents.contains("Caused by: java.io.IOException: disk full"));
}
