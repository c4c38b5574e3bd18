//! End-to-end scenario tests, run against the portable polling backend so
//! they don't depend on any particular kernel facility being present in CI.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sentrywatch::{Backend, Config, Event, EventFilter, EventHandler, Observer, RecursiveMode};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl EventHandler for Recorder {
    fn on_any_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let step = Duration::from_millis(20);
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if predicate() {
            return true;
        }
        std::thread::sleep(step);
        waited += step;
    }
    predicate()
}

fn fast_observer() -> Observer {
    let config = Config::default().with_poll_interval(Duration::from_millis(50));
    Observer::with_backend(config, Backend::Poll)
}

#[test]
fn scenario_create_file() {
    let dir = tempfile::tempdir().unwrap();
    let observer = fast_observer();
    observer.start().unwrap();

    let recorder = Arc::new(Recorder::default());
    observer
        .schedule(
            recorder.clone() as Arc<dyn EventHandler>,
            dir.path(),
            RecursiveMode::Recursive,
            EventFilter::empty(),
        )
        .unwrap();

    std::fs::write(dir.path().join("a"), b"hello").unwrap();

    let seen = wait_until(Duration::from_secs(2), || {
        recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.src_path() == dir.path().join("a"))
    });
    observer.stop();
    observer.join();
    assert!(seen, "expected a Created event for the new file");
}

#[test]
fn scenario_rename_within_root() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("dir1")).unwrap();
    std::fs::create_dir(dir.path().join("dir2")).unwrap();
    std::fs::write(dir.path().join("dir1").join("a"), b"x").unwrap();

    let observer = fast_observer();
    observer.start().unwrap();
    let recorder = Arc::new(Recorder::default());
    observer
        .schedule(
            recorder.clone() as Arc<dyn EventHandler>,
            dir.path(),
            RecursiveMode::Recursive,
            EventFilter::empty(),
        )
        .unwrap();

    // Let the first snapshot settle before mutating.
    std::thread::sleep(Duration::from_millis(150));

    std::fs::rename(dir.path().join("dir1").join("a"), dir.path().join("dir2").join("b")).unwrap();

    let src = dir.path().join("dir1").join("a");
    let dest = dir.path().join("dir2").join("b");
    let seen = wait_until(Duration::from_secs(2), || {
        recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.src_path() == src && e.dest_path() == Some(dest.as_path()))
    });
    observer.stop();
    observer.join();
    assert!(seen, "expected a Moved event for the renamed file");
}

#[test]
fn scenario_recursive_directory_move() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("a").join("b").join("c")).unwrap();
    std::fs::write(dir.path().join("a").join("b").join("c").join("f"), b"x").unwrap();

    let observer = fast_observer();
    observer.start().unwrap();
    let recorder = Arc::new(Recorder::default());
    observer
        .schedule(
            recorder.clone() as Arc<dyn EventHandler>,
            dir.path(),
            RecursiveMode::Recursive,
            EventFilter::empty(),
        )
        .unwrap();
    std::thread::sleep(Duration::from_millis(150));

    std::fs::rename(dir.path().join("a").join("b"), dir.path().join("b")).unwrap();

    let moved_dir = dir.path().join("a").join("b");
    let new_dir = dir.path().join("b");
    let seen_top = wait_until(Duration::from_secs(2), || {
        recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.is_directory() && e.src_path() == moved_dir && e.dest_path() == Some(new_dir.as_path()))
    });
    let seen_nested_file = recorder.events.lock().unwrap().iter().any(|e| {
        !e.is_directory()
            && e.src_path() == moved_dir.join("c").join("f")
            && e.dest_path() == Some(new_dir.join("c").join("f").as_path())
    });
    observer.stop();
    observer.join();
    assert!(seen_top, "expected a top-level directory Moved event");
    assert!(seen_nested_file, "expected a nested file Moved event");
}

#[test]
fn scenario_root_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let observer = fast_observer();
    observer.start().unwrap();
    let recorder = Arc::new(Recorder::default());
    observer
        .schedule(
            recorder.clone() as Arc<dyn EventHandler>,
            &root,
            RecursiveMode::Recursive,
            EventFilter::empty(),
        )
        .unwrap();
    std::thread::sleep(Duration::from_millis(150));

    std::fs::remove_dir_all(&root).unwrap();

    let seen = wait_until(Duration::from_secs(2), || {
        recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.is_directory() && e.src_path() == root)
    });
    observer.stop();
    observer.join();
    assert!(seen, "expected a Deleted event for the watch root");
}

#[test]
fn scenario_unschedule_inside_handler() {
    struct Unscheduler {
        observer: Observer,
        watch: Mutex<Option<sentrywatch::Watch>>,
        calls: Mutex<usize>,
    }

    impl EventHandler for Unscheduler {
        fn on_any_event(&self, _event: &Event) {
            *self.calls.lock().unwrap() += 1;
            if let Some(watch) = self.watch.lock().unwrap().take() {
                self.observer.unschedule(&watch).unwrap();
            }
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let observer = fast_observer();
    observer.start().unwrap();

    let handler = Arc::new(Unscheduler {
        observer: observer.clone(),
        watch: Mutex::new(None),
        calls: Mutex::new(0),
    });

    let watch = observer
        .schedule(
            handler.clone() as Arc<dyn EventHandler>,
            dir.path(),
            RecursiveMode::Recursive,
            EventFilter::empty(),
        )
        .unwrap();
    *handler.watch.lock().unwrap() = Some(watch.clone());

    std::fs::write(dir.path().join("a"), b"x").unwrap();

    let ran_once = wait_until(Duration::from_secs(2), || *handler.calls.lock().unwrap() >= 1);
    assert!(ran_once, "expected the handler to run at least once");

    // Give any further polling ticks a chance to fire; the watch should
    // already be gone so no further deliveries (and no further calls to an
    // already-unscheduled watch) should occur.
    std::thread::sleep(Duration::from_millis(300));
    let calls_after = *handler.calls.lock().unwrap();

    observer.stop();
    observer.join();

    assert!(observer.unschedule(&watch).is_err());
    assert_eq!(calls_after, *handler.calls.lock().unwrap());
}
