//! Source watcher posting into a mailbox.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::time::Duration;

use sable_core::config::SourceConfig;
use sable_core::{Dispatcher, FileEvent, SourceWatcher};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn test_directory_watch_filters_extensions() {
    let temp = TempDir::new().unwrap();
    let mut dispatcher = Dispatcher::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let events = dispatcher.mailbox(move |event: FileEvent| sink.borrow_mut().push(event));

    let _watcher = SourceWatcher::new(temp.path(), &SourceConfig::default(), events).unwrap();

    fs::write(temp.path().join("notes.txt"), "ignored").unwrap();
    fs::write(temp.path().join("main.cc"), "int main() {}").unwrap();

    assert!(dispatcher.run_until(TIMEOUT, || {
        seen.borrow()
            .iter()
            .any(|e| e.path().file_name().is_some_and(|n| n == "main.cc"))
    }));
    dispatcher.pump_timeout(Duration::from_millis(300));

    let seen = seen.borrow();
    assert!(
        seen.iter()
            .all(|e| e.path().extension().is_some_and(|ext| ext == "cc"))
    );
    assert!(matches!(seen.last(), Some(FileEvent::Modified(_))));
}

#[test]
fn test_file_watch_reports_removal() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("util.h");
    let other = temp.path().join("other.h");
    fs::write(&file, "#pragma once").unwrap();

    let mut dispatcher = Dispatcher::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let events = dispatcher.mailbox(move |event: FileEvent| sink.borrow_mut().push(event));

    let _watcher = SourceWatcher::new(&file, &SourceConfig::default(), events).unwrap();

    fs::write(&other, "// not watched").unwrap();
    fs::remove_file(&file).unwrap();

    assert!(dispatcher.run_until(TIMEOUT, || {
        seen.borrow()
            .iter()
            .any(|e| matches!(e, FileEvent::Removed(_)))
    }));

    let seen = seen.borrow();
    assert!(
        seen.iter()
            .all(|e| e.path().file_name().is_some_and(|n| n == "util.h"))
    );
}
