//! Running shell commands through the console.
#![cfg(unix)]

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use sable_core::config::{ProcessConfig, ProgressConfig};
use sable_core::process::SPAWN_FAILED;
use sable_core::{Console, Dispatcher, KeyEvent, ProcessRegistry, ProcessRunner};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

struct Shell {
    dispatcher: Dispatcher,
    console: Console,
    runner: ProcessRunner,
    exit: Rc<RefCell<Option<i32>>>,
    exit_box: sable_core::Mailbox<i32>,
}

fn shell() -> Shell {
    let mut dispatcher = Dispatcher::new();
    let registry = ProcessRegistry::new();
    let console = Console::new(&mut dispatcher, registry.clone(), ProgressConfig::default());
    let runner = ProcessRunner::new(registry, console.writer(), &ProcessConfig::default());
    let exit = Rc::new(RefCell::new(None));
    let slot = exit.clone();
    let exit_box = dispatcher.mailbox(move |code: i32| *slot.borrow_mut() = Some(code));
    Shell {
        dispatcher,
        console,
        runner,
        exit,
        exit_box,
    }
}

impl Shell {
    fn start(&self, command: &str, dir: Option<&Path>) {
        let exit_box = self.exit_box.clone();
        self.runner
            .run_async(command, dir, move |code| {
                exit_box.post(code);
            })
            .unwrap();
    }

    fn wait_exit(&mut self) -> i32 {
        let exit = self.exit.clone();
        assert!(
            self.dispatcher.run_until(TIMEOUT, || exit.borrow().is_some()),
            "command did not finish"
        );
        self.exit.borrow_mut().take().unwrap()
    }
}

#[test]
fn test_stdout_plain_stderr_emphasized() {
    let mut sh = shell();
    sh.start("printf a; sleep 0.2; printf b >&2", None);
    assert_eq!(sh.wait_exit(), 0);

    let log = sh.console.log();
    assert_eq!(log.text(), "ab");
    let spans = log.line(0).unwrap().spans();
    assert_eq!(spans.len(), 2);
    assert_eq!((spans[0].text.as_str(), spans[0].emphasis), ("a", false));
    assert_eq!((spans[1].text.as_str(), spans[1].emphasis), ("b", true));
}

#[test]
fn test_keystrokes_reach_foreground_child() {
    let mut sh = shell();
    sh.start(r#"IFS= read -r l; printf "<%s>" "$l""#, None);

    let registry = sh.runner.registry().clone();
    assert!(sh.dispatcher.run_until(TIMEOUT, || !registry.is_empty()));

    for c in "echo hi".chars() {
        assert!(sh.console.read_key(KeyEvent::Char(c)));
    }
    assert!(sh.console.read_key(KeyEvent::Enter));

    assert_eq!(sh.wait_exit(), 0);
    assert_eq!(sh.console.text(), "echo hi\n<echo hi>");
    assert!(registry.is_empty());
    assert!(registry.foreground().is_none());
    assert!(!sh.console.read_key(KeyEvent::Char('x')));
}

#[test]
fn test_backspace_edits_pending_input() {
    let mut sh = shell();
    sh.start(r#"IFS= read -r l; printf "[%s]" "$l""#, None);

    let registry = sh.runner.registry().clone();
    assert!(sh.dispatcher.run_until(TIMEOUT, || !registry.is_empty()));

    for key in [
        KeyEvent::Char('n'),
        KeyEvent::Char('o'),
        KeyEvent::Backspace,
        KeyEvent::Char('k'),
        KeyEvent::Other,
        KeyEvent::Enter,
    ] {
        assert!(sh.console.read_key(key));
    }

    assert_eq!(sh.wait_exit(), 0);
    assert_eq!(sh.console.text(), "nk\n[nk]");
}

#[test]
fn test_send_input_without_child() {
    let sh = shell();
    assert!(matches!(
        sh.runner.send_input("hello"),
        Err(sable_core::Error::NoForegroundProcess)
    ));
}

#[test]
fn test_kill_last_on_empty_registry_then_run() {
    let mut sh = shell();
    assert!(!sh.runner.kill_last(false));
    assert_eq!(sh.runner.kill_all(true), 0);

    sh.start("printf ok", None);
    assert_eq!(sh.wait_exit(), 0);
    assert_eq!(sh.console.text(), "ok");
}

#[test]
fn test_kill_last_interrupts_child() {
    let mut sh = shell();
    sh.start("sleep 30", None);

    let registry = sh.runner.registry().clone();
    assert!(sh.dispatcher.run_until(TIMEOUT, || !registry.is_empty()));
    assert!(sh.runner.kill_last(true));

    assert_eq!(sh.wait_exit(), 128 + 15);
    assert!(registry.is_empty());
}

#[test]
fn test_input_to_stalled_child_keeps_owner_responsive() {
    let mut sh = shell();
    sh.start("sleep 30", None);

    let registry = sh.runner.registry().clone();
    assert!(sh.dispatcher.run_until(TIMEOUT, || !registry.is_empty()));

    let start = std::time::Instant::now();
    for _ in 0..(128 * 1024) {
        sh.console.read_key(KeyEvent::Char('x'));
    }
    assert!(sh.console.read_key(KeyEvent::Enter));
    assert!(sh.runner.kill_last(true));
    assert!(start.elapsed() < TIMEOUT);

    assert_eq!(sh.wait_exit(), 128 + 15);
    assert!(registry.is_empty());
}

#[test]
fn test_exit_code_and_working_directory() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("marker.txt"), "").unwrap();

    let mut sh = shell();
    sh.start("ls; exit 3", Some(temp.path()));
    assert_eq!(sh.wait_exit(), 3);
    assert_eq!(sh.console.text(), "marker.txt\n");
}

#[test]
fn test_spawn_failure_reports_error_line() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing");

    let mut sh = shell();
    assert_eq!(sh.runner.run("true", Some(&missing)), SPAWN_FAILED);
    sh.dispatcher.pump();

    let log = sh.console.log();
    let line = log.line(0).unwrap();
    assert!(line.text().starts_with("Error: failed to run command `true`"));
    assert!(line.has_emphasis());
    assert_eq!(log.line_count(), 2);
}
