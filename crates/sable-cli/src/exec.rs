//! Exec command implementation for Sable CLI.
//!
//! Runs one shell command through the console and mirrors the console to the
//! terminal. Lines typed on stdin are forwarded to the command.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal};
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use sable_core::{Config, Console, Dispatcher, KeyEvent, ProcessRegistry, ProcessRunner};

use crate::render::Renderer;

/// How long the loop waits for console activity between renders.
const FRAME: Duration = Duration::from_millis(50);

/// Execute the exec command. Returns the command's exit code.
pub fn execute(config: &Config, command: &str, dir: Option<&Path>) -> anyhow::Result<i32> {
    let mut dispatcher = Dispatcher::new();
    let registry = ProcessRegistry::new();
    let console = Console::new(&mut dispatcher, registry.clone(), config.progress.clone());
    let runner = ProcessRunner::new(registry.clone(), console.writer(), &config.process);

    let exit = Rc::new(Cell::new(None));
    let slot = exit.clone();
    let exit_box = dispatcher.mailbox(move |code: i32| slot.set(Some(code)));

    let input = Rc::new(RefCell::new(VecDeque::new()));
    let queue = input.clone();
    let lines = dispatcher.mailbox(move |line: String| queue.borrow_mut().push_back(line));
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        lines.post(line);
                    }
                    Err(e) => {
                        tracing::debug!("stdin closed: {}", e);
                        break;
                    }
                }
            }
        })?;

    runner.run_async(command, dir, move |code| {
        exit_box.post(code);
    })?;

    let mut stdout = io::stdout();
    let mut renderer = Renderer::new(stdout.is_terminal());
    loop {
        dispatcher.pump_timeout(FRAME);
        renderer.render(&console.log(), &mut stdout)?;

        if let Some(code) = exit.get() {
            tracing::debug!("`{}` exited with {}", command, code);
            return Ok(code);
        }

        // Hold typed lines until the command is running.
        if registry.is_empty() || input.borrow().is_empty() {
            continue;
        }
        let pending: Vec<String> = input.borrow_mut().drain(..).collect();
        for line in pending {
            for c in line.chars() {
                console.read_key(KeyEvent::Char(c));
            }
            if !console.read_key(KeyEvent::Enter) {
                tracing::warn!("No running process to receive input");
            }
        }
        // The terminal already echoed what was typed.
        renderer.skip_to_end(&console.log());
    }
}
