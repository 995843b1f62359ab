//! External command execution with console streaming.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use crate::config::ProcessConfig;
use crate::console::ConsoleWriter;
use crate::error::{Error, Result};

use super::registry::ProcessRegistry;

/// Exit code reported when a command could not be started.
pub const SPAWN_FAILED: i32 = -1;

/// Runs shell commands, streaming their output into the console.
///
/// Cheap to clone; clones share the registry and console.
#[derive(Clone)]
pub struct ProcessRunner {
    registry: ProcessRegistry,
    writer: ConsoleWriter,
    shell: PathBuf,
    chunk_size: usize,
}

impl ProcessRunner {
    pub fn new(registry: ProcessRegistry, writer: ConsoleWriter, config: &ProcessConfig) -> Self {
        let shell = which::which(&config.shell).unwrap_or_else(|e| {
            tracing::debug!("Could not resolve shell `{}`: {}", config.shell, e);
            PathBuf::from(&config.shell)
        });
        Self {
            registry,
            writer,
            shell,
            chunk_size: config.chunk_size.max(1),
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Run `command` and block until it exits.
    ///
    /// Stdout and stderr stream into the console, stderr emphasized. The
    /// child is the foreground child while it runs. Returns the exit code,
    /// `128 + signal` if it was killed, or [`SPAWN_FAILED`].
    pub fn run(&self, command: &str, dir: Option<&Path>) -> i32 {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = Error::Spawn {
                    command: command.to_string(),
                    source,
                };
                tracing::error!("{}", err);
                self.writer.write(format!("Error: {}\n", err), true);
                return SPAWN_FAILED;
            }
        };

        let pid = child.id();
        tracing::info!("Started `{}` as process {}", command, pid);
        let id = self.registry.register(pid, command, child.stdin.take());

        let readers = [
            child.stdout.take().and_then(|out| self.spawn_reader(out, false)),
            child.stderr.take().and_then(|err| self.spawn_reader(err, true)),
        ];

        let status = child.wait();
        for reader in readers.into_iter().flatten() {
            if reader.join().is_err() {
                tracing::error!("Output reader for process {} panicked", pid);
            }
        }
        self.registry.deregister(id);

        let code = exit_code(status);
        tracing::info!("Process {} exited with {}", pid, code);
        code
    }

    /// Run `command` on a new thread and call `on_done` with its exit code.
    ///
    /// `on_done` runs on that thread, not the owning thread; post through a
    /// mailbox for anything that touches owning-thread state.
    pub fn run_async<F>(&self, command: &str, dir: Option<&Path>, on_done: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let runner = self.clone();
        let command = command.to_string();
        let dir = dir.map(Path::to_path_buf);
        let handle = thread::Builder::new()
            .name("process-runner".to_string())
            .spawn(move || {
                let code = runner.run(&command, dir.as_deref());
                on_done(code);
            })?;
        Ok(handle)
    }

    /// Write `text` to the foreground child's input.
    pub fn send_input(&self, text: &str) -> Result<()> {
        let mut foreground = self.registry.foreground().ok_or(Error::NoForegroundProcess)?;
        let line = text.strip_suffix('\n').unwrap_or(text);
        for c in line.chars() {
            foreground.push(c);
        }
        foreground.submit()?;
        Ok(())
    }

    /// Interrupt (or terminate, with `force`) the most recent child.
    pub fn kill_last(&self, force: bool) -> bool {
        self.registry.kill_last(force)
    }

    /// Interrupt (or terminate, with `force`) every child.
    pub fn kill_all(&self, force: bool) -> usize {
        self.registry.kill_all(force)
    }

    fn spawn_reader<R>(&self, reader: R, emphasis: bool) -> Option<JoinHandle<()>>
    where
        R: Read + Send + 'static,
    {
        let writer = self.writer.clone();
        let chunk_size = self.chunk_size;
        thread::Builder::new()
            .name(if emphasis { "stderr-reader" } else { "stdout-reader" }.to_string())
            .spawn(move || stream_output(reader, &writer, emphasis, chunk_size))
            .map_err(|e| tracing::warn!("Could not start output reader: {}", e))
            .ok()
    }
}

/// Copy `reader` into the console in chunks until EOF.
fn stream_output(mut reader: impl Read, writer: &ConsoleWriter, emphasis: bool, chunk_size: usize) {
    let mut buf = vec![0u8; chunk_size];
    let mut decoder = Utf8Chunker::default();
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Some(text) = decoder.push(&buf[..n]) {
                    writer.write(text, emphasis);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("Output pipe closed: {}", e);
                break;
            }
        }
    }
    if let Some(rest) = decoder.finish() {
        writer.write(rest, emphasis);
    }
}

fn exit_code(status: io::Result<ExitStatus>) -> i32 {
    match status {
        Ok(status) => status.code().unwrap_or_else(|| signal_exit_code(status)),
        Err(e) => {
            tracing::warn!("Failed to wait for process: {}", e);
            SPAWN_FAILED
        }
    }
}

#[cfg(unix)]
fn signal_exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map_or(SPAWN_FAILED, |sig| 128 + sig)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: ExitStatus) -> i32 {
    SPAWN_FAILED
}

/// Splits a byte stream into UTF-8 text without cutting characters in half.
#[derive(Debug, Default)]
pub(crate) struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    /// Feed bytes; returns the text that is complete so far.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);
        let split = self.pending.len() - incomplete_tail_len(&self.pending);
        if split == 0 {
            return None;
        }
        let tail = self.pending.split_off(split);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        Some(text)
    }

    /// Flush whatever is left, replacing a truncated character.
    pub(crate) fn finish(self) -> Option<String> {
        (!self.pending.is_empty()).then(|| String::from_utf8_lossy(&self.pending).into_owned())
    }
}

/// Length of a trailing, not yet complete UTF-8 sequence.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let b = bytes[bytes.len() - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match b {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
