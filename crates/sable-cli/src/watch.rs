//! Watch command implementation for Sable CLI.

use std::path::Path;
use std::time::Duration;

use sable_core::{Config, Dispatcher, FileEvent, SourceWatcher};

/// Execute the watch command. Runs until interrupted.
pub fn execute(config: &Config, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    let mut dispatcher = Dispatcher::new();
    let events = dispatcher.mailbox(|event: FileEvent| match event {
        FileEvent::Modified(path) => println!("modified {}", path.display()),
        FileEvent::Removed(path) => println!("removed  {}", path.display()),
    });

    let _watcher = SourceWatcher::new(path, &config.source, events)
        .map_err(|e| anyhow::anyhow!("Failed to create file watcher: {}", e))?;
    println!("Watching {} (Ctrl+C to stop)", path.display());

    loop {
        dispatcher.pump_timeout(Duration::from_secs(1));
    }
}
