use std::time::Duration;

use cask_types::Checksum;
use crossbeam_channel::Sender;
use tracing::debug;

/// Progress notifications from the backup and restore pipelines.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BackupStarted { root: String },
    PathError { path: String, error: String },
    FileStored { path: String, size: u64 },
    FileCached { path: String },
    DirectoryDone { path: String },
    BackupDone { snapshot: Checksum, duration: Duration },

    RestoreStarted { snapshot: Checksum, path: String },
    FileRestored { path: String, size: u64 },
    DirectoryRestored { path: String },
    /// A directory whose children did not all restore.
    DirectoryCorrupted { path: String },
    Skipped { path: String, reason: String },
    RestoreDone { files: u64, bytes: u64 },
}

/// Optional event sink shared by pipeline workers.
#[derive(Clone, Default)]
pub struct Events {
    tx: Option<Sender<Event>>,
}

impl Events {
    /// Log only.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: Event) {
        debug!(?event, "event");
        if let Some(tx) = &self.tx {
            // A receiver that went away is not our problem.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_delivers_and_tolerates_disconnect() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let events = Events::new(tx);
        events.emit(Event::FileCached { path: "/a".into() });
        assert_eq!(rx.try_recv().unwrap(), Event::FileCached { path: "/a".into() });

        drop(rx);
        events.emit(Event::DirectoryDone { path: "/".into() });
        Events::none().emit(Event::DirectoryDone { path: "/".into() });
    }
}
