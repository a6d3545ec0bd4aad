//! Recording command runner for unit testing.
//!
//! Records the argument vector of every command instead of spawning it.
//! Set `should_fail = true` to make every spawn return
//! [`CommandError::Spawn`].

use std::sync::{Mutex, PoisonError};

use macropad_core::CommandSpec;

use crate::application::dispatch_event::{CommandError, CommandRunner};
use crate::infrastructure::journal::{Journal, JournalEntry};

/// A command runner that only records what it was asked to run.
#[derive(Debug, Default)]
pub struct RecordingCommandRunner {
    /// Argument vectors passed to `spawn_detached`, unexpanded.
    pub calls: Mutex<Vec<Vec<String>>>,
    pub should_fail: bool,
    pub journal: Option<Journal>,
}

impl RecordingCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    /// A snapshot of the recorded argument vectors.
    pub fn spawned(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl CommandRunner for RecordingCommandRunner {
    fn spawn_detached(&self, command: &CommandSpec) -> Result<(), CommandError> {
        let argv: Vec<String> = command.argv().into_iter().map(str::to_string).collect();
        if self.should_fail {
            return Err(CommandError::Spawn {
                program: argv.first().cloned().unwrap_or_default(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "mock failure"),
            });
        }
        if let Some(journal) = &self.journal {
            journal.record(JournalEntry::Spawned(argv.clone()));
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(argv);
        Ok(())
    }
}
