use crate::common::config::SpeechConfig;
use crate::core::source::{Announcer, Silent};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

/// Speaks through an external TTS program, e.g. `spd-say`.
///
/// Utterances run in the background. Finished ones are reaped on the next
/// announcement so no zombie processes pile up while the lock runs.
pub struct SpeechCommand {
    program: String,
    running: Mutex<Vec<Child>>,
}

impl SpeechCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            running: Mutex::new(Vec::new()),
        }
    }

    /// `SpeechCommand` when speech is enabled, `Silent` otherwise.
    pub fn from_config(config: &SpeechConfig) -> Box<dyn Announcer> {
        if config.enabled {
            Box::new(Self::new(config.command.clone()))
        } else {
            Box::new(Silent)
        }
    }

    /// Collects every utterance that has finished. Returns how many are
    /// still speaking.
    pub fn reap(&self) -> usize {
        let Ok(mut running) = self.running.lock() else {
            return 0;
        };

        running.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    tracing::debug!("Speech program {} exited with {}", self.program, status);
                }
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::debug!("Failed to poll speech program {}: {}", self.program, e);
                false
            }
        });
        running.len()
    }
}

impl Announcer for SpeechCommand {
    fn announce(&self, text: &str) {
        tracing::debug!("Announcing: {}", text);
        self.reap();

        // Never waits: the controller keeps ticking while speech plays.
        let spawned = Command::new(&self.program)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                if let Ok(mut running) = self.running.lock() {
                    running.push(child);
                }
            }
            Err(e) => tracing::debug!("Speech program {} failed: {}", self.program, e),
        }
    }
}

impl Drop for SpeechCommand {
    fn drop(&mut self) {
        let still_speaking = self.reap();
        if still_speaking > 0 {
            tracing::debug!("{} announcements still playing at shutdown", still_speaking);
        }
    }
}
