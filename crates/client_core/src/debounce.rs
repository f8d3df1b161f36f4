//! Coalesces rapid search input into at most one committed term per quiet
//! period.

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

/// A term whose quiet period elapsed. `generation` identifies the arming that
/// produced it so a late timer cannot commit a superseded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebouncedTerm {
    pub generation: u64,
    pub term: String,
}

enum DebounceState {
    Idle,
    Armed {
        timer: JoinHandle<()>,
        pending: String,
        generation: u64,
    },
}

pub struct SearchDebouncer {
    quiet_period: Duration,
    emit: mpsc::UnboundedSender<DebouncedTerm>,
    generation: u64,
    state: DebounceState,
}

impl SearchDebouncer {
    pub fn new(quiet_period: Duration, emit: mpsc::UnboundedSender<DebouncedTerm>) -> Self {
        Self {
            quiet_period,
            emit,
            generation: 0,
            state: DebounceState::Idle,
        }
    }

    pub fn channel(quiet_period: Duration) -> (Self, mpsc::UnboundedReceiver<DebouncedTerm>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(quiet_period, tx), rx)
    }

    /// Feeds one input value.
    ///
    /// An empty value disarms and is returned immediately as the committed
    /// term. Anything else (re)starts the quiet period and returns `None`.
    /// Must be called from within a tokio runtime.
    pub fn input(&mut self, value: &str) -> Option<String> {
        self.cancel();
        if value.is_empty() {
            return Some(String::new());
        }

        self.generation += 1;
        let generation = self.generation;
        let fired = DebouncedTerm {
            generation,
            term: value.to_string(),
        };
        let emit = self.emit.clone();
        let quiet_period = self.quiet_period;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let _ = emit.send(fired);
        });

        debug!(generation, "search debounce armed");
        self.state = DebounceState::Armed {
            timer,
            pending: value.to_string(),
            generation,
        };
        None
    }

    /// Accepts a fired timer. Returns `true` (and goes idle) only when it
    /// belongs to the current arming.
    pub fn settle(&mut self, fired: &DebouncedTerm) -> bool {
        let current = matches!(
            &self.state,
            DebounceState::Armed { generation, .. } if *generation == fired.generation
        );
        if current {
            self.state = DebounceState::Idle;
        }
        current
    }

    pub fn cancel(&mut self) {
        if let DebounceState::Armed { timer, .. } =
            std::mem::replace(&mut self.state, DebounceState::Idle)
        {
            timer.abort();
        }
    }

    pub fn pending(&self) -> Option<&str> {
        match &self.state {
            DebounceState::Armed { pending, .. } => Some(pending.as_str()),
            DebounceState::Idle => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, DebounceState::Armed { .. })
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "tests/debounce_tests.rs"]
mod tests;
