//! Debounced search input.
//!
//! Every keystroke goes through [`SearchInput::set`]; [`DebouncedSearch::settled`]
//! yields the latest term once no new keystroke arrived for the configured delay.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

pub fn debounce_channel(delay: Duration) -> (SearchInput, DebouncedSearch) {
    let (tx, rx) = watch::channel(String::new());
    (
        SearchInput { tx },
        DebouncedSearch {
            rx,
            delay,
            deadline: None,
        },
    )
}

#[derive(Debug)]
pub struct SearchInput {
    tx: watch::Sender<String>,
}

impl SearchInput {
    pub fn set(&self, term: impl Into<String>) {
        self.tx.send_replace(term.into());
    }

    /// The raw, not yet debounced term.
    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }
}

#[derive(Debug)]
pub struct DebouncedSearch {
    rx: watch::Receiver<String>,
    delay: Duration,
    // pending burst; kept on self so a cancelled `settled` loses nothing
    deadline: Option<Instant>,
}

impl DebouncedSearch {
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Resolves with the final term of the next keystroke burst.
    ///
    /// Returns `None` once the [`SearchInput`] is dropped and nothing is pending.
    /// Cancel safe: dropping the future keeps the pending burst for the next call.
    pub async fn settled(&mut self) -> Option<String> {
        loop {
            match self.deadline {
                None => {
                    self.rx.changed().await.ok()?;
                    self.deadline = Some(Instant::now() + self.delay);
                }
                Some(deadline) => {
                    tokio::select! {
                        changed = self.rx.changed() => match changed {
                            Ok(()) => self.deadline = Some(Instant::now() + self.delay),
                            Err(_) => {
                                // input gone mid-burst: deliver what was typed
                                self.deadline = None;
                                return Some(self.rx.borrow().clone());
                            }
                        },
                        _ = sleep_until(deadline) => {
                            self.deadline = None;
                            return Some(self.rx.borrow_and_update().clone());
                        }
                    }
                }
            }
        }
    }
}
