use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::context::Context;
use crate::harness::error::HarnessError;
use crate::harness::process::print_diagnostic;

/// The harness's shared state (spec §3 "Subprocess Harness state"): the
/// rolling output buffer and the `regex -> completion signal` map, both
/// guarded by one mutex (spec §5 "Shared resources & locking").
#[derive(Default)]
pub(crate) struct HarnessInner {
    pub(crate) buffer: Vec<u8>,
    pending: Vec<PendingExpectation>,
}

pub(crate) struct PendingExpectation {
    regex: Regex,
    pub(crate) label: String,
    notify: Sender<()>,
}

impl HarnessInner {
    /// Re-checks every pending expectation against the current buffer.
    /// Invariant (spec §3): on a match at `[a, b)` the buffer is advanced
    /// past `b`, the signal is released exactly once, and the entry is
    /// removed.
    pub(crate) fn reevaluate(&mut self) {
        let mut matched_indices = Vec::new();
        for (i, expectation) in self.pending.iter().enumerate() {
            if let Some(end) = find_match_end(&self.buffer, &expectation.regex) {
                matched_indices.push((i, end));
            }
        }
        // Remove from the back so earlier indices stay valid.
        for (i, end) in matched_indices.into_iter().rev() {
            let expectation = self.pending.remove(i);
            self.buffer.drain(..end);
            let _ = expectation.notify.send(());
        }
    }
}

fn find_match_end(buffer: &[u8], regex: &Regex) -> Option<usize> {
    // Assumes the child emits valid UTF-8 text, as database server logs do;
    // a lone invalid byte sequence would throw off the byte offset below.
    let text = String::from_utf8_lossy(buffer);
    regex.find(&text).map(|m| m.end())
}

/// Registers `regex` against the shared buffer and blocks until it matches,
/// `cancel` is cancelled, or `deadline` elapses (spec §4.A `ExpectTimeout`).
pub(crate) fn expect_timeout(
    inner: &Arc<Mutex<HarnessInner>>,
    deadline: Duration,
    regex: Regex,
    label: &str,
    cancel: &Context<bool>,
) -> Result<(), HarnessError> {
    let (tx, rx) = mpsc::channel();
    let already_matched = {
        let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
        match find_match_end(&guard.buffer, &regex) {
            Some(end) => {
                guard.buffer.drain(..end);
                true
            }
            None => {
                guard.pending.push(PendingExpectation {
                    regex: regex.clone(),
                    label: label.to_string(),
                    notify: tx,
                });
                false
            }
        }
    };
    if already_matched {
        return Ok(());
    }

    const POLL_INTERVAL: Duration = Duration::from_millis(20);
    let deadline_instant = Instant::now() + deadline;
    loop {
        if rx.try_recv().is_ok() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            remove_pending(inner, &regex, label);
            return Ok(());
        }
        if Instant::now() >= deadline_instant {
            let buffered = {
                let guard = inner.lock().unwrap_or_else(|e| e.into_inner());
                String::from_utf8_lossy(&guard.buffer).into_owned()
            };
            remove_pending(inner, &regex, label);
            print_diagnostic(&format!(
                "Timeout while waiting for '{}' in {label}\n{buffered}",
                regex.as_str()
            ));
            return Err(HarnessError::ExpectTimeout {
                regex: regex.as_str().to_string(),
                label: label.to_string(),
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn remove_pending(inner: &Arc<Mutex<HarnessInner>>, regex: &Regex, label: &str) {
    let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
    guard
        .pending
        .retain(|p| !(p.regex.as_str() == regex.as_str() && p.label == label));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_match_consumes_buffer_up_to_end() {
        let inner = Arc::new(Mutex::new(HarnessInner::default()));
        inner.lock().unwrap().buffer = b"ready to serve\nextra".to_vec();

        let cancel = Context::new();
        let result = expect_timeout(
            &inner,
            Duration::from_secs(1),
            Regex::new("ready to serve").unwrap(),
            "test",
            &cancel,
        );
        assert!(result.is_ok());

        let remaining = inner.lock().unwrap().buffer.clone();
        assert_eq!(String::from_utf8(remaining).unwrap(), "\nextra");
    }

    #[test]
    fn later_chunk_satisfies_pending_expectation() {
        let inner = Arc::new(Mutex::new(HarnessInner::default()));
        let inner_writer = Arc::clone(&inner);

        let handle = std::thread::spawn(move || {
            expect_timeout(
                &inner_writer,
                Duration::from_secs(2),
                Regex::new("listening").unwrap(),
                "test",
                &Context::new(),
            )
        });

        std::thread::sleep(Duration::from_millis(50));
        {
            let mut guard = inner.lock().unwrap();
            guard.buffer.extend_from_slice(b"server listening on :8529");
            guard.reevaluate();
        }

        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn cancellation_returns_ok_without_match() {
        let inner = Arc::new(Mutex::new(HarnessInner::default()));
        let cancel: Context<bool> = Context::new();
        let cancel_setter = cancel.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            cancel_setter.cancel_all(true).unwrap();
        });

        let result = expect_timeout(
            &inner,
            Duration::from_secs(5),
            Regex::new("never").unwrap(),
            "test",
            &cancel,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn timeout_without_match_fails() {
        let inner = Arc::new(Mutex::new(HarnessInner::default()));
        let cancel = Context::new();

        let result = expect_timeout(
            &inner,
            Duration::from_millis(50),
            Regex::new("never").unwrap(),
            "test",
            &cancel,
        );
        assert!(matches!(result, Err(HarnessError::ExpectTimeout { .. })));
    }

    #[test]
    fn second_match_only_sees_bytes_after_first_match_end() {
        let inner = Arc::new(Mutex::new(HarnessInner::default()));
        inner.lock().unwrap().buffer = b"foo foo".to_vec();

        let cancel = Context::new();
        expect_timeout(
            &inner,
            Duration::from_secs(1),
            Regex::new("foo").unwrap(),
            "first",
            &cancel,
        )
        .unwrap();

        let remaining = String::from_utf8(inner.lock().unwrap().buffer.clone()).unwrap();
        assert_eq!(remaining, " foo");
    }
}
