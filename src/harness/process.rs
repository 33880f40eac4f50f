use std::ffi::OsStr;
use std::io::{BufReader, Read, Write};
use std::marker::PhantomData;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use regex::Regex;

use crate::harness::error::HarnessError;
use crate::harness::expect::HarnessInner;

/// Chunk size the reader threads drain stdout/stderr in (spec §4.A: "in
/// chunks of ≤512 bytes").
const READ_CHUNK: usize = 512;

/// Serializes the diagnostic stream the harness prints to on an
/// `ExpectTimeout` failure (spec §5 "global diagnostic stream ... guarded
/// by a process-wide mutex").
static DIAGNOSTIC_LOCK: Mutex<()> = Mutex::new(());

pub(crate) fn print_diagnostic(message: &str) {
    let _guard = DIAGNOSTIC_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    eprintln!("{message}");
}

pub struct NotStarted;
pub struct Started;

/// The subprocess harness (spec §4.A): owns a child process, drains its
/// combined stdout+stderr into a shared buffer, and lets callers register
/// regex expectations against that buffer.
pub struct Harness<State = NotStarted> {
    cmd: Option<Command>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    pub(crate) inner: Arc<Mutex<HarnessInner>>,
    label: String,
    state: PhantomData<State>,
}

impl Harness<NotStarted> {
    pub fn new<I, S>(executable: S, args: I, label: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(executable);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        Self {
            cmd: Some(cmd),
            child: None,
            stdin: None,
            inner: Arc::new(Mutex::new(HarnessInner::default())),
            label: label.into(),
            state: PhantomData,
        }
    }

    /// Spawns the child and starts the two pipe-drain threads.
    pub fn start(self) -> Result<Harness<Started>, HarnessError> {
        self.start_with_sink(None)
    }

    /// Spawns the child, tee-ing every chunk read from stdout/stderr into
    /// `sink` in addition to the match buffer — used by the native process
    /// runner to persist a role's combined output to its log file while
    /// still allowing readiness expectations against the same stream.
    pub fn start_with_sink(
        mut self,
        sink: Option<Box<dyn Write + Send>>,
    ) -> Result<Harness<Started>, HarnessError> {
        let mut cmd = self.cmd.take().ok_or(HarnessError::AlreadyStarted)?;
        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().expect("stdout is piped");
        let stderr = child.stderr.take().expect("stderr is piped");
        let stdin = child.stdin.take();

        let sink = sink.map(|w| Arc::new(Mutex::new(w)));
        spawn_reader(stdout, Arc::clone(&self.inner), sink.clone());
        spawn_reader(stderr, Arc::clone(&self.inner), sink);

        Ok(Harness {
            cmd: None,
            child: Some(child),
            stdin,
            inner: self.inner,
            label: self.label,
            state: PhantomData,
        })
    }
}

impl Harness<Started> {
    pub fn pid(&self) -> u32 {
        self.child.as_ref().expect("started harness has a child").id()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn write_stdin(&mut self, data: &[u8]) -> Result<(), HarnessError> {
        let stdin = self.stdin.as_mut().ok_or(HarnessError::NotStarted)?;
        stdin.write_all(data)?;
        Ok(())
    }

    /// Blocks until the child exits, returning its exit code if available.
    pub fn wait(mut self) -> Result<Option<i32>, HarnessError> {
        let status = self
            .child
            .as_mut()
            .ok_or(HarnessError::NotStarted)?
            .wait()?;
        Ok(status.code())
    }

    pub fn try_wait(&mut self) -> Result<Option<i32>, HarnessError> {
        let status = self
            .child
            .as_mut()
            .ok_or(HarnessError::NotStarted)?
            .try_wait()?;
        Ok(status.and_then(|s| s.code()))
    }

    /// Registers `regex` and blocks until it matches, the caller cancels via
    /// `cancel`, or `deadline` elapses (spec §4.A `ExpectTimeout`).
    pub fn expect_timeout(
        &self,
        deadline: std::time::Duration,
        regex: Regex,
        label: &str,
        cancel: &crate::context::Context<bool>,
    ) -> Result<(), HarnessError> {
        crate::harness::expect::expect_timeout(&self.inner, deadline, regex, label, cancel)
    }

    fn signal(&self, signal: crate::harness::signal::HarnessSignal) -> Result<(), HarnessError> {
        crate::harness::signal::send(self.pid(), signal)
    }

    /// TERM, then wait for exit.
    pub fn close(mut self) -> Result<Option<i32>, HarnessError> {
        self.signal(crate::harness::signal::HarnessSignal::Close)?;
        self.wait()
    }

    /// KILL, then wait for exit.
    pub fn kill(mut self) -> Result<Option<i32>, HarnessError> {
        self.signal(crate::harness::signal::HarnessSignal::Kill)?;
        self.wait()
    }

    /// INT, no wait.
    pub fn send_intr(&self) -> Result<(), HarnessError> {
        self.signal(crate::harness::signal::HarnessSignal::SendIntr)
    }

    pub fn hup(&self) -> Result<(), HarnessError> {
        crate::harness::signal::send_hup(self.pid())
    }

    /// Waits up to `timeout` for the caller-supplied `exited` context to be
    /// cancelled (signaling exit detected elsewhere); sends TERM if the
    /// deadline elapses first (spec §4.A `WaitTimeout`).
    pub fn wait_timeout(
        &self,
        exited: &crate::context::Context<bool>,
        timeout: std::time::Duration,
    ) -> Result<bool, HarnessError> {
        crate::harness::signal::wait_timeout_then_close(self.pid(), exited, timeout)
    }
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    inner: Arc<Mutex<HarnessInner>>,
    sink: Option<Sink>,
) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(sink) = &sink {
                        let mut sink = sink.lock().unwrap_or_else(|e| e.into_inner());
                        let _ = sink.write_all(&chunk[..n]);
                        let _ = sink.flush();
                    }
                    let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
                    guard.buffer.extend_from_slice(&chunk[..n]);
                    guard.reevaluate();
                }
                Err(_) => break,
            }
        }
    });
}
