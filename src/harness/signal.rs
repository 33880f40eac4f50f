use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::context::Context;
use crate::harness::error::HarnessError;

/// The signals the harness can deliver to a running child (spec §4.A
/// "Signals").
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HarnessSignal {
    /// TERM, then wait for exit.
    Close,
    /// KILL, then wait for exit.
    Kill,
    /// INT, fire-and-forget.
    SendIntr,
}

pub(crate) fn send(pid: u32, signal: HarnessSignal) -> Result<(), HarnessError> {
    let nix_signal = match signal {
        HarnessSignal::Close => Signal::SIGTERM,
        HarnessSignal::Kill => Signal::SIGKILL,
        HarnessSignal::SendIntr => Signal::SIGINT,
    };
    signal::kill(Pid::from_raw(pid as i32), nix_signal)?;
    Ok(())
}

pub(crate) fn send_hup(pid: u32) -> Result<(), HarnessError> {
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGHUP)?;
    Ok(())
}

/// Waits on `exited` for up to `timeout`; if the deadline elapses first,
/// sends TERM to `pid` as a watchdog escalation (spec §4.A `WaitTimeout`).
pub(crate) fn wait_timeout_then_close(
    pid: u32,
    exited: &Context<bool>,
    timeout: Duration,
) -> Result<bool, HarnessError> {
    if exited.wait_timeout(timeout) {
        return Ok(true);
    }
    send(pid, HarnessSignal::Close)?;
    Ok(false)
}
