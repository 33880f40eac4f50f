//! Upgrade Manager (spec §4.C, §9 Glossary "auto-upgrade latch"): a
//! one-shot per-role latch that lets an external upgrade orchestrator
//! arrange for a role's next start to carry `--database.auto-upgrade`, and
//! excuses the restart that follows from ordinary failure accounting.
//!
//! The orchestration logic that decides *when* to latch an upgrade is out
//! of scope (spec.md §1); only the latch contract `startServer`/`runServer`
//! consume is implemented here.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::cluster::ServerType;

/// The collaborator `startServer` and `runServer` consult before committing
/// to ordinary restart/failure semantics (spec §4.C steps 6 and 8, and the
/// run-loop's exit check). Mocked in tests via [`MockUpgradeManager`].
#[cfg_attr(test, mockall::automock)]
pub trait UpgradeManager: Send + Sync {
    /// Consumes (one-shot) whether `role`'s next start should carry
    /// `--database.auto-upgrade` (spec §4.C `startServer` step 6).
    fn take_auto_upgrade(&self, role: ServerType) -> bool;

    /// Notifies the manager that `role` consumed its auto-upgrade chance
    /// (spec §4.C `startServer` step 8).
    fn notify_upgrade_consumed(&self, role: ServerType);

    /// Consumes (one-shot) whether `role`'s most recent exit was an
    /// expected part of an in-progress upgrade rather than a failure
    /// (spec §4.C `runServer`: "treat the exit as expected and continue").
    fn upgrade_in_progress(&self, role: ServerType) -> bool;
}

/// A real one-shot latch, keyed per role. `latch` is the setter an external
/// upgrade orchestrator would call; nothing in this crate calls it yet,
/// since deciding when to upgrade is out of scope.
#[derive(Debug, Default)]
pub struct LatchingUpgradeManager {
    pending: Mutex<HashSet<ServerType>>,
    in_progress: Mutex<HashSet<ServerType>>,
}

impl LatchingUpgradeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arranges for `role`'s next start to carry `--database.auto-upgrade`.
    pub fn latch(&self, role: ServerType) {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(role);
    }
}

impl UpgradeManager for LatchingUpgradeManager {
    fn take_auto_upgrade(&self, role: ServerType) -> bool {
        let took = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&role);
        if took {
            self.in_progress.lock().unwrap_or_else(|e| e.into_inner()).insert(role);
        }
        took
    }

    fn notify_upgrade_consumed(&self, role: ServerType) {
        tracing::info!(role = %role, "auto-upgrade flag consumed for next start");
    }

    fn upgrade_in_progress(&self, role: ServerType) -> bool {
        self.in_progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&role)
    }
}
