use std::sync::Mutex;

use crate::runner::ProcessHandle;

/// A lightweight, read-only snapshot of a role's currently-live process,
/// published by the thread that owns it (spec §3 "Supervisor slot"). The
/// owning thread keeps the actual `Box<dyn ProcessHandle>` to itself so it
/// alone ever calls `wait`/`terminate`/`kill` on it; termination requested
/// from elsewhere goes through the process id directly (see
/// `supervisor::terminator`), not through this snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub process_id: u32,
    pub container_id: Option<String>,
    pub container_ip: Option<String>,
}

impl SlotInfo {
    pub fn from_handle(handle: &dyn ProcessHandle) -> Self {
        Self {
            process_id: handle.process_id(),
            container_id: handle.container_id(),
            container_ip: handle.container_ip(),
        }
    }
}

#[derive(Default)]
pub struct Slot {
    info: Mutex<Option<SlotInfo>>,
}

impl Slot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, info: SlotInfo) {
        *self.info.lock().unwrap_or_else(|e| e.into_inner()) = Some(info);
    }

    pub fn clear(&self) {
        *self.info.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_live(&self) -> bool {
        self.info.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn snapshot(&self) -> Option<SlotInfo> {
        self.info.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.snapshot().map(|s| s.process_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_is_not_live() {
        let slot = Slot::new();
        assert!(!slot.is_live());
        assert_eq!(slot.process_id(), None);
    }

    #[test]
    fn set_then_clear_round_trips() {
        let slot = Slot::new();
        slot.set(SlotInfo {
            process_id: 42,
            container_id: None,
            container_ip: None,
        });
        assert!(slot.is_live());
        assert_eq!(slot.process_id(), Some(42));

        slot.clear();
        assert!(!slot.is_live());
    }
}
