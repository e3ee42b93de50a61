use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::reconcile::CommandKind;

/// Commands in flight, per media item. Items never block each other.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    pending: Arc<Mutex<HashMap<i64, CommandKind>>>,
}

/// Held for the duration of a command; dropping it frees the item.
#[derive(Debug)]
pub struct Ticket {
    pending: Arc<Mutex<HashMap<i64, CommandKind>>>,
    external_id: i64,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `external_id` for `kind`, or returns the command already pending.
    pub fn try_begin(&self, external_id: i64, kind: CommandKind) -> Result<Ticket, CommandKind> {
        let mut pending = lock(&self.pending);
        if let Some(current) = pending.get(&external_id) {
            return Err(*current);
        }
        pending.insert(external_id, kind);
        Ok(Ticket {
            pending: Arc::clone(&self.pending),
            external_id,
        })
    }

    pub fn pending(&self, external_id: i64) -> Option<CommandKind> {
        lock(&self.pending).get(&external_id).copied()
    }

    pub fn is_idle(&self) -> bool {
        lock(&self.pending).is_empty()
    }
}

impl Ticket {
    pub fn external_id(&self) -> i64 {
        self.external_id
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.external_id);
    }
}

// The map holds plain data, so a poisoned lock is still consistent.
fn lock(map: &Mutex<HashMap<i64, CommandKind>>) -> MutexGuard<'_, HashMap<i64, CommandKind>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_command_on_same_item_is_refused() {
        let guard = InFlight::new();
        let ticket = guard.try_begin(501, CommandKind::Link).unwrap();
        assert_eq!(
            guard.try_begin(501, CommandKind::Archive).unwrap_err(),
            CommandKind::Link
        );
        assert_eq!(guard.pending(501), Some(CommandKind::Link));
        drop(ticket);
        assert_eq!(guard.pending(501), None);
        assert!(guard.try_begin(501, CommandKind::Archive).is_ok());
    }

    #[test]
    fn other_items_are_not_blocked() {
        let guard = InFlight::new();
        let _a = guard.try_begin(501, CommandKind::Unlink).unwrap();
        let b = guard.try_begin(502, CommandKind::Unlink).unwrap();
        assert_eq!(b.external_id(), 502);
        assert!(!guard.is_idle());
    }
}
