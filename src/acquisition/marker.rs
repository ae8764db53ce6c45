// src/acquisition/marker.rs

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::Marker;

/// Single shared label slot. The scheduler writes it, the acquisition loop
/// drains it once per tick. Every access holds the lock only for the slot
/// update itself.
#[derive(Debug, Default)]
pub struct MarkerRegister {
    slot: Mutex<Slot>,
}

#[derive(Debug, Default)]
struct Slot {
    label: Marker,
    overwrites: usize,
}

impl MarkerRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, label: Marker) {
        let replaced = {
            let mut slot = self.slot.lock();
            let replaced = slot.label;
            if !replaced.is_none() {
                slot.overwrites += 1;
            }
            slot.label = label;
            replaced
        };

        if !replaced.is_none() {
            warn!(
                replaced = replaced.code(),
                label = label.code(),
                "marker overwritten before acquisition drained it"
            );
        }
    }

    /// Returns the current label and resets the slot to `Marker::None` in one
    /// locked step.
    pub fn read_and_clear(&self) -> Marker {
        let mut slot = self.slot.lock();
        std::mem::take(&mut slot.label)
    }

    /// End-of-stimulus reset. A label still waiting for the acquisition loop
    /// stays in the slot so it fires exactly once.
    pub fn set_idle(&self) {
        let pending = self.slot.lock().label;
        if !pending.is_none() {
            debug!(
                label = pending.code(),
                "stimulus ended before its marker was drained"
            );
        }
    }

    pub fn peek(&self) -> Marker {
        self.slot.lock().label
    }

    /// Number of undrained labels replaced by a newer write.
    pub fn overwrites(&self) -> usize {
        self.slot.lock().overwrites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn read_and_clear_returns_label_then_none() {
        let register = MarkerRegister::new();
        register.set(Marker::Target);
        assert_eq!(register.read_and_clear(), Marker::Target);
        assert_eq!(register.read_and_clear(), Marker::None);
    }

    #[test]
    fn set_idle_keeps_an_undrained_label() {
        let register = MarkerRegister::new();
        register.set(Marker::NonTarget);
        register.set_idle();
        assert_eq!(register.peek(), Marker::NonTarget);
        assert_eq!(register.read_and_clear(), Marker::NonTarget);
        register.set_idle();
        assert_eq!(register.peek(), Marker::None);
    }

    #[test]
    fn overwriting_an_undrained_label_is_counted() {
        let register = MarkerRegister::new();
        register.set(Marker::NonTarget);
        register.set(Marker::Target);
        assert_eq!(register.overwrites(), 1);
        assert_eq!(register.read_and_clear(), Marker::Target);

        register.set(Marker::Target);
        register.read_and_clear();
        register.set(Marker::NonTarget);
        assert_eq!(register.overwrites(), 1);
    }

    #[test]
    fn concurrent_drains_observe_each_write_once() {
        let register = Arc::new(MarkerRegister::new());
        let writes = 500;

        let reader = {
            let register = Arc::clone(&register);
            thread::spawn(move || {
                let mut seen = 0;
                while seen < writes {
                    if register.read_and_clear() == Marker::Target {
                        seen += 1;
                    }
                }
                seen
            })
        };

        for _ in 0..writes {
            // wait for the previous write to be drained so none is overwritten
            while !register.peek().is_none() {
                thread::yield_now();
            }
            register.set(Marker::Target);
        }

        assert_eq!(reader.join().unwrap(), writes);
        assert_eq!(register.overwrites(), 0);
    }
}
