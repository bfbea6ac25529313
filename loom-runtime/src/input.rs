use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const KEY_COUNT: usize = 256;

/// Mouse and keyboard state shared between the OS event thread (single writer)
/// and any number of backend readers (§5 "Shared mutable state": "Input state —
/// single-writer (OS event thread) multi-reader, guarded by a lock or atomics,
/// keys indexed modulo 256"). Every field is a plain atomic, so reads never block
/// a writer and vice versa.
pub struct InputState {
    mouse_x: AtomicU64,
    mouse_y: AtomicU64,
    keys: [AtomicBool; KEY_COUNT],
}

impl InputState {
    pub fn new() -> Self {
        Self {
            mouse_x: AtomicU64::new(0f64.to_bits()),
            mouse_y: AtomicU64::new(0f64.to_bits()),
            keys: std::array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    pub fn set_mouse(&self, x: f64, y: f64) {
        self.mouse_x.store(x.to_bits(), Ordering::Relaxed);
        self.mouse_y.store(y.to_bits(), Ordering::Relaxed);
    }

    pub fn mouse(&self) -> (f64, f64) {
        (f64::from_bits(self.mouse_x.load(Ordering::Relaxed)), f64::from_bits(self.mouse_y.load(Ordering::Relaxed)))
    }

    /// Sets key `code`'s down/up state. `code` wraps modulo [`KEY_COUNT`], so a
    /// caller never needs to bounds-check the keycodes its event source emits.
    pub fn set_key(&self, code: usize, down: bool) {
        self.keys[code % KEY_COUNT].store(down, Ordering::Relaxed);
    }

    pub fn key(&self, code: usize) -> bool {
        self.keys[code % KEY_COUNT].load(Ordering::Relaxed)
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_round_trips() {
        let input = InputState::new();
        input.set_mouse(12.5, -3.0);
        assert_eq!(input.mouse(), (12.5, -3.0));
    }

    #[test]
    fn key_codes_wrap_modulo_key_count() {
        let input = InputState::new();
        input.set_key(300, true);
        assert!(input.key(300 - KEY_COUNT));
        assert!(!input.key(1));
    }

    #[test]
    fn unset_key_defaults_to_up() {
        let input = InputState::new();
        assert!(!input.key(42));
    }
}
