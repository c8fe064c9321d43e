//! Held-key input source.

use std::collections::HashSet;

/// Discrete key state, sampled once per frame.
pub trait InputState {
    fn is_held(&self, key: &str) -> bool;
}

/// Simple set-backed input state.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    held: HashSet<String>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: &str) {
        self.held.insert(key.to_lowercase());
    }

    pub fn release(&mut self, key: &str) {
        self.held.remove(&key.to_lowercase());
    }

    pub fn set(&mut self, key: &str, held: bool) {
        if held {
            self.press(key);
        } else {
            self.release(key);
        }
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }
}

impl InputState for KeyState {
    fn is_held(&self, key: &str) -> bool {
        self.held.contains(&key.to_lowercase())
    }
}

impl<I: InputState + ?Sized> InputState for &I {
    fn is_held(&self, key: &str) -> bool {
        (**self).is_held(key)
    }
}

/// -1, 0 or +1 from a pair of opposing keys.
pub fn axis(input: &impl InputState, negative: &str, positive: &str) -> f64 {
    let mut value = 0.0;
    if input.is_held(negative) {
        value -= 1.0;
    }
    if input.is_held(positive) {
        value += 1.0;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut keys = KeyState::new();
        keys.press("W");
        assert!(keys.is_held("w"));

        keys.set("w", false);
        assert!(!keys.is_held("W"));
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let mut keys = KeyState::new();
        keys.press("a");
        assert_eq!(axis(&keys, "a", "d"), -1.0);

        keys.press("d");
        assert_eq!(axis(&keys, "a", "d"), 0.0);
    }
}
