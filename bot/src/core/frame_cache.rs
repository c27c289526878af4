// tactical_bot_core/bot/src/core/frame_cache.rs

/// A value that is computed lazily at most once per tick.
///
/// The owner passes the current tick on every access.
#[derive(Debug, Clone, Default)]
pub struct FrameCached<T> {
    computed_at: Option<u64>,
    value: Option<T>,
}

impl<T> FrameCached<T> {
    pub const fn new() -> Self {
        FrameCached { computed_at: None, value: None }
    }

    pub fn get_or_compute(&mut self, tick: u64, compute: impl FnOnce() -> T) -> &T {
        if self.computed_at != Some(tick) {
            self.value = None;
            self.computed_at = Some(tick);
        }
        self.value.get_or_insert_with(compute)
    }

    pub fn get_or_compute_mut(&mut self, tick: u64, compute: impl FnOnce() -> T) -> &mut T {
        if self.computed_at != Some(tick) {
            self.value = None;
            self.computed_at = Some(tick);
        }
        self.value.get_or_insert_with(compute)
    }

    pub fn peek(&self, tick: u64) -> Option<&T> {
        if self.computed_at == Some(tick) {
            self.value.as_ref()
        } else {
            None
        }
    }

    pub fn invalidate(&mut self) {
        self.computed_at = None;
        self.value = None;
    }

    pub fn is_valid_for(&self, tick: u64) -> bool {
        self.computed_at == Some(tick)
    }
}
