//! Active Effect Stack
//!
//! The active-effect stack records which effect is currently executing, so
//! that a tracked read knows whom to subscribe. Only the top entry matters:
//! an effect that runs another effect (or reads a computed, which runs its own
//! effect) pushes a new frame, and the outer effect becomes current again when
//! that frame is popped.
//!
//! A frame may also be empty (`None`), which is how
//! [`Runtime::untracked`](crate::Runtime::untracked) suspends tracking.
//!
//! # Implementation
//!
//! The stack belongs to a runtime, not to the thread. Frames are pushed by
//! [`ActiveFrame::enter`] and popped when the returned guard drops, so the
//! stack stays balanced even if the effect body panics.

use parking_lot::Mutex;

use super::EffectId;

/// The per-runtime stack of executing effects.
#[derive(Default)]
pub(crate) struct EffectStack {
    frames: Mutex<Vec<Option<EffectId>>>,
}

impl EffectStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// The innermost executing effect, if tracking is active.
    pub fn current(&self) -> Option<EffectId> {
        self.frames.lock().last().copied().flatten()
    }

    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Whether `effect` is anywhere on the stack.
    pub fn contains(&self, effect: EffectId) -> bool {
        self.frames.lock().contains(&Some(effect))
    }
}

/// Guard that pops its frame when dropped.
pub(crate) struct ActiveFrame<'a> {
    stack: &'a EffectStack,
    frame: Option<EffectId>,
}

impl<'a> ActiveFrame<'a> {
    /// Push a frame. `None` suspends tracking until the guard drops.
    pub fn enter(stack: &'a EffectStack, frame: Option<EffectId>) -> Self {
        stack.frames.lock().push(frame);
        Self { stack, frame }
    }
}

impl Drop for ActiveFrame<'_> {
    fn drop(&mut self) {
        let popped = self.stack.frames.lock().pop();

        // Frames must nest; a mismatch means a guard escaped its scope.
        debug_assert_eq!(
            popped,
            Some(self.frame),
            "active effect stack mismatch: expected {:?}, got {:?}",
            self.frame,
            popped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tracks_effect() {
        let stack = EffectStack::new();
        let id = EffectId::new();

        assert!(stack.current().is_none());

        {
            let _frame = ActiveFrame::enter(&stack, Some(id));
            assert_eq!(stack.current(), Some(id));
            assert!(stack.contains(id));
        }

        // Stack should be cleaned up after drop
        assert!(stack.current().is_none());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn nested_frames() {
        let stack = EffectStack::new();
        let outer = EffectId::new();
        let inner = EffectId::new();

        {
            let _outer = ActiveFrame::enter(&stack, Some(outer));
            assert_eq!(stack.current(), Some(outer));

            {
                let _inner = ActiveFrame::enter(&stack, Some(inner));
                assert_eq!(stack.current(), Some(inner));
            }

            // After inner frame drops, outer should be current
            assert_eq!(stack.current(), Some(outer));
        }

        assert!(stack.current().is_none());
    }

    #[test]
    fn empty_frame_suspends_tracking() {
        let stack = EffectStack::new();
        let outer = EffectId::new();

        let _outer = ActiveFrame::enter(&stack, Some(outer));
        {
            let _paused = ActiveFrame::enter(&stack, None);
            assert!(stack.current().is_none());
        }
        assert_eq!(stack.current(), Some(outer));
    }

    #[test]
    fn frame_pops_on_panic() {
        let stack = EffectStack::new();
        let id = EffectId::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _frame = ActiveFrame::enter(&stack, Some(id));
            panic!("effect body failed");
        }));

        assert!(result.is_err());
        assert_eq!(stack.depth(), 0);
    }
}
