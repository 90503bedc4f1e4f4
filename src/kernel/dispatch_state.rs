// Copyright (c) 2025 - Cowboy AI, LLC.

//! The kernel's own lifecycle state machine (section 4.4.3).
//!
//! `Handling` rejects re-entrant dispatch — the actor's single-reader
//! mailbox is what keeps the kernel from ever observing two `handle` calls
//! in flight, but the state machine makes the invariant checkable on its
//! own (useful in tests that drive the kernel directly, bypassing an actor).

/// States: `Created -> Activating -> Active <-> Handling -> Deactivating -> Deactivated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Created,
    Activating,
    Active,
    Handling,
    Deactivating,
    Deactivated,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchState::Deactivated)
    }

    /// Whether `handle` may be invoked right now.
    pub fn can_handle(&self) -> bool {
        matches!(self, DispatchState::Active)
    }

    pub fn can_transition_to(&self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Created, Activating)
                | (Activating, Active)
                | (Active, Handling)
                | (Handling, Active)
                | (Active, Deactivating)
                | (Handling, Deactivating)
                | (Deactivating, Deactivated)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DispatchState::*;

    #[test]
    fn created_can_only_move_to_activating() {
        assert!(Created.can_transition_to(Activating));
        assert!(!Created.can_transition_to(Active));
    }

    #[test]
    fn handling_can_return_to_active_or_proceed_to_deactivating() {
        assert!(Handling.can_transition_to(Active));
        assert!(Handling.can_transition_to(Deactivating));
        assert!(!Handling.can_transition_to(Handling));
    }

    #[test]
    fn deactivated_is_terminal() {
        assert!(Deactivated.is_terminal());
        assert!(!Deactivated.can_transition_to(Active));
    }
}
