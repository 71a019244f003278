//! Process-wide sync state and its transitions.

use std::fmt;

use serde::Serialize;

use crate::models::Collection;

/// Where the coordinator is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    SignedOut,
    SignedInReconciling,
    SignedInSynced,
    SignedInOffline,
}

/// Snapshot reported to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub authenticated: bool,
    pub connected: bool,
    pub syncing: bool,
}

impl SyncStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        if self.syncing {
            "Syncing..."
        } else if !self.authenticated {
            "Not signed in"
        } else if !self.connected {
            "Offline mode"
        } else {
            "Synced"
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of a change notification on the push path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// The write came from a remote snapshot
    Echo,
    /// Signed out, reconciling, or offline
    Skip,
    /// A push for the collection is running; one more will follow it
    Coalesced,
    Start,
}

/// Per-collection push bookkeeping plus session and connectivity flags.
///
/// Only the coordinator owns one; every change goes through a method here.
#[derive(Debug, Clone)]
pub struct SyncState {
    authenticated: bool,
    connected: bool,
    reconciling: bool,
    manual_operations: usize,
    in_flight: [bool; 3],
    pending: [bool; 3],
    suppress_next_push: [bool; 3],
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            authenticated: false,
            connected: true,
            reconciling: false,
            manual_operations: 0,
            in_flight: [false; 3],
            pending: [false; 3],
            suppress_next_push: [false; 3],
        }
    }
}

impl SyncState {
    pub const fn phase(&self) -> SyncPhase {
        if !self.authenticated {
            SyncPhase::SignedOut
        } else if self.reconciling {
            SyncPhase::SignedInReconciling
        } else if self.connected {
            SyncPhase::SignedInSynced
        } else {
            SyncPhase::SignedInOffline
        }
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            authenticated: self.authenticated,
            connected: self.connected,
            syncing: self.reconciling
                || self.manual_operations > 0
                || self.in_flight.iter().any(|flag| *flag),
        }
    }

    pub fn begin_reconciling(&mut self) {
        self.authenticated = true;
        self.reconciling = true;
    }

    pub fn finish_reconciling(&mut self) {
        self.reconciling = false;
    }

    pub fn sign_out(&mut self) {
        self.authenticated = false;
        self.reconciling = false;
        self.pending = [false; 3];
        self.suppress_next_push = [false; 3];
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            self.pending = [false; 3];
        }
    }

    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    pub const fn push_in_flight(&self, collection: Collection) -> bool {
        self.in_flight[collection.index()]
    }

    pub fn any_push_in_flight(&self) -> bool {
        self.in_flight.iter().any(|flag| *flag)
    }

    /// Mark the next local write to `collection` as remote-originated.
    pub fn suppress_next_push(&mut self, collection: Collection) {
        self.suppress_next_push[collection.index()] = true;
    }

    pub fn clear_suppression(&mut self, collection: Collection) {
        self.suppress_next_push[collection.index()] = false;
    }

    /// Decide what a change notification for `collection` does.
    ///
    /// Checked and set under one lock, so at most one push per collection runs.
    pub fn request_push(&mut self, collection: Collection) -> PushDecision {
        let index = collection.index();
        if self.suppress_next_push[index] {
            self.suppress_next_push[index] = false;
            return PushDecision::Echo;
        }
        if self.phase() != SyncPhase::SignedInSynced {
            return PushDecision::Skip;
        }
        if self.in_flight[index] {
            self.pending[index] = true;
            return PushDecision::Coalesced;
        }
        self.in_flight[index] = true;
        PushDecision::Start
    }

    /// Take the push slot of `collection` for a manual transfer.
    ///
    /// Returns `false` while another push holds it.
    pub fn try_claim(&mut self, collection: Collection) -> bool {
        let index = collection.index();
        if self.in_flight[index] {
            return false;
        }
        self.in_flight[index] = true;
        true
    }

    /// Called when a push for `collection` completes.
    ///
    /// Returns `true` when a coalesced change is waiting and the push slot is
    /// kept for it.
    pub fn finish_push(&mut self, collection: Collection) -> bool {
        let index = collection.index();
        let again = self.pending[index] && self.phase() == SyncPhase::SignedInSynced;
        self.pending[index] = false;
        self.in_flight[index] = again;
        again
    }

    pub fn begin_manual(&mut self) {
        self.manual_operations += 1;
    }

    pub fn finish_manual(&mut self) {
        self.manual_operations = self.manual_operations.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced() -> SyncState {
        let mut state = SyncState::default();
        state.begin_reconciling();
        state.finish_reconciling();
        state
    }

    #[test]
    fn phases_follow_flags() {
        let mut state = SyncState::default();
        assert_eq!(state.phase(), SyncPhase::SignedOut);

        state.begin_reconciling();
        assert_eq!(state.phase(), SyncPhase::SignedInReconciling);
        assert!(state.status().syncing);

        state.finish_reconciling();
        assert_eq!(state.phase(), SyncPhase::SignedInSynced);

        state.set_connected(false);
        assert_eq!(state.phase(), SyncPhase::SignedInOffline);

        state.sign_out();
        assert_eq!(state.phase(), SyncPhase::SignedOut);
    }

    #[test]
    fn status_labels() {
        let mut state = SyncState::default();
        assert_eq!(state.status().label(), "Not signed in");

        state = synced();
        assert_eq!(state.status().label(), "Synced");

        state.set_connected(false);
        assert_eq!(state.status().to_string(), "Offline mode");

        state.begin_manual();
        assert_eq!(state.status().label(), "Syncing...");
    }

    #[test]
    fn pushes_are_skipped_unless_synced() {
        let mut state = SyncState::default();
        assert_eq!(state.request_push(Collection::Dictionary), PushDecision::Skip);

        state.begin_reconciling();
        assert_eq!(state.request_push(Collection::Dictionary), PushDecision::Skip);

        state.finish_reconciling();
        state.set_connected(false);
        assert_eq!(state.request_push(Collection::Dictionary), PushDecision::Skip);
        assert!(!state.any_push_in_flight());
    }

    #[test]
    fn suppression_covers_exactly_one_write() {
        let mut state = synced();
        state.suppress_next_push(Collection::Phrases);

        assert_eq!(state.request_push(Collection::Phrases), PushDecision::Echo);
        assert_eq!(state.request_push(Collection::Phrases), PushDecision::Start);
    }

    #[test]
    fn in_flight_changes_coalesce_into_one_follow_up() {
        let mut state = synced();
        assert_eq!(state.request_push(Collection::Dictionary), PushDecision::Start);
        assert_eq!(
            state.request_push(Collection::Dictionary),
            PushDecision::Coalesced
        );
        assert_eq!(
            state.request_push(Collection::Dictionary),
            PushDecision::Coalesced
        );
        assert_eq!(
            state.request_push(Collection::Categories),
            PushDecision::Start
        );

        assert!(state.finish_push(Collection::Dictionary));
        assert!(state.push_in_flight(Collection::Dictionary));
        assert!(!state.finish_push(Collection::Dictionary));
        assert!(!state.push_in_flight(Collection::Dictionary));
    }

    #[test]
    fn manual_claim_waits_for_automatic_push() {
        let mut state = synced();
        assert_eq!(state.request_push(Collection::Categories), PushDecision::Start);
        assert!(!state.try_claim(Collection::Categories));
        assert!(state.try_claim(Collection::Phrases));

        assert!(!state.finish_push(Collection::Categories));
        assert!(state.try_claim(Collection::Categories));
        assert_eq!(
            state.request_push(Collection::Categories),
            PushDecision::Coalesced
        );
        assert!(state.finish_push(Collection::Categories));
    }

    #[test]
    fn going_offline_drops_follow_up_push() {
        let mut state = synced();
        state.request_push(Collection::Dictionary);
        state.request_push(Collection::Dictionary);

        state.set_connected(false);
        assert!(!state.finish_push(Collection::Dictionary));
        state.set_connected(true);
        assert!(!state.any_push_in_flight());
    }
}
