/// Single-flight load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Loading,
}

/// Coalescing load scheduler.
///
/// At most one load runs at a time. Requests arriving while a load is in
/// flight set a pending flag, and the finishing load immediately starts one
/// follow-up. Every load gets a fresh token; results tagged with an older
/// token are stale.
#[derive(Debug, Default)]
pub struct SyncScheduler {
    state: SyncState,
    pending: bool,
    token: u64,
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == SyncState::Loading
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Token of the most recently started load.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.token
    }

    /// Ask for a load. Returns the new token if one should start now, or
    /// `None` if the request was folded into the in-flight load.
    pub fn request(&mut self) -> Option<u64> {
        if self.is_loading() {
            self.pending = true;
            tracing::debug!(token = self.token, "Sync already running, queued follow-up");
            return None;
        }
        self.state = SyncState::Loading;
        self.token = self.token.wrapping_add(1);
        Some(self.token)
    }

    /// Mark the load `token` finished. Returns the token of a follow-up load
    /// to start if requests arrived meanwhile.
    pub fn complete(&mut self, token: u64) -> Option<u64> {
        if !self.is_current(token) || !self.is_loading() {
            tracing::debug!(token, current = self.token, "Ignoring completion of stale load");
            return None;
        }
        self.state = SyncState::Idle;
        if std::mem::take(&mut self.pending) {
            return self.request();
        }
        None
    }

    /// Forget the in-flight load and any queued request.
    pub fn reset(&mut self) {
        self.state = SyncState::Idle;
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_starts_load() {
        let mut scheduler = SyncScheduler::new();
        assert_eq!(scheduler.request(), Some(1));
        assert!(scheduler.is_loading());
    }

    #[test]
    fn test_requests_while_loading_coalesce() {
        let mut scheduler = SyncScheduler::new();
        let token = scheduler.request().unwrap();
        assert_eq!(scheduler.request(), None);
        assert_eq!(scheduler.request(), None);
        assert!(scheduler.has_pending());

        let follow_up = scheduler.complete(token);
        assert_eq!(follow_up, Some(2));
        assert!(scheduler.is_loading());
        assert!(!scheduler.has_pending());

        assert_eq!(scheduler.complete(2), None);
        assert_eq!(scheduler.state(), SyncState::Idle);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut scheduler = SyncScheduler::new();
        scheduler.request();
        scheduler.complete(1);
        scheduler.request();
        assert_eq!(scheduler.complete(1), None);
        assert!(scheduler.is_loading());
        assert!(scheduler.is_current(2));
        assert!(!scheduler.is_current(1));
    }
}
