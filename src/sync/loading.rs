/// Which kind of load is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingKind {
    /// First page, not user-initiated
    Initial,
    /// A page after the first
    LoadingMore,
    /// First page, user-initiated
    Refreshing,
}

impl LoadingKind {
    pub fn for_request(page: u32, is_refresh: bool) -> Self {
        match (page, is_refresh) {
            (0 | 1, true) => LoadingKind::Refreshing,
            (0 | 1, false) => LoadingKind::Initial,
            _ => LoadingKind::LoadingMore,
        }
    }
}

/// Mutually exclusive loading flags. `None` is idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingState {
    current: Option<LoadingKind>,
}

impl LoadingState {
    /// Enter `kind`. Fails without changing anything if already loading.
    pub fn start(&mut self, kind: LoadingKind) -> bool {
        if let Some(active) = self.current {
            tracing::debug!(active = ?active, requested = ?kind, "Load already in progress");
            return false;
        }
        self.current = Some(kind);
        true
    }

    pub fn finish(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<LoadingKind> {
        self.current
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_initial_loading(&self) -> bool {
        self.current == Some(LoadingKind::Initial)
    }

    pub fn is_loading_more(&self) -> bool {
        self.current == Some(LoadingKind::LoadingMore)
    }

    pub fn is_refreshing(&self) -> bool {
        self.current == Some(LoadingKind::Refreshing)
    }
}
