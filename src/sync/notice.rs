use std::fmt;

/// User-facing message raised by the engine. Each is acknowledged once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Offline; the current (cached) list stays on screen
    OfflineShowingCached,
    /// A first-page load failed and the cached snapshot was shown instead
    FailedShowingCached,
    /// A load failed with nothing to fall back to
    LoadFailed { message: String },
    /// A refresh was requested while offline
    CannotRefreshOffline,
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::OfflineShowingCached | Notice::CannotRefreshOffline => "Offline Mode",
            Notice::FailedShowingCached | Notice::LoadFailed { .. } => "Error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Notice::OfflineShowingCached => "You are currently offline. Showing cached news.",
            Notice::FailedShowingCached => "Failed to load latest news. Showing cached articles.",
            Notice::LoadFailed { message } => message,
            Notice::CannotRefreshOffline => {
                "Cannot refresh while offline. Please check your connection."
            }
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}
