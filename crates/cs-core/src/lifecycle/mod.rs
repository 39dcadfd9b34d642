use serde::{Deserialize, Serialize};

/// Process-level initialization state.
///
/// Design principle: pure type state machine with transition validation only.
/// Memoization, timeouts and retries are handled by the supervisor in `cs-app`.
///
/// ```text
/// Uninitialized ──→ Initializing ──→ Ready
///        ↑                │
///        └────(failure)───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

impl LifecycleState {
    /// Begin initialization. Only valid from `Uninitialized`.
    pub fn start(self) -> Option<Self> {
        match self {
            Self::Uninitialized => Some(Self::Initializing),
            _ => None,
        }
    }

    /// Transition after an initialization attempt finishes.
    pub fn on_initialized(self, success: bool) -> Self {
        match self {
            Self::Initializing if success => Self::Ready,
            Self::Initializing => Self::Uninitialized,
            _ => self,
        }
    }

    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// Per-login subflow.
///
/// ```text
/// LoggedOut ──→ LoggingIn ──→ LoggedIn
///     ↑             │             │
///     └──(failure)──┘             │
///     └───────(signed out)────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoginState {
    #[default]
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

impl LoginState {
    /// Enter the login subflow. Returns `None` when a login is already in
    /// flight, so duplicate concurrent entries collapse.
    pub fn begin_login(self) -> Option<Self> {
        match self {
            Self::LoggedOut | Self::LoggedIn => Some(Self::LoggingIn),
            Self::LoggingIn => None,
        }
    }

    pub fn on_login_finished(self, success: bool) -> Self {
        match self {
            Self::LoggingIn if success => Self::LoggedIn,
            Self::LoggingIn => Self::LoggedOut,
            _ => self,
        }
    }

    pub fn sign_out(self) -> Self {
        Self::LoggedOut
    }

    pub fn is_logged_in(self) -> bool {
        self == Self::LoggedIn
    }
}
