//! Profile lifecycle state

use std::fmt;

/// Result of asking the runtime whether a profile's instance is up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Running,
    Stopped,
    Unknown,
}

impl RuntimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// State machine for profile lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    Absent,
    /// Directory exists but first-run setup has not completed
    Initializing,
    Stopped,
    Running,
}

impl ProfileState {
    /// Derive the state from what is on disk and what the runtime reports
    pub fn derive(exists: bool, setup_complete: bool, status: RuntimeStatus) -> Self {
        match (exists, status) {
            (false, _) => Self::Absent,
            (true, RuntimeStatus::Running) => Self::Running,
            (true, _) if !setup_complete => Self::Initializing,
            (true, _) => Self::Stopped,
        }
    }
}

/// Lifecycle events for profile state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileEvent {
    Create,
    Start,
    Stop,
    Destroy,
}

impl ProfileEvent {
    /// Check if a state transition is valid
    pub fn is_valid_transition(from: ProfileState, event: ProfileEvent) -> bool {
        matches!(
            (from, event),
            (ProfileState::Absent, ProfileEvent::Create)
                | (ProfileState::Initializing, ProfileEvent::Start)
                | (ProfileState::Initializing, ProfileEvent::Destroy)
                | (ProfileState::Stopped, ProfileEvent::Start)
                | (ProfileState::Stopped, ProfileEvent::Destroy)
                | (ProfileState::Running, ProfileEvent::Stop)
        )
    }

    /// Apply event to get new state
    pub fn apply(from: ProfileState, event: ProfileEvent) -> Option<ProfileState> {
        if !Self::is_valid_transition(from, event) {
            return None;
        }

        match event {
            ProfileEvent::Create => Some(ProfileState::Initializing),
            ProfileEvent::Start => Some(ProfileState::Running),
            ProfileEvent::Stop => Some(ProfileState::Stopped),
            ProfileEvent::Destroy => Some(ProfileState::Absent),
        }
    }
}
