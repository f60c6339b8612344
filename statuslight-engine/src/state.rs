//! Device state, as seen by the LEDs
//!
//! The application owns the state; LEDs only read it when told it changed.

use std::sync::atomic::{AtomicBool, Ordering};

use atomic_enum::atomic_enum;
use serde::{Deserialize, Serialize};

/// Operating state of the device
#[atomic_enum]
#[derive(Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Starting,
    WifiConfiguring,
    Idle,
    Connecting,
    Listening,
    AudioTesting,
    Speaking,
    Upgrading,
    Activating,
    #[default]
    Unknown,
}

impl DeviceState {
    /// Every state, in the order the button cycles through them
    pub const ALL: [Self; 10] = [
        Self::Starting,
        Self::WifiConfiguring,
        Self::Idle,
        Self::Connecting,
        Self::Listening,
        Self::AudioTesting,
        Self::Speaking,
        Self::Upgrading,
        Self::Activating,
        Self::Unknown,
    ];

    /// The state after this one in [`Self::ALL`], wrapping around
    #[must_use]
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::WifiConfiguring => "wifi_configuring",
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::AudioTesting => "audio_testing",
            Self::Speaking => "speaking",
            Self::Upgrading => "upgrading",
            Self::Activating => "activating",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Source the LEDs pull the current state from
pub trait DeviceStatus: Send + Sync {
    fn device_state(&self) -> DeviceState;
    fn is_voice_detected(&self) -> bool;
}

/// Lock-free [`DeviceStatus`] shared between the application and its LED
pub struct AppStatus {
    state: AtomicDeviceState,
    voice_detected: AtomicBool,
}

impl AppStatus {
    #[must_use]
    pub fn new(state: DeviceState) -> Self {
        Self {
            state: AtomicDeviceState::new(state),
            voice_detected: AtomicBool::new(false),
        }
    }

    pub fn set_state(&self, state: DeviceState) {
        self.state.store(state, Ordering::Relaxed);
    }

    pub fn set_voice_detected(&self, detected: bool) {
        self.voice_detected.store(detected, Ordering::Relaxed);
    }

    /// Move to the next state and return it
    pub fn advance(&self) -> DeviceState {
        let next = self.device_state().next();
        self.set_state(next);
        next
    }
}

impl Default for AppStatus {
    fn default() -> Self {
        Self::new(DeviceState::Starting)
    }
}

impl DeviceStatus for AppStatus {
    fn device_state(&self) -> DeviceState {
        self.state.load(Ordering::Relaxed)
    }

    fn is_voice_detected(&self) -> bool {
        self.voice_detected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_cycles_through_all_states() {
        let mut state = DeviceState::Starting;
        for expected in DeviceState::ALL.iter().skip(1) {
            state = state.next();
            assert_eq!(state, *expected);
        }
        assert_eq!(state.next(), DeviceState::Starting);
    }

    #[test]
    fn test_app_status_stores_state_and_voice() {
        let status = AppStatus::default();
        assert_eq!(status.device_state(), DeviceState::Starting);
        assert!(!status.is_voice_detected());

        status.set_state(DeviceState::Listening);
        status.set_voice_detected(true);
        assert_eq!(status.device_state(), DeviceState::Listening);
        assert!(status.is_voice_detected());

        assert_eq!(status.advance(), DeviceState::AudioTesting);
        assert_eq!(status.device_state(), DeviceState::AudioTesting);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&DeviceState::WifiConfiguring).unwrap();
        assert_eq!(json, "\"wifi_configuring\"");
        assert_eq!(DeviceState::AudioTesting.to_string(), "audio_testing");
    }
}
