//! Audio control state.
//!
//! Deafening zeroes the output volume and remembers the previous level;
//! undeafening restores whatever was remembered, including a level set
//! while deafened.
use serde::{Deserialize, Serialize};

/// Volumes are percentages.
pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioState {
    pub muted: bool,
    pub deafened: bool,
    pub volume: u8,
    pub previous_volume: u8,
    pub input_volume: u8,
}

impl Default for AudioState {
    fn default() -> Self {
        Self {
            muted: false,
            deafened: false,
            volume: MAX_VOLUME,
            previous_volume: MAX_VOLUME,
            input_volume: MAX_VOLUME,
        }
    }
}

/// One UI action on the audio state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AudioAction {
    Mute,
    Deafen,
    SetVolume(u8),
    SetInputVolume(u8),
}

impl AudioState {
    pub fn apply(&mut self, action: AudioAction) {
        match action {
            AudioAction::Mute => self.mute(),
            AudioAction::Deafen => self.deafen(),
            AudioAction::SetVolume(v) => self.set_volume(v),
            AudioAction::SetInputVolume(v) => self.set_input_volume(v),
        }
    }

    /// Toggle the microphone.
    pub fn mute(&mut self) {
        self.muted = !self.muted;
    }

    /// Toggle output.
    pub fn deafen(&mut self) {
        if self.deafened {
            self.volume = self.previous_volume;
        } else {
            self.previous_volume = self.volume;
            self.volume = 0;
        }
        self.deafened = !self.deafened;
    }

    /// Set the output level. Values above [`MAX_VOLUME`] are clamped.
    pub fn set_volume(&mut self, volume: u8) {
        let volume = volume.min(MAX_VOLUME);
        self.previous_volume = volume;
        self.volume = volume;
    }

    pub fn set_input_volume(&mut self, volume: u8) {
        self.input_volume = volume.min(MAX_VOLUME);
    }
}
