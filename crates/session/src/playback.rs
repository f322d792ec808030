use serde::{Deserialize, Serialize};

pub const MIN_RATE: f64 = 0.25;
pub const MAX_RATE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// Transport state. Positions are timeline seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playback {
    pub state: PlayState,
    pub position: f64,
    pub volume: f32,
    pub muted: bool,
    pub rate: f64,
}

impl Default for Playback {
    fn default() -> Self { Self { state: PlayState::Stopped, position: 0.0, volume: 1.0, muted: false, rate: 1.0 } }
}

impl Playback {
    /// Start playing; from the very end, playback restarts at zero.
    pub fn play(&mut self, duration: f64) {
        if self.position >= duration {
            self.position = 0.0;
        }
        self.state = PlayState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == PlayState::Playing {
            self.state = PlayState::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
        self.position = 0.0;
    }

    pub fn seek(&mut self, t: f64, duration: f64) -> f64 {
        self.position = if t.is_finite() { t.clamp(0.0, duration.max(0.0)) } else { 0.0 };
        self.position
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.volume
    }

    /// Output gain after mute.
    pub fn effective_volume(&self) -> f32 { if self.muted { 0.0 } else { self.volume } }

    /// Advance a playing transport by `elapsed` wall seconds. Reaching the
    /// end pauses on the last position.
    pub fn advance(&mut self, elapsed: f64, duration: f64) -> f64 {
        if self.state != PlayState::Playing || !elapsed.is_finite() || elapsed <= 0.0 {
            return self.position;
        }
        self.position += elapsed * self.rate;
        if self.position >= duration {
            self.position = duration.max(0.0);
            self.state = PlayState::Paused;
        }
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_and_volume_clamp() {
        let mut p = Playback::default();
        assert_eq!(p.seek(-3.0, 10.0), 0.0);
        assert_eq!(p.seek(42.0, 10.0), 10.0);
        assert_eq!(p.seek(f64::NAN, 10.0), 0.0);
        assert_eq!(p.set_volume(1.5), 1.0);
        assert_eq!(p.set_volume(-0.1), 0.0);
        p.set_volume(0.4);
        p.muted = true;
        assert_eq!(p.effective_volume(), 0.0);
    }

    #[test]
    fn playing_to_the_end_pauses() {
        let mut p = Playback { rate: 2.0, ..Playback::default() };
        p.play(5.0);
        assert_eq!(p.advance(1.0, 5.0), 2.0);
        assert_eq!(p.advance(10.0, 5.0), 5.0);
        assert_eq!(p.state, PlayState::Paused);
        p.play(5.0);
        assert_eq!(p.position, 0.0);
        p.stop();
        assert_eq!(p.state, PlayState::Stopped);
    }
}
