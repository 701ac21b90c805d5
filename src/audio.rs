use std::time::Duration;

use rodio::source::SineWave;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

/// Synthesized feedback cues plus a looping background drone. Unavailable
/// audio output downgrades the whole system to silence.
pub struct AudioSystem {
    _stream: Option<OutputStream>,
    stream_handle: Option<OutputStreamHandle>,
    music: Option<Sink>,
}

impl AudioSystem {
    pub fn new() -> Self {
        match OutputStream::try_default() {
            Ok((stream, stream_handle)) => Self {
                _stream: Some(stream),
                stream_handle: Some(stream_handle),
                music: None,
            },
            Err(e) => {
                log::warn!("failed to initialize audio, continuing without: {e}");
                Self {
                    _stream: None,
                    stream_handle: None,
                    music: None,
                }
            }
        }
    }

    /// Start the looping background track; replaces any running one.
    pub fn start_music(&mut self) {
        self.stop_music();
        let Some(stream_handle) = &self.stream_handle else {
            return;
        };
        let Ok(sink) = Sink::try_new(stream_handle) else {
            log::warn!("failed to open an audio sink");
            return;
        };

        // A slow two-note pulse, looped from a short synthesized phrase.
        let low = SineWave::new(110.0)
            .take_duration(Duration::from_millis(600))
            .amplify(0.08);
        let high = SineWave::new(146.8)
            .take_duration(Duration::from_millis(600))
            .amplify(0.06);
        sink.append(low.mix(high).repeat_infinite());
        self.music = Some(sink);
    }

    pub fn stop_music(&mut self) {
        if let Some(sink) = self.music.take() {
            sink.stop();
        }
    }

    pub fn music_playing(&self) -> bool {
        self.music.is_some()
    }

    fn play_tone(&self, frequency: f32, duration: Duration, volume: f32) {
        let Some(stream_handle) = &self.stream_handle else {
            return;
        };
        let Ok(sink) = Sink::try_new(stream_handle) else {
            log::warn!("failed to open an audio sink");
            return;
        };

        let source = SineWave::new(frequency)
            .take_duration(duration)
            .amplify(volume)
            .fade_in(Duration::from_millis(5));
        sink.append(source);
        sink.detach();
    }

    /// Bright cue for collecting the diamond.
    pub fn play_pickup(&self) {
        self.play_tone(880.0, Duration::from_millis(120), 0.25);
        self.play_tone(1320.0, Duration::from_millis(160), 0.2);
    }

    /// Dull cue for taking a hit.
    pub fn play_hit(&self) {
        self.play_tone(160.0, Duration::from_millis(90), 0.3);
    }

    /// Low cue for the game ending.
    pub fn play_game_over(&self) {
        self.play_tone(110.0, Duration::from_millis(500), 0.3);
    }
}

impl Default for AudioSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn music_stops_cleanly_with_or_without_a_device() {
        let mut audio = AudioSystem::new();
        audio.start_music();
        audio.stop_music();
        assert!(!audio.music_playing());

        // Stopping twice is harmless.
        audio.stop_music();
        assert!(!audio.music_playing());
    }
}
