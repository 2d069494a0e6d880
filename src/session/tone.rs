//! Audible feedback, injected into the session.
//!
//! Implementations must return immediately: the tick is played while the
//! board lock is held.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Short blip on every feedback-loop tick.
    Tick,
    /// Long beep when an attempt fails.
    Failure,
}

impl Tone {
    pub fn duration(self) -> Duration {
        match self {
            Tone::Tick => Duration::from_millis(30),
            Tone::Failure => Duration::from_millis(1000),
        }
    }

    /// Pitch: the high tone of DTMF "0" for ticks, a plain beep for failures.
    pub fn frequency_hz(self) -> f32 {
        match self {
            Tone::Tick => 1336.0,
            Tone::Failure => 880.0,
        }
    }
}

pub trait ToneSink: Send + Sync {
    fn play(&self, tone: Tone);
}

/// Plays nothing.
pub struct SilentTone;

impl ToneSink for SilentTone {
    fn play(&self, _tone: Tone) {}
}

/// Writes tones to the log instead of a speaker (headless runs).
pub struct LogTone;

impl ToneSink for LogTone {
    fn play(&self, tone: Tone) {
        match tone {
            Tone::Tick => log::trace!("[TONE] tick"),
            Tone::Failure => log::info!("[TONE] failure beep"),
        }
    }
}

#[cfg(feature = "audio")]
pub use speaker::SpeakerTone;

#[cfg(feature = "audio")]
mod speaker {
    use super::{Tone, ToneSink};
    use rodio::source::{SineWave, Source};
    use rodio::{OutputStream, Sink};
    use std::sync::mpsc::{self, Sender};
    use std::sync::Mutex;
    use std::thread;

    /// Plays tones on the default output device.
    ///
    /// rodio's output stream is not `Send`, so it lives on a dedicated
    /// thread fed through a channel.
    pub struct SpeakerTone {
        tx: Mutex<Sender<Tone>>,
    }

    impl SpeakerTone {
        pub fn new() -> Result<Self, String> {
            let (tx, rx) = mpsc::channel::<Tone>();
            thread::Builder::new()
                .name("scouter-tone".to_string())
                .spawn(move || {
                    let (_stream, handle) = match OutputStream::try_default() {
                        Ok(pair) => pair,
                        Err(e) => {
                            log::error!("[TONE] No audio output: {}", e);
                            return;
                        }
                    };
                    while let Ok(tone) = rx.recv() {
                        let sink = match Sink::try_new(&handle) {
                            Ok(s) => s,
                            Err(e) => {
                                log::warn!("[TONE] Sink failed: {}", e);
                                continue;
                            }
                        };
                        sink.append(
                            SineWave::new(tone.frequency_hz())
                                .take_duration(tone.duration())
                                .amplify(0.25),
                        );
                        sink.detach();
                    }
                })
                .map_err(|e| format!("Failed to spawn tone thread: {}", e))?;
            Ok(Self { tx: Mutex::new(tx) })
        }
    }

    impl ToneSink for SpeakerTone {
        fn play(&self, tone: Tone) {
            if let Ok(tx) = self.tx.lock() {
                let _ = tx.send(tone);
            }
        }
    }
}
