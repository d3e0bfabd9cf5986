//! Alarm playback backends

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, error, warn};

use crate::AlertError;

/// Something that can sound (and silence) the alarm
pub trait AlarmSink: Send {
    /// Start playing the alarm; a call while already playing restarts it
    fn play(&mut self) -> Result<(), AlertError>;

    /// Silence any in-flight playback
    fn stop(&mut self) -> Result<(), AlertError>;
}

/// Sink that only writes the alarm to the log
#[derive(Debug, Default)]
pub struct LogAlarm {
    plays: u64,
}

impl LogAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alarms logged
    pub fn plays(&self) -> u64 {
        self.plays
    }
}

impl AlarmSink for LogAlarm {
    fn play(&mut self) -> Result<(), AlertError> {
        self.plays += 1;
        warn!("DROWSY!!! (alarm #{})", self.plays);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AlertError> {
        debug!("Alarm silenced");
        Ok(())
    }
}

enum PlayerCommand {
    Play,
    Stop,
    Terminate,
}

/// Plays a sound file on a dedicated player thread.
///
/// `play` and `stop` only enqueue a command and never block the caller.
pub struct SoundAlarm {
    sender: mpsc::Sender<PlayerCommand>,
    thread: Option<thread::JoinHandle<()>>,
    path: PathBuf,
}

impl SoundAlarm {
    /// Spawn the player for `path`. Fails if the sound file does not exist or
    /// the crate was built without the `audio` feature.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AlertError> {
        let path = path.into();
        if !path.is_file() {
            error!("Alarm sound not found at {}", path.display());
            return Err(AlertError::SoundMissing(path.display().to_string()));
        }
        Self::spawn(path)
    }

    #[cfg(feature = "audio")]
    fn spawn(path: PathBuf) -> Result<Self, AlertError> {
        let (sender, receiver) = mpsc::channel();
        let thread = {
            let path = path.clone();
            thread::Builder::new()
                .name("alarm-player".into())
                .spawn(move || player_loop(&path, receiver))
                .map_err(|e| AlertError::Playback(format!("failed to spawn player thread: {}", e)))?
        };

        tracing::info!("Alarm player ready with {}", path.display());
        Ok(Self {
            sender,
            thread: Some(thread),
            path,
        })
    }

    #[cfg(not(feature = "audio"))]
    fn spawn(path: PathBuf) -> Result<Self, AlertError> {
        error!("Cannot play {}: built without the `audio` feature", path.display());
        Err(AlertError::AudioUnavailable)
    }

    /// Sound file being played
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn send(&self, command: PlayerCommand) -> Result<(), AlertError> {
        self.sender.send(command).map_err(|_| AlertError::PlayerGone)
    }
}

impl AlarmSink for SoundAlarm {
    fn play(&mut self) -> Result<(), AlertError> {
        self.send(PlayerCommand::Play)
    }

    fn stop(&mut self) -> Result<(), AlertError> {
        self.send(PlayerCommand::Stop)
    }
}

impl Drop for SoundAlarm {
    fn drop(&mut self) {
        let _ = self.sender.send(PlayerCommand::Terminate);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Alarm player thread panicked");
            }
        }
    }
}

#[cfg(feature = "audio")]
fn player_loop(path: &Path, receiver: mpsc::Receiver<PlayerCommand>) {
    use std::fs::File;
    use std::io::BufReader;

    let (_stream, handle) = match rodio::OutputStream::try_default() {
        Ok(output) => output,
        Err(e) => {
            error!("No audio output device: {}", e);
            // keep draining so callers never block
            while let Ok(command) = receiver.recv() {
                if let PlayerCommand::Terminate = command {
                    break;
                }
                warn!("Alarm requested but audio output is unavailable");
            }
            return;
        }
    };

    let mut current: Option<rodio::Sink> = None;
    while let Ok(command) = receiver.recv() {
        match command {
            PlayerCommand::Play => {
                let source = File::open(path)
                    .map_err(|e| e.to_string())
                    .and_then(|file| rodio::Decoder::new(BufReader::new(file)).map_err(|e| e.to_string()));
                let sink = rodio::Sink::try_new(&handle).map_err(|e| e.to_string());

                match (source, sink) {
                    (Ok(source), Ok(sink)) => {
                        sink.append(source);
                        // dropping the previous sink restarts playback from the top
                        current = Some(sink);
                    }
                    (Err(e), _) | (_, Err(e)) => warn!("Alarm playback failed: {}", e),
                }
            }
            PlayerCommand::Stop => {
                if let Some(sink) = current.take() {
                    sink.stop();
                }
            }
            PlayerCommand::Terminate => break,
        }
    }
    debug!("Alarm player stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_alarm_counts() {
        let mut alarm = LogAlarm::new();
        alarm.play().unwrap();
        alarm.play().unwrap();
        alarm.stop().unwrap();
        assert_eq!(alarm.plays(), 2);
    }

    #[test]
    fn test_sound_alarm_requires_file() {
        let result = SoundAlarm::new("/nonexistent/alarm.wav");
        assert!(matches!(result, Err(AlertError::SoundMissing(_))));
    }

    #[cfg(not(feature = "audio"))]
    #[test]
    fn test_sound_alarm_needs_audio_support() {
        let path = std::env::temp_dir().join(format!("alarm-silent-{}.wav", std::process::id()));
        std::fs::write(&path, b"RIFF").unwrap();

        assert!(matches!(SoundAlarm::new(&path), Err(AlertError::AudioUnavailable)));
        let _ = std::fs::remove_file(&path);
    }

    #[cfg(feature = "audio")]
    #[test]
    fn test_sound_alarm_commands_do_not_block() {
        let path = std::env::temp_dir().join(format!("alarm-{}.wav", std::process::id()));
        std::fs::write(&path, b"RIFF").unwrap();

        let mut alarm = SoundAlarm::new(&path).unwrap();
        assert_eq!(alarm.path(), path.as_path());
        alarm.play().unwrap();
        alarm.play().unwrap();
        alarm.stop().unwrap();
        drop(alarm);

        let _ = std::fs::remove_file(&path);
    }
}
