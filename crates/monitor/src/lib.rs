//! Drowsiness Monitor
//!
//! Wires capture, detection and alarm playback into the processing loop.

pub mod render;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use alerting::{AlarmConfig, AlarmDispatcher, AlarmSink, LogAlarm, SoundAlarm};
use anyhow::{Context, Result};
use camera_capture::{CaptureConfig, CaptureHandle, ImageSequenceSource};
use dms::{DmsConfig, DmsModule, FrameRenderer, RunSummary};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::render::{AnnotatingRenderer, LogRenderer};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "DROWSY";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dms: DmsConfig,
    pub alarm: AlarmConfig,
    pub capture: CaptureConfig,
    /// Write annotated frames here when set
    pub output_dir: Option<PathBuf>,
    /// Font for the status text on annotated frames; boxes only when unset
    pub overlay_font: Option<PathBuf>,
}

impl AppConfig {
    /// Defaults, then the optional TOML file, then `DROWSY_*` variables
    /// (`DROWSY_DMS__CLOSED_FRAME_THRESHOLD=6`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).context("invalid default configuration")?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| match path {
                Some(path) => format!("failed to load configuration from {}", path.display()),
                None => "failed to load configuration".to_string(),
            })?
            .try_deserialize::<AppConfig>()
            .context("invalid configuration")?;

        config.dms.validate()?;
        Ok(config)
    }

    /// Replace the alarm timing with a named preset, keeping everything else
    pub fn apply_profile(&mut self, name: &str) -> Result<()> {
        let preset = DmsConfig::preset(name)
            .with_context(|| format!("unknown profile '{}' (expected default, strict or lenient)", name))?;
        self.dms.closed_frame_threshold = preset.closed_frame_threshold;
        self.dms.alarm_repeat_interval = preset.alarm_repeat_interval;
        Ok(())
    }
}

/// Initialize logging. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;
    Ok(())
}

fn alarm_sink(config: &AlarmConfig) -> Result<Box<dyn AlarmSink>> {
    if !config.audible {
        info!("Audible alarm disabled; alarms are logged only");
        return Ok(Box::new(LogAlarm::new()));
    }
    let sound = SoundAlarm::new(&config.sound_path).context("failed to initialize alarm sound")?;
    Ok(Box::new(sound))
}

/// Build every component and run the processing loop until `stop` is set or
/// the frame source runs out. Any initialization failure is returned before
/// the first frame is read.
pub fn run_pipeline(config: AppConfig, stop: &AtomicBool) -> Result<RunSummary> {
    let dispatcher = AlarmDispatcher::new(config.alarm.clone(), alarm_sink(&config.alarm)?);
    let mut module =
        DmsModule::from_config(config.dms.clone(), dispatcher).context("failed to initialize drowsiness detector")?;

    let mut renderer: Box<dyn FrameRenderer> = match &config.output_dir {
        Some(dir) => {
            let renderer = AnnotatingRenderer::new(dir)?;
            match &config.overlay_font {
                Some(font) => Box::new(renderer.with_font(font)?),
                None => Box::new(renderer),
            }
        }
        None => Box::new(LogRenderer::new()),
    };

    let source = ImageSequenceSource::new(&config.capture.frames_dir, config.capture.looping);
    let mut capture = CaptureHandle::start(Box::new(source), config.capture.frame_interval())
        .with_context(|| format!("failed to open frames at {}", config.capture.frames_dir.display()))?;

    let summary = module.run(
        &mut capture,
        renderer.as_mut(),
        stop,
        Duration::from_millis(config.capture.read_timeout_ms),
    );
    capture.stop();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("monitor-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load_with_env(None, Some(HashMap::new())).unwrap();
        assert_eq!(config.dms.closed_frame_threshold, 10);
        assert_eq!(config.dms.alarm_repeat_interval, 20);
        assert_eq!(config.dms.working_width, 500);
        assert_eq!(config.alarm.sound_path, PathBuf::from("alarm.wav"));
        assert!(config.output_dir.is_none());
        assert!(config.overlay_font.is_none());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let dir = temp_dir("toml");
        let path = dir.join("monitor.toml");
        fs::write(
            &path,
            r#"
output_dir = "annotated"
overlay_font = "fonts/DejaVuSans.ttf"

[dms]
closed_frame_threshold = 7
bounds_policy = "skip"

[alarm]
audible = false

[capture]
frames_dir = "session-01"
fps = 30
"#,
        )
        .unwrap();

        let config = AppConfig::load_with_env(Some(&path), Some(HashMap::new())).unwrap();
        assert_eq!(config.dms.closed_frame_threshold, 7);
        assert_eq!(config.dms.alarm_repeat_interval, 20);
        assert_eq!(config.dms.bounds_policy, dms::BoundsPolicy::Skip);
        assert!(!config.alarm.audible);
        assert_eq!(config.capture.frames_dir, PathBuf::from("session-01"));
        assert_eq!(config.capture.fps, Some(30));
        assert_eq!(config.output_dir, Some(PathBuf::from("annotated")));
        assert_eq!(config.overlay_font, Some(PathBuf::from("fonts/DejaVuSans.ttf")));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let env = HashMap::from([
            ("DROWSY_DMS__ALARM_REPEAT_INTERVAL".to_string(), "25".to_string()),
            ("DROWSY_ALARM__STOP_ON_RECOVERY".to_string(), "false".to_string()),
        ]);
        let config = AppConfig::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.dms.alarm_repeat_interval, 25);
        assert!(!config.alarm.stop_on_recovery);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let env = HashMap::from([("DROWSY_DMS__CLOSED_FRAME_THRESHOLD".to_string(), "0".to_string())]);
        assert!(AppConfig::load_with_env(None, Some(env)).is_err());
        assert!(AppConfig::load_with_env(Some(Path::new("/nonexistent/monitor.toml")), Some(HashMap::new())).is_err());
    }

    #[test]
    fn test_apply_profile() {
        let mut config = AppConfig::default();
        config.dms.eye_model_path = "custom.onnx".into();

        config.apply_profile("strict").unwrap();
        assert_eq!(config.dms.closed_frame_threshold, 6);
        assert_eq!(config.dms.alarm_repeat_interval, 12);
        assert_eq!(config.dms.eye_model_path, PathBuf::from("custom.onnx"));

        assert!(config.apply_profile("sleepy").is_err());
    }

    #[test]
    fn test_run_pipeline_fails_fast_on_missing_models() {
        let mut config = AppConfig::default();
        config.alarm.audible = false;
        config.dms.landmark_model_path = "/nonexistent/shape.json".into();

        let stop = AtomicBool::new(false);
        let err = run_pipeline(config, &stop).unwrap_err();
        assert!(format!("{:#}", err).contains("Landmark model"));
    }

    #[cfg(not(feature = "audio"))]
    #[test]
    fn test_audible_alarm_needs_audio_build() {
        let dir = temp_dir("silent-build");
        let sound = dir.join("alarm.wav");
        fs::write(&sound, b"RIFF").unwrap();

        let mut config = AppConfig::default();
        config.alarm.sound_path = sound;
        let err = alarm_sink(&config.alarm).err().unwrap();
        assert!(format!("{:#}", err).contains("audio support"));

        config.alarm.audible = false;
        assert!(alarm_sink(&config.alarm).is_ok());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_alarm_sound_is_fatal_when_audible() {
        let mut config = AppConfig::default();
        config.alarm.sound_path = "/nonexistent/alarm.wav".into();

        let stop = AtomicBool::new(false);
        assert!(run_pipeline(config, &stop).is_err());
    }
}
