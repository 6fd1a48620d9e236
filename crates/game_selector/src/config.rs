//! Run configuration: TOML file values, overridden by command-line flags,
//! with built-in defaults for everything optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectorError};
use crate::evaluator::EngineSettings;

/// Partially specified settings, as read from a config file or the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub input: Option<PathBuf>,
    pub good: Option<PathBuf>,
    pub bad: Option<PathBuf>,
    pub engine: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub hash_mb: Option<u32>,
    pub threads: Option<u32>,
    pub move_time_secs: Option<f64>,
    pub score_margin: Option<f64>,
    pub response_grace_secs: Option<f64>,
    pub max_engine_restarts: Option<u32>,
    pub show_progress: Option<bool>,
}

impl ConfigOverrides {
    /// Read a TOML config file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SelectorError::io(path, e))?;
        toml::from_str(&text).map_err(|source| SelectorError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Values set in `self` win; unset ones fall back to `base`.
    pub fn over(self, base: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            input: self.input.or(base.input),
            good: self.good.or(base.good),
            bad: self.bad.or(base.bad),
            engine: self.engine.or(base.engine),
            output_dir: self.output_dir.or(base.output_dir),
            hash_mb: self.hash_mb.or(base.hash_mb),
            threads: self.threads.or(base.threads),
            move_time_secs: self.move_time_secs.or(base.move_time_secs),
            score_margin: self.score_margin.or(base.score_margin),
            response_grace_secs: self.response_grace_secs.or(base.response_grace_secs),
            max_engine_restarts: self.max_engine_restarts.or(base.max_engine_restarts),
            show_progress: self.show_progress.or(base.show_progress),
        }
    }
}

/// Fully resolved settings for a selection run.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    pub input: PathBuf,
    pub good: PathBuf,
    pub bad: PathBuf,
    pub engine: PathBuf,
    pub output_dir: PathBuf,
    pub hash_mb: u32,
    pub threads: u32,
    pub move_time: Duration,
    /// Pawns by which an evaluation must corroborate an anomalous result.
    pub score_margin: f64,
    pub response_grace: Duration,
    pub max_engine_restarts: u32,
    pub show_progress: bool,
}

impl SelectorConfig {
    pub const DEFAULT_HASH_MB: u32 = 128;
    pub const DEFAULT_THREADS: u32 = 1;
    pub const DEFAULT_MOVE_TIME_SECS: f64 = 1.0;
    pub const DEFAULT_SCORE_MARGIN: f64 = 5.0;
    pub const DEFAULT_RESPONSE_GRACE_SECS: f64 = 10.0;
    pub const DEFAULT_MAX_ENGINE_RESTARTS: u32 = 1;

    /// Defaults for everything except the input and engine paths.
    pub fn new(
        input: impl Into<PathBuf>,
        engine: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            input: input.into(),
            good: output_dir.join("good.pgn"),
            bad: output_dir.join("bad.pgn"),
            engine: engine.into(),
            output_dir,
            hash_mb: Self::DEFAULT_HASH_MB,
            threads: Self::DEFAULT_THREADS,
            move_time: Duration::from_secs_f64(Self::DEFAULT_MOVE_TIME_SECS),
            score_margin: Self::DEFAULT_SCORE_MARGIN,
            response_grace: Duration::from_secs_f64(Self::DEFAULT_RESPONSE_GRACE_SECS),
            max_engine_restarts: Self::DEFAULT_MAX_ENGINE_RESTARTS,
            show_progress: true,
        }
    }

    /// Fill in defaults and check value ranges. Paths are not touched; see
    /// [`SelectorConfig::validate`].
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self> {
        let input = overrides
            .input
            .ok_or_else(|| SelectorError::config("no input PGN given"))?;
        let engine = overrides
            .engine
            .ok_or_else(|| SelectorError::config("no engine given"))?;
        let output_dir = overrides.output_dir.unwrap_or_else(|| PathBuf::from("."));

        let mut config = SelectorConfig::new(input, engine, output_dir);
        if let Some(good) = overrides.good {
            config.good = good;
        }
        if let Some(bad) = overrides.bad {
            config.bad = bad;
        }
        if let Some(hash_mb) = overrides.hash_mb {
            config.hash_mb = hash_mb;
        }
        if let Some(threads) = overrides.threads {
            config.threads = threads;
        }
        if let Some(secs) = overrides.move_time_secs {
            config.move_time = seconds("move time", secs)?;
        }
        if let Some(margin) = overrides.score_margin {
            config.score_margin = margin;
        }
        if let Some(secs) = overrides.response_grace_secs {
            config.response_grace = seconds("response grace", secs)?;
        }
        if let Some(restarts) = overrides.max_engine_restarts {
            config.max_engine_restarts = restarts;
        }
        if let Some(show) = overrides.show_progress {
            config.show_progress = show;
        }
        config.check_values()?;
        Ok(config)
    }

    fn check_values(&self) -> Result<()> {
        if self.hash_mb == 0 {
            return Err(SelectorError::config("hash size must be at least 1 MB"));
        }
        if self.threads == 0 {
            return Err(SelectorError::config("thread count must be at least 1"));
        }
        if self.move_time.is_zero() {
            return Err(SelectorError::config("move time must be positive"));
        }
        if !self.score_margin.is_finite() || self.score_margin < 0.0 {
            return Err(SelectorError::config(format!(
                "score margin must be a non-negative number of pawns, got {}",
                self.score_margin
            )));
        }
        if self.good == self.bad {
            return Err(SelectorError::config(
                "good and bad outputs must be different files",
            ));
        }
        if self.input == self.good || self.input == self.bad {
            return Err(SelectorError::config(format!(
                "input PGN {} is also an output file",
                self.input.display()
            )));
        }
        Ok(())
    }

    /// Full validation before any output is written: value ranges plus the
    /// existence of the input file and the engine binary.
    pub fn validate(&self) -> Result<()> {
        self.check_values()?;
        if !self.input.is_file() {
            return Err(SelectorError::config(format!(
                "input PGN {} does not exist",
                self.input.display()
            )));
        }
        if !self.engine.is_file() {
            return Err(SelectorError::config(format!(
                "engine {} does not exist",
                self.engine.display()
            )));
        }

        // Spellings can differ; compare where the paths actually lead.
        let input = resolved(&self.input);
        let good = resolved(&self.good);
        let bad = resolved(&self.bad);
        if good.is_some() && good == bad {
            return Err(SelectorError::config(
                "good and bad outputs must be different files",
            ));
        }
        if input.is_some() && (input == good || input == bad) {
            return Err(SelectorError::config(format!(
                "input PGN {} is also an output file",
                self.input.display()
            )));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::new(&self.engine, self.hash_mb, self.threads);
        settings.response_grace = self.response_grace;
        settings
    }
}

fn seconds(what: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        SelectorError::config(format!(
            "{what} must be a non-negative number of seconds, got {secs}"
        ))
    })
}

/// Canonical form of `path`. A file that does not exist yet resolves through
/// its parent directory; `None` when neither exists.
fn resolved(path: &Path) -> Option<PathBuf> {
    if let Ok(path) = fs::canonicalize(path) {
        return Some(path);
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Some(fs::canonicalize(parent).ok()?.join(path.file_name()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> ConfigOverrides {
        ConfigOverrides {
            input: Some("games.pgn".into()),
            engine: Some("stockfish".into()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = SelectorConfig::resolve(required()).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.good, Path::new(".").join("good.pgn"));
        assert_eq!(config.bad, Path::new(".").join("bad.pgn"));
        assert_eq!(config.hash_mb, 128);
        assert_eq!(config.threads, 1);
        assert_eq!(config.move_time, Duration::from_secs(1));
        assert_eq!(config.score_margin, 5.0);
        assert_eq!(config.response_grace, Duration::from_secs(10));
        assert_eq!(config.max_engine_restarts, 1);
        assert!(config.show_progress);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: ConfigOverrides = toml::from_str(
            r#"
            input = "from_file.pgn"
            engine = "sf"
            threads = 4
            score_margin = 3.5
            output_dir = "out"
            "#,
        )
        .unwrap();
        let cli = ConfigOverrides {
            threads: Some(2),
            move_time_secs: Some(0.25),
            ..ConfigOverrides::default()
        };
        let config = SelectorConfig::resolve(cli.over(file)).unwrap();
        assert_eq!(config.input, PathBuf::from("from_file.pgn"));
        assert_eq!(config.threads, 2);
        assert_eq!(config.score_margin, 3.5);
        assert_eq!(config.move_time, Duration::from_millis(250));
        assert_eq!(config.good, Path::new("out").join("good.pgn"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<ConfigOverrides>("hash = 64").is_err());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let cases = [
            ConfigOverrides { score_margin: Some(-1.0), ..required() },
            ConfigOverrides { score_margin: Some(f64::NAN), ..required() },
            ConfigOverrides { threads: Some(0), ..required() },
            ConfigOverrides { hash_mb: Some(0), ..required() },
            ConfigOverrides { move_time_secs: Some(0.0), ..required() },
            ConfigOverrides { move_time_secs: Some(-2.0), ..required() },
            ConfigOverrides {
                good: Some("same.pgn".into()),
                bad: Some("same.pgn".into()),
                ..required()
            },
            ConfigOverrides { good: Some("games.pgn".into()), ..required() },
            ConfigOverrides { bad: Some("games.pgn".into()), ..required() },
            ConfigOverrides { engine: None, ..required() },
        ];
        for overrides in cases {
            let err = SelectorConfig::resolve(overrides.clone()).unwrap_err();
            assert_eq!(err.stage(), "configuration", "{overrides:?}");
        }
    }

    #[test]
    fn test_validate_checks_paths() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("games.pgn");
        let engine = dir.path().join("engine");
        let config = SelectorConfig::new(&input, &engine, dir.path());
        assert_eq!(config.validate().unwrap_err().stage(), "configuration");

        std::fs::write(&input, "").unwrap();
        assert!(config.validate().is_err());
        std::fs::write(&engine, "").unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_input_reached_through_another_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("games.pgn");
        let engine = dir.path().join("engine");
        std::fs::write(&input, "").unwrap();
        std::fs::write(&engine, "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let detour = dir.path().join("sub").join("..").join("games.pgn");

        let mut config = SelectorConfig::new(&input, &engine, dir.path());
        config.good = detour.clone();
        let err = config.validate().unwrap_err();
        assert_eq!(err.stage(), "configuration");
        assert!(err.to_string().contains("also an output"), "{err}");

        let mut config = SelectorConfig::new(&input, &engine, dir.path());
        config.bad = detour;
        assert_eq!(config.validate().unwrap_err().stage(), "configuration");

        // Outputs that do not exist yet resolve through their directory.
        let mut config = SelectorConfig::new(&input, &engine, dir.path());
        config.good = dir.path().join("sub").join("..").join("bad.pgn");
        assert_eq!(config.validate().unwrap_err().stage(), "configuration");
    }
}
