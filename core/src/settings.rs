//! Loading and saving controller `Settings` as YAML.

use std::path::Path;

use thiserror::Error;

use crate::types::config::Settings;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed settings: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Load settings from a YAML file.
pub fn load(path: &Path) -> Result<Settings, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse(&content)
}

/// Load settings from `path` when given, defaults otherwise.
pub fn load_or_default(path: Option<&Path>) -> Result<Settings, SettingsError> {
    match path {
        Some(p) => load(p),
        None => Ok(Settings::default()),
    }
}

pub fn save(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let content = serde_yaml::to_string(settings)?;
    std::fs::write(path, content).map_err(|source| SettingsError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Parse settings from YAML. Missing keys take their defaults; an empty
/// document yields the defaults.
pub fn parse(content: &str) -> Result<Settings, SettingsError> {
    let settings = if content.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str(content)?
    };
    validate(&settings)?;
    Ok(settings)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    if s.max_apply_attempts == 0 {
        return Err(SettingsError::Invalid {
            key: "max_apply_attempts",
            reason: "must be at least 1".into(),
        });
    }
    // a zero delay would requeue failing or pending ticks immediately
    if s.base_delay_ms == 0 {
        return Err(SettingsError::Invalid {
            key: "base_delay_ms",
            reason: "must be at least 1".into(),
        });
    }
    if s.poll_interval_ms == 0 {
        return Err(SettingsError::Invalid {
            key: "poll_interval_ms",
            reason: "must be at least 1".into(),
        });
    }
    if s.max_delay_ms < s.base_delay_ms {
        return Err(SettingsError::Invalid {
            key: "max_delay_ms",
            reason: format!(
                "{} is below base_delay_ms {}",
                s.max_delay_ms, s.base_delay_ms
            ),
        });
    }
    if s.status_path.trim().is_empty() {
        return Err(SettingsError::Invalid {
            key: "status_path",
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::BackoffStrategy;

    #[test]
    fn parse_empty_returns_defaults() {
        assert_eq!(parse("").unwrap(), Settings::default());
        assert_eq!(parse("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn parse_overrides() {
        let yaml = "poll_interval_ms: 250\nbackoff_strategy: fixed\n\
                    status_path: /var/lib/obs/status.json\n";
        let s = parse(yaml).unwrap();
        assert_eq!(s.poll_interval_ms, 250);
        assert_eq!(s.backoff_strategy, BackoffStrategy::Fixed);
        assert_eq!(s.status_path, "/var/lib/obs/status.json");
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = parse("max_apply_attempts: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_apply_attempts"));
    }

    #[test]
    fn zero_delays_rejected() {
        let err = parse("base_delay_ms: 0\n").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "base_delay_ms", .. }));
        let err = parse("poll_interval_ms: 0\n").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "poll_interval_ms", .. }));
        assert!(parse("base_delay_ms: 1\npoll_interval_ms: 1\n").is_ok());
    }

    #[test]
    fn max_delay_below_base_rejected() {
        let err = parse("base_delay_ms: 5000\nmax_delay_ms: 10\n").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "max_delay_ms", .. }));
    }

    #[test]
    fn unknown_backoff_rejected() {
        assert!(matches!(parse("backoff_strategy: random\n"), Err(SettingsError::Parse(_))));
    }

    #[test]
    fn load_nonexistent_file() {
        let result = load(Path::new("/nonexistent/settings.yaml"));
        assert!(matches!(result, Err(SettingsError::Read { .. })));
    }

    #[test]
    fn load_or_default_without_path() {
        assert_eq!(load_or_default(None).unwrap(), Settings::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");

        let mut s = Settings::default();
        s.max_retries = 42;
        s.backoff_strategy = BackoffStrategy::Linear;
        save(&path, &s).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, s);
    }
}
