use std::{env, fmt, fs, path};

use logger::LogFormat;
use reachability::RunConfig;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("failed to write config: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub logging: Logging,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub format: LogFormat,
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self { format: LogFormat::Compact, level: "info".into() }
    }
}

impl Logging {
    /// Unparsable levels fall back to INFO
    pub fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/prober/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("prober/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        let run = &self.run;
        let checks = run.enabled_checks.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Run")?;
        write_1(f, "Checks", &checks)?;
        write_1(f, "Fast Mode", &run.fast_mode)?;
        write_1(f, "Always Check Fallbacks", &run.always_check_fallbacks)?;
        write_1(f, "Concurrency", &run.concurrency)?;
        write_1(f, "Interference Checks", &run.censorship_checks)?;
        write_title_2(f, "Timeouts (ms)")?;
        write_2(f, "Connect", &run.timeouts.connect_ms)?;
        write_2(f, "TLS", &run.timeouts.tls_ms)?;
        write_2(f, "Ping", &run.timeouts.ping_ms)?;
        write_2(f, "HTTP", &run.timeouts.http_ms)?;
        write_title_1(f, "Logging")?;
        write_1(f, "Format", &self.logging.format)?;
        write_1(f, "Level", &self.logging.level)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/prober/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(Error::WriteFailed)
    }
}

#[cfg(test)]
mod tests {
    use reachability::CheckKind;

    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/prober");

        let config = Config::from_config(Some(&path)).unwrap();

        assert_eq!(config, Config::default());
        assert!(dir.path().join("nested/prober.toml").exists());
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[run]\nfast_mode = true\nenabled_checks = [\"ping\", \"port-443\"]\n\n[run.timeouts]\nconnect_ms = 1500\n",
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();

        assert!(config.run.fast_mode);
        assert_eq!(config.run.enabled_checks, [CheckKind::Ping, CheckKind::Port443].into());
        assert_eq!(config.run.timeouts.connect_ms, 1500);
        assert_eq!(config.run.timeouts.tls_ms, 5000);
        assert_eq!(config.logging, Logging::default());
    }

    #[test]
    fn written_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.run.concurrency = 4;
        config.logging.format = LogFormat::Json;

        config.write_config(&path).unwrap();

        assert_eq!(Config::from_config(Some(&path)).unwrap(), config);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[run\n").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(_))));
    }

    #[test]
    fn display_lists_every_section() {
        let rendered = Config::default().to_string();
        assert!(rendered.starts_with("Current Internal Configuration State:"));
        assert!(rendered.contains("Timeouts (ms)"));
        assert!(rendered.contains("Format: compact"));
    }

    #[test]
    fn bad_level_falls_back_to_info() {
        let logging = Logging { level: "chatty".into(), ..Logging::default() };
        assert_eq!(logging.level_filter(), LevelFilter::INFO);
        let logging = Logging { level: "debug".into(), ..Logging::default() };
        assert_eq!(logging.level_filter(), LevelFilter::DEBUG);
    }
}
