//! Command-line arguments.

use clap::{Parser, ValueEnum};

use dashlink_core::config::{AppConfig, LogFormat};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per line
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Pretty => LogFormat::Pretty,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

/// Follow a dashboard live-update channel and print its messages
#[derive(Debug, Parser)]
#[command(name = "dashlink", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/dashlink.toml")]
    pub config: String,

    /// Bearer token for the channel endpoint
    #[arg(short, long, env = "DASHLINK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Endpoint host and port, overriding the configuration
    #[arg(long)]
    pub host: Option<String>,

    /// Use wss instead of ws
    #[arg(long)]
    pub secure: bool,

    /// Log format, overriding the configuration
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.endpoint.host = host.clone();
        }
        if self.secure {
            config.endpoint.secure = true;
        }
        if let Some(format) = self.format {
            config.logging.format = format.into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "dashlink",
            "--token",
            "abc",
            "--host",
            "dash.example.com",
            "--secure",
            "--format",
            "json",
        ]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);

        assert_eq!(cli.token.as_deref(), Some("abc"));
        assert_eq!(config.endpoint.host, "dash.example.com");
        assert!(config.endpoint.secure);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_defaults_leave_config_alone() {
        let cli = Cli::parse_from(["dashlink"]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, AppConfig::default());
    }
}
