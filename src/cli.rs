use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use dialoguer::Password;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{default_key_file, FileConfig, Settings, DEFAULT_JOB_TIMEOUT_SECS};
use crate::error::{EnrollError, Result};

/// Register this host as an environment on a Delphix Dynamic Data Platform engine
#[derive(Parser, Debug, Default)]
#[command(name = "self_enroll")]
#[command(version)]
pub struct Cli {
    /// The hostname or IP address of the Delphix Dynamic Data Platform
    #[arg(short = 'e', long = "ddp_hostname", env = "DELPHIX_DDP_HOSTNAME")]
    pub ddp_hostname: Option<String>,

    /// The username used to authenticate to the Delphix Engine
    #[arg(short = 'u', long = "username", env = "DELPHIX_USER")]
    pub username: Option<String>,

    /// The password used to authenticate to the Delphix Engine
    #[arg(short = 'p', long = "password", env = "DELPHIX_PASS", hide_env_values = true)]
    pub password: Option<String>,

    /// Turn on debugging. -vv for the most verbose output
    #[arg(short = 'v', long = "debug", action = ArgAction::Count)]
    pub debug: u8,

    /// Don't validate the TLS certificate of the Delphix Engine
    #[arg(
        long = "skip-validate",
        env = "DELPHIX_SKIP_VALIDATE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub skip_validate: bool,

    /// Optional INI (or JSON) config file providing any of the long options
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Name of the environment in Delphix. Defaults to the hostname
    #[arg(long = "environment", env = "DELPHIX_ENV")]
    pub environment: Option<String>,

    /// File to append the engine's public key to. Created if missing
    #[arg(long = "filename")]
    pub filename: Option<PathBuf>,

    /// The path for the toolkit that resides on the host
    #[arg(long = "toolkit_path", env = "TOOLKIT_PATH")]
    pub toolkit_path: Option<String>,

    /// The OS username to use for the environment
    #[arg(long = "environment_user", env = "ENVIRONMENT_USER")]
    pub environment_user: Option<String>,

    /// The address associated with the host. Defaults to the environment name
    #[arg(long = "environment_address", env = "ENVIRONMENT_ADDRESS")]
    pub environment_address: Option<String>,

    /// Retry the login on a bad password response (useful while a new engine is being configured)
    #[arg(
        long = "retry-badpass",
        env = "RETRY_BAD_PASS",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub retry_badpass: bool,

    /// Seconds to wait for the environment creation job
    #[arg(long = "job_timeout", env = "DELPHIX_JOB_TIMEOUT")]
    pub job_timeout: Option<u64>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Verbosity from `-v` occurrences, falling back to `DELPHIX_DEBUG`
    /// (a count, or any truthy value for one level).
    pub fn verbosity(&self) -> u8 {
        if self.debug > 0 {
            return self.debug;
        }
        match std::env::var("DELPHIX_DEBUG") {
            Ok(v) => parse_debug_env(&v),
            Err(_) => 0,
        }
    }

    /// Read the config file named by `--config`, if any.
    pub fn file_config(&self) -> Result<FileConfig> {
        match &self.config {
            Some(path) => FileConfig::load_from_file(path),
            None => Ok(FileConfig::default()),
        }
    }

    /// Ask for the password on the terminal when no flag, env var or config
    /// entry supplied one.
    pub fn prompt_password_if_missing(&mut self, file: &FileConfig) -> Result<()> {
        if self.password.is_some() || file.password.is_some() || !std::io::stdin().is_terminal() {
            return Ok(());
        }
        let prompt = format!(
            "Password for {}",
            self.username.as_deref().or(file.username.as_deref()).unwrap_or("engine user")
        );
        let password = Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(|e| EnrollError::config(format!("failed to read password: {e}")))?;
        self.password = Some(password);
        Ok(())
    }

    /// Merge flags over the config file and check required values.
    pub fn into_settings(self, file: FileConfig) -> Result<Settings> {
        Ok(Settings {
            ddp_hostname: required(self.ddp_hostname, file.ddp_hostname, "ddp_hostname")?,
            username: required(self.username, file.username, "username")?,
            password: required(self.password, file.password, "password")?,
            skip_validate: self.skip_validate || file.skip_validate.unwrap_or(false),
            environment: self.environment.or(file.environment),
            key_file: self
                .filename
                .or(file.filename)
                .unwrap_or_else(default_key_file),
            toolkit_path: required(self.toolkit_path, file.toolkit_path, "toolkit_path")?,
            environment_user: required(self.environment_user, file.environment_user, "environment_user")?,
            environment_address: self.environment_address.or(file.environment_address),
            retry_badpass: self.retry_badpass || file.retry_badpass.unwrap_or(false),
            job_timeout: Duration::from_secs(
                self.job_timeout
                    .or(file.job_timeout)
                    .unwrap_or(DEFAULT_JOB_TIMEOUT_SECS),
            ),
        })
    }
}

fn required(flag: Option<String>, file: Option<String>, name: &str) -> Result<String> {
    flag.or(file)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EnrollError::config(format!("the required option --{name} was not provided")))
}

fn parse_debug_env(value: &str) -> u8 {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => 0,
        other => other.parse::<u8>().unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_cli() -> Cli {
        Cli {
            ddp_hostname: Some("engine".into()),
            username: Some("admin".into()),
            password: Some("pw".into()),
            toolkit_path: Some("/opt/delphix".into()),
            environment_user: Some("delphix".into()),
            ..Default::default()
        }
    }

    #[test]
    fn parses_long_flags() {
        let cli = Cli::try_parse_from([
            "self_enroll",
            "-e",
            "engine.example.com",
            "-u",
            "admin",
            "-p",
            "pw",
            "--toolkit_path",
            "/opt/delphix",
            "--environment_user",
            "delphix",
            "--environment",
            "db01",
            "--skip-validate",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.ddp_hostname.as_deref(), Some("engine.example.com"));
        assert_eq!(cli.environment.as_deref(), Some("db01"));
        assert!(cli.skip_validate);
        assert_eq!(cli.debug, 2);
    }

    #[test]
    fn flags_override_config_file() {
        let file = FileConfig {
            ddp_hostname: Some("from-file".into()),
            environment_address: Some("10.0.0.9".into()),
            job_timeout: Some(42),
            retry_badpass: Some(true),
            ..Default::default()
        };
        let settings = full_cli().into_settings(file).unwrap();
        assert_eq!(settings.ddp_hostname, "engine");
        assert_eq!(settings.environment_address.as_deref(), Some("10.0.0.9"));
        assert_eq!(settings.job_timeout, Duration::from_secs(42));
        assert!(settings.retry_badpass);
    }

    #[test]
    fn config_file_fills_required_values() {
        let cli = Cli {
            username: Some("admin".into()),
            password: Some("pw".into()),
            ..Default::default()
        };
        let file = FileConfig {
            ddp_hostname: Some("engine".into()),
            toolkit_path: Some("/opt/delphix".into()),
            environment_user: Some("delphix".into()),
            filename: Some(PathBuf::from("/tmp/authorized_keys")),
            ..Default::default()
        };
        let settings = cli.into_settings(file).unwrap();
        assert_eq!(settings.toolkit_path, "/opt/delphix");
        assert_eq!(settings.key_file, PathBuf::from("/tmp/authorized_keys"));
        assert_eq!(settings.job_timeout, Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS));
    }

    #[test]
    fn missing_required_value_is_named() {
        let mut cli = full_cli();
        cli.toolkit_path = None;
        let err = cli.into_settings(FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--toolkit_path"));
    }

    #[test]
    fn boolean_env_vars_accept_common_spellings() {
        std::env::set_var("RETRY_BAD_PASS", "1");
        std::env::set_var("DELPHIX_SKIP_VALIDATE", "yes");
        let on = Cli::try_parse_from(["self_enroll"]);
        std::env::set_var("RETRY_BAD_PASS", "0");
        std::env::set_var("DELPHIX_SKIP_VALIDATE", "false");
        let off = Cli::try_parse_from(["self_enroll"]);
        std::env::remove_var("RETRY_BAD_PASS");
        std::env::remove_var("DELPHIX_SKIP_VALIDATE");

        let on = on.unwrap();
        assert!(on.retry_badpass);
        assert!(on.skip_validate);
        let off = off.unwrap();
        assert!(!off.retry_badpass);
        assert!(!off.skip_validate);
    }

    #[test]
    fn debug_env_values() {
        assert_eq!(parse_debug_env("0"), 0);
        assert_eq!(parse_debug_env("false"), 0);
        assert_eq!(parse_debug_env("true"), 1);
        assert_eq!(parse_debug_env("3"), 3);
    }
}
