// Optional config file and the resolved settings used by the rest of the
// program.
//
// The file is either INI (`key = value`, optionally under an
// `[Application Options]` section) or a JSON object, keyed by the long
// flag names. Flags and their environment variables always win over the
// file.

use ini::Ini;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EnrollError, Result};

/// Default time to wait for the environment creation job.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

/// Config file contents. Every field is optional; missing values fall back
/// to flags, environment variables or defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub ddp_hostname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub skip_validate: Option<bool>,
    pub environment: Option<String>,
    pub filename: Option<PathBuf>,
    pub toolkit_path: Option<String>,
    pub environment_user: Option<String>,
    pub environment_address: Option<String>,
    pub retry_badpass: Option<bool>,
    pub job_timeout: Option<u64>,
}

impl FileConfig {
    /// Load an INI or JSON config file. A file whose first non-blank
    /// character is `{` is read as JSON.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EnrollError::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let parsed = if content.trim_start().starts_with('{') {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            Self::from_ini(&content)
        };
        parsed.map_err(|e| {
            EnrollError::config(format!("failed to parse config file {}: {e}", path.display()))
        })
    }

    fn from_ini(content: &str) -> std::result::Result<Self, String> {
        let ini = Ini::load_from_str(content).map_err(|e| e.to_string())?;
        let mut cfg = FileConfig::default();
        for (_section, props) in ini.iter() {
            for (key, value) in props.iter() {
                cfg.set(key, value)?;
            }
        }
        Ok(cfg)
    }

    // Long flag names use both `-` and `_`; accept either spelling.
    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        let value = value.trim();
        match key.trim().replace('-', "_").as_str() {
            "ddp_hostname" => self.ddp_hostname = Some(value.to_string()),
            "username" => self.username = Some(value.to_string()),
            "password" => self.password = Some(value.to_string()),
            "skip_validate" => self.skip_validate = Some(parse_bool(key, value)?),
            "environment" => self.environment = Some(value.to_string()),
            "filename" => self.filename = Some(PathBuf::from(value)),
            "toolkit_path" => self.toolkit_path = Some(value.to_string()),
            "environment_user" => self.environment_user = Some(value.to_string()),
            "environment_address" => self.environment_address = Some(value.to_string()),
            "retry_badpass" => self.retry_badpass = Some(parse_bool(key, value)?),
            "job_timeout" => {
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid value {value:?} for {key}"))?;
                self.job_timeout = Some(secs);
            }
            _ => return Err(format!("unknown option {key:?}")),
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid value {value:?} for {key}")),
    }
}

/// Fully resolved configuration.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub ddp_hostname: String,
    pub username: String,
    pub password: String,
    pub skip_validate: bool,
    /// Environment name; `None` means use the OS hostname.
    pub environment: Option<String>,
    pub key_file: PathBuf,
    pub toolkit_path: String,
    pub environment_user: String,
    pub environment_address: Option<String>,
    pub retry_badpass: bool,
    pub job_timeout: Duration,
}

impl Settings {
    /// Base URL of the engine's JSON API.
    pub fn engine_url(&self) -> String {
        format!("https://{}/resources/json/delphix", self.ddp_hostname)
    }

    /// Name the environment is registered under.
    pub fn environment_name(&self) -> Result<String> {
        match &self.environment {
            Some(name) if !name.is_empty() => Ok(name.clone()),
            _ => {
                let host = hostname::get()?;
                host.into_string()
                    .map_err(|_| EnrollError::config("OS hostname is not valid UTF-8"))
            }
        }
    }

    /// Address the engine uses to reach the host; defaults to the
    /// environment name.
    pub fn environment_address(&self, environment_name: &str) -> String {
        match &self.environment_address {
            Some(addr) if !addr.is_empty() => addr.clone(),
            _ => environment_name.to_string(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("ddp_hostname", &self.ddp_hostname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("skip_validate", &self.skip_validate)
            .field("environment", &self.environment)
            .field("key_file", &self.key_file)
            .field("toolkit_path", &self.toolkit_path)
            .field("environment_user", &self.environment_user)
            .field("environment_address", &self.environment_address)
            .field("retry_badpass", &self.retry_badpass)
            .field("job_timeout", &self.job_timeout)
            .finish()
    }
}

/// `~/.ssh/authorized_keys`, or `./authorized_keys` if there is no home.
pub fn default_key_file() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".ssh").join("authorized_keys"),
        None => PathBuf::from("authorized_keys"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings() -> Settings {
        Settings {
            ddp_hostname: "engine.example.com".into(),
            username: "admin".into(),
            password: "secret".into(),
            skip_validate: false,
            environment: Some("db01".into()),
            key_file: PathBuf::from("/tmp/keys"),
            toolkit_path: "/opt/delphix".into(),
            environment_user: "delphix".into(),
            environment_address: None,
            retry_badpass: false,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }

    #[test]
    fn engine_url_uses_hostname() {
        assert_eq!(
            settings().engine_url(),
            "https://engine.example.com/resources/json/delphix"
        );
    }

    #[test]
    fn address_defaults_to_environment_name() {
        let mut s = settings();
        let name = s.environment_name().unwrap();
        assert_eq!(name, "db01");
        assert_eq!(s.environment_address(&name), "db01");

        s.environment_address = Some("10.1.2.3".into());
        assert_eq!(s.environment_address(&name), "10.1.2.3");
    }

    #[test]
    fn empty_environment_falls_back_to_hostname() {
        let mut s = settings();
        s.environment = Some(String::new());
        let name = s.environment_name().unwrap();
        assert!(!name.is_empty());
    }

    #[test]
    fn debug_redacts_password() {
        let dbg = format!("{:?}", settings());
        assert!(!dbg.contains("secret"));
    }

    #[test]
    fn load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "ddp_hostname": "engine", "toolkit_path": "/opt/delphix", "job_timeout": 30 }}"#
        )
        .unwrap();
        let cfg = FileConfig::load_from_file(file.path()).unwrap();
        assert_eq!(cfg.ddp_hostname.as_deref(), Some("engine"));
        assert_eq!(cfg.job_timeout, Some(30));
        assert_eq!(cfg.username, None);
    }

    #[test]
    fn config_file_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "hostname": "engine" }}"#).unwrap();
        let err = FileConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, EnrollError::Config(_)));
    }

    #[test]
    fn load_ini_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[Application Options]\n\
             ddp_hostname = engine.example.com\n\
             username = admin\n\
             skip-validate = 1\n\
             retry-badpass = false\n\
             toolkit_path = /opt/delphix\n\
             filename = /home/delphix/.ssh/authorized_keys\n\
             job_timeout = 90\n"
        )
        .unwrap();
        let cfg = FileConfig::load_from_file(file.path()).unwrap();
        assert_eq!(cfg.ddp_hostname.as_deref(), Some("engine.example.com"));
        assert_eq!(cfg.username.as_deref(), Some("admin"));
        assert_eq!(cfg.skip_validate, Some(true));
        assert_eq!(cfg.retry_badpass, Some(false));
        assert_eq!(
            cfg.filename,
            Some(PathBuf::from("/home/delphix/.ssh/authorized_keys"))
        );
        assert_eq!(cfg.job_timeout, Some(90));
    }

    #[test]
    fn ini_without_section_and_bad_values() {
        let mut ok = tempfile::NamedTempFile::new().unwrap();
        write!(ok, "environment = db01\nenvironment_user = delphix\n").unwrap();
        let cfg = FileConfig::load_from_file(ok.path()).unwrap();
        assert_eq!(cfg.environment.as_deref(), Some("db01"));
        assert_eq!(cfg.environment_user.as_deref(), Some("delphix"));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "skip-validate = maybe\n").unwrap();
        assert!(matches!(
            FileConfig::load_from_file(bad.path()).unwrap_err(),
            EnrollError::Config(_)
        ));

        let mut unknown = tempfile::NamedTempFile::new().unwrap();
        write!(unknown, "hostname = engine\n").unwrap();
        assert!(matches!(
            FileConfig::load_from_file(unknown.path()).unwrap_err(),
            EnrollError::Config(_)
        ));
    }
}
