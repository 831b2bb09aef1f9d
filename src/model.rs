// Wire types for the engine's JSON API. Every engine object carries a
// `type` tag, so most structs below use `#[serde(tag = "type")]` and are
// named after the engine type they map to.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{EnrollError, Result};

/// API version requested when the session is opened.
pub const API_VERSION: &str = "1.9.3";

/// Envelope wrapping every engine response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ApiResponse {
    #[serde(rename = "OKResult")]
    Ok {
        #[serde(default)]
        result: Value,
        #[serde(default)]
        job: Option<String>,
        #[serde(default)]
        action: Option<String>,
    },
    #[serde(rename = "ListResult")]
    List {
        #[serde(default)]
        result: Vec<Value>,
        #[serde(default)]
        total: Option<u64>,
    },
    #[serde(rename = "ErrorResult")]
    Error { error: ApiErrorBody },
}

/// Body of an `ErrorResult`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub command_output: Option<String>,
}

impl ApiResponse {
    /// Turn an `ErrorResult` into `EnrollError::Api`, pass anything else through.
    pub fn into_result(self) -> Result<Self> {
        match self {
            ApiResponse::Error { error } => Err(EnrollError::Api {
                id: error.id,
                details: error.details,
                action: error.action,
            }),
            other => Ok(other),
        }
    }

    /// Job reference returned by a mutating call, if the engine started one.
    pub fn job(&self) -> Option<&str> {
        match self {
            ApiResponse::Ok { job: Some(job), .. } => Some(job.as_str()),
            _ => None,
        }
    }

    /// Deserialize the `result` of an `OKResult`.
    pub fn ok_result<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        match self {
            ApiResponse::Ok { result, .. } => Ok(serde_json::from_value(result)?),
            ApiResponse::List { .. } => Err(EnrollError::unexpected("expected OKResult, got ListResult")),
            ApiResponse::Error { error } => Err(EnrollError::Api {
                id: error.id,
                details: error.details,
                action: error.action,
            }),
        }
    }

    /// Deserialize every entry of a `ListResult`.
    pub fn list_result<T: serde::de::DeserializeOwned>(self) -> Result<Vec<T>> {
        match self {
            ApiResponse::List { result, .. } => result
                .into_iter()
                .map(|v| serde_json::from_value(v).map_err(EnrollError::from))
                .collect(),
            ApiResponse::Ok { .. } => Err(EnrollError::unexpected("expected ListResult, got OKResult")),
            ApiResponse::Error { error } => Err(EnrollError::Api {
                id: error.id,
                details: error.details,
                action: error.action,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "APIVersion")]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl ApiVersion {
    /// Parse a dotted `major.minor.micro` version string.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(EnrollError::config(format!("invalid API version {s:?}")));
        }
        let num = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| EnrollError::config(format!("invalid API version {s:?}")))
        };
        Ok(ApiVersion {
            major: num(parts[0])?,
            minor: num(parts[1])?,
            micro: num(parts[2])?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "APISession")]
pub struct ApiSession {
    pub version: ApiVersion,
}

#[derive(Serialize)]
#[serde(tag = "type")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

// Hand-written so the password never ends up in a debug log line.
impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Subset of the `/system` object we care about.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub ssh_public_key: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub product_version: Option<String>,
}

/// Entry of the `/environment` listing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EnvironmentSummary {
    #[serde(default)]
    pub reference: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Running,
    Suspended,
    Completed,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Canceled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Canceled => "CANCELED",
            JobState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_state: JobState,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub percent_complete: Option<f64>,
}

// Request body for POST /environment.

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub struct HostEnvironmentCreateParameters {
    pub primary_user: EnvironmentUser,
    pub host_environment: UnixHostEnvironment,
    pub host_parameters: UnixHostCreateParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct EnvironmentUser {
    pub name: String,
    pub credential: Credential,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Credential {
    SystemKeyCredential,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct UnixHostEnvironment {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct UnixHostCreateParameters {
    pub host: UnixHost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub struct UnixHost {
    pub address: String,
    pub toolkit_path: String,
}

impl HostEnvironmentCreateParameters {
    /// Unix host environment whose primary user authenticates with the
    /// engine's system key.
    pub fn unix_host(user: &str, environment_name: &str, address: &str, toolkit_path: &str) -> Self {
        HostEnvironmentCreateParameters {
            primary_user: EnvironmentUser {
                name: user.to_string(),
                credential: Credential::SystemKeyCredential,
            },
            host_environment: UnixHostEnvironment {
                name: environment_name.to_string(),
            },
            host_parameters: UnixHostCreateParameters {
                host: UnixHost {
                    address: address.to_string(),
                    toolkit_path: toolkit_path.to_string(),
                },
            },
        }
    }

    pub fn environment_name(&self) -> &str {
        &self.host_environment.name
    }
}
