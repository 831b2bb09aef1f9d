// The enrollment flow: fetch the engine key, write it locally, then make
// sure a host environment exists for this machine.
//
// `Enroller` is written against the `EngineApi` trait so the flow can be
// driven by anything that speaks the engine's envelope format.

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, EngineApi};
use crate::config::{Settings, DEFAULT_JOB_TIMEOUT_SECS};
use crate::error::{EnrollError, Result};
use crate::keyfile;
use crate::model::{ApiResponse, EnvironmentSummary, HostEnvironmentCreateParameters, Job, JobState, SystemInfo};

/// Error id the engine sometimes returns for a create that races with its
/// own bookkeeping; the same request succeeds a few seconds later.
pub const OBJECT_EXISTS_ID: &str = "exception.executor.object.exists";

const CREATE_RETRY_DELAY: Duration = Duration::from_secs(5);
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Result of [`Enroller::add_environment`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing was sent; an environment with this name is already registered.
    AlreadyExists(EnvironmentSummary),
    /// The environment was created and its job (if any) completed.
    Created {
        reference: Option<String>,
        job: Option<String>,
    },
}

pub struct Enroller<'a, A: EngineApi + ?Sized> {
    api: &'a A,
    retry_delay: Duration,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl<'a, A: EngineApi + ?Sized> Enroller<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Enroller {
            api,
            retry_delay: CREATE_RETRY_DELAY,
            poll_interval: JOB_POLL_INTERVAL,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// The engine's SSH public key from `/system`.
    pub fn ssh_public_key(&self) -> Result<String> {
        let system: SystemInfo = self.api.get("system")?.ok_result()?;
        debug!(
            engine = system.hostname.as_deref().unwrap_or("unknown"),
            version = system.product_version.as_deref().unwrap_or("unknown"),
            "fetched system info"
        );
        match system.ssh_public_key {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(EnrollError::MissingPublicKey),
        }
    }

    /// Fetch the engine key and append it to `path`.
    pub fn write_public_key(&self, path: &Path) -> Result<()> {
        let key = self.ssh_public_key()?;
        keyfile::append_key(path, &key)?;
        info!("Delphix DDP key written to {}", path.display());
        Ok(())
    }

    /// First environment whose name matches exactly.
    pub fn find_environment(&self, name: &str) -> Result<Option<EnvironmentSummary>> {
        let envs: Vec<EnvironmentSummary> = self.api.get("environment")?.list_result()?;
        Ok(envs.into_iter().find(|env| env.name == name))
    }

    /// Create the environment unless one with the same name exists, then
    /// wait for the creation job.
    pub fn add_environment(&self, params: &HostEnvironmentCreateParameters) -> Result<Outcome> {
        let name = params.environment_name();
        if let Some(existing) = self.find_environment(name)? {
            warn!("{name} already exists");
            return Ok(Outcome::AlreadyExists(existing));
        }

        let body = serde_json::to_value(params)?;
        debug!(%body, "creating environment");
        let response = match self.api.post("environment", &body) {
            Ok(resp) => resp,
            Err(err) if err.api_id() == Some(OBJECT_EXISTS_ID) => {
                warn!(
                    "engine reported {OBJECT_EXISTS_ID} for {name}, trying again in {}s",
                    self.retry_delay.as_secs()
                );
                thread::sleep(self.retry_delay);
                self.api.post("environment", &body)?
            }
            Err(err) => return Err(err),
        };

        let job = response.job().map(str::to_string);
        let reference = match &response {
            ApiResponse::Ok { result: Value::String(r), .. } => Some(r.clone()),
            _ => None,
        };
        if let Some(job) = &job {
            self.wait_for_job(job)?;
        }
        Ok(Outcome::Created { reference, job })
    }

    /// Poll `/job/<job>` until it reaches a terminal state.
    pub fn wait_for_job(&self, job: &str) -> Result<Job> {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Waiting for {job}"));

        let started = Instant::now();
        let result = loop {
            let status: Job = match self.api.get(&format!("job/{job}")).and_then(|r| r.ok_result()) {
                Ok(status) => status,
                Err(err) => break Err(err),
            };
            debug!(job, state = %status.job_state, percent = ?status.percent_complete, "job status");
            let label = status.title.as_deref().unwrap_or(job);
            match status.percent_complete {
                Some(percent) => spinner.set_message(format!("{label} ({percent:.0}%)")),
                None => spinner.set_message(label.to_string()),
            }
            spinner.tick();

            let state = status.job_state;
            if state.is_terminal() {
                break match state {
                    JobState::Completed => Ok(status),
                    state => Err(EnrollError::JobFailed {
                        job: job.to_string(),
                        state: state.to_string(),
                    }),
                };
            }
            if started.elapsed() >= self.job_timeout {
                break Err(EnrollError::JobTimeout {
                    job: job.to_string(),
                    secs: self.job_timeout.as_secs(),
                });
            }
            thread::sleep(self.poll_interval);
        };
        spinner.finish_and_clear();

        if result.is_ok() {
            info!(job, "job completed");
        }
        result
    }

    /// Everything after login: key, lookup, create, wait.
    pub fn enroll(&self, settings: &Settings) -> Result<Outcome> {
        self.write_public_key(&settings.key_file)?;

        let environment_name = settings.environment_name()?;
        let address = settings.environment_address(&environment_name);
        let params = HostEnvironmentCreateParameters::unix_host(
            &settings.environment_user,
            &environment_name,
            &address,
            &settings.toolkit_path,
        );
        self.add_environment(&params)
    }
}

/// Log in to the engine described by `settings` and enroll this host.
pub fn run(settings: &Settings) -> Result<Outcome> {
    info!("Establishing session and logging in");
    let api = ApiClient::connect(settings)?;
    info!("Successfully Logged in");

    Enroller::new(&api)
        .with_job_timeout(settings.job_timeout)
        .enroll(settings)
}
