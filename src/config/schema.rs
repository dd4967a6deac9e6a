use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_delay_range"))]
pub struct RunConfig {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    #[validate]
    pub target: TargetConfig,

    #[serde(default)]
    #[validate(range(min = 1))]
    pub workers: u32,

    #[serde(default)]
    #[validate(range(min = 1))]
    pub operations_per_worker: u32,

    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    #[validate(range(min = 100))]
    pub poll_interval_ms: u64,

    #[serde(default = "default_stagger")]
    pub stagger_ms: u64,

    /// Seed for per-worker delay sampling; drawn from entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Single outbound proxy URL for every request.
    #[serde(default)]
    #[validate(url)]
    pub proxy: Option<String>,

    #[serde(default)]
    pub report: Option<ReportConfig>,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TargetConfig {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub id: String,

    #[serde(default)]
    #[validate(url)]
    pub action_url: String,

    #[serde(default)]
    pub method: HttpMethod,

    /// Endpoint returning the target's counter as JSON. `{target}` is
    /// replaced with the target id.
    #[serde(default)]
    #[validate(url)]
    pub counter_url: Option<String>,

    #[serde(default = "default_counter_pointer")]
    pub counter_pointer: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            action_url: String::new(),
            method: HttpMethod::default(),
            counter_url: None,
            counter_pointer: default_counter_pointer(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReportConfig {
    Json { path: String },
    Yaml { path: String },
}

impl RunConfig {
    pub fn target_total(&self) -> u64 {
        u64::from(self.workers) * u64::from(self.operations_per_worker)
    }

    pub fn delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.min_delay_secs),
            Duration::from_secs(self.max_delay_secs),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}

fn validate_delay_range(config: &RunConfig) -> Result<(), ValidationError> {
    if config.min_delay_secs > config.max_delay_secs {
        let mut err = ValidationError::new("delay_range");
        err.message = Some("min_delay_secs must not exceed max_delay_secs".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn default_min_delay() -> u64 {
    2
}

pub(crate) fn default_max_delay() -> u64 {
    8
}

pub(crate) fn default_request_timeout() -> u64 {
    15
}

pub(crate) fn default_poll_interval() -> u64 {
    3000
}

pub(crate) fn default_stagger() -> u64 {
    50
}

fn default_counter_pointer() -> String {
    "/count".to_string()
}
