use crate::config::schema::{
    RunConfig, default_max_delay, default_min_delay, default_poll_interval,
    default_request_timeout, default_stagger,
};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<u32>,
    pub operations_per_worker: Option<u32>,
    pub seed: Option<u64>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        Self::load_with_inheritance(path, &mut visited, false)
    }

    /// Loads a config, applies overrides and validates the result.
    pub fn load_with_overrides<P: AsRef<Path>>(path: P, overrides: &Overrides) -> Result<RunConfig> {
        let mut config = Self::load(path)?;
        Self::apply_overrides(&mut config, overrides)?;
        Ok(config)
    }

    pub fn apply_overrides(config: &mut RunConfig, overrides: &Overrides) -> Result<()> {
        if let Some(workers) = overrides.workers {
            config.workers = workers;
        }
        if let Some(operations) = overrides.operations_per_worker {
            config.operations_per_worker = operations;
        }
        if overrides.seed.is_some() {
            config.seed = overrides.seed;
        }
        config.validate()?;
        Ok(())
    }

    fn load_with_inheritance(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        is_parent_load: bool,
    ) -> Result<RunConfig> {
        let path = fs::canonicalize(path).map_err(|e| {
            Error::Config(format!("{}: {}", path.display(), e))
        })?;

        if visited.contains(&path) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }
        visited.insert(path.clone());

        let config = Self::load_file(&path)?;

        let final_config = if let Some(parent_path_str) = &config.extends {
            let parent_path = path.parent()
                .ok_or_else(|| Error::Config(format!(
                    "Cannot determine parent directory for {}",
                    path.display()
                )))?
                .join(parent_path_str);

            let parent_config = Self::load_with_inheritance(&parent_path, visited, true)?;
            Self::merge_configs(parent_config, config)
        } else {
            config
        };

        if !is_parent_load {
            final_config.validate()?;
        }

        Ok(final_config)
    }

    fn load_file(path: &Path) -> Result<RunConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    fn merge_configs(mut parent: RunConfig, child: RunConfig) -> RunConfig {
        if !child.name.is_empty() {
            parent.name = child.name;
        }
        if !child.target.id.is_empty() {
            parent.target.id = child.target.id;
        }
        if !child.target.action_url.is_empty() {
            parent.target.action_url = child.target.action_url;
            parent.target.method = child.target.method;
        }
        if child.target.counter_url.is_some() {
            parent.target.counter_url = child.target.counter_url;
            parent.target.counter_pointer = child.target.counter_pointer;
        }
        if child.workers != 0 {
            parent.workers = child.workers;
        }
        if child.operations_per_worker != 0 {
            parent.operations_per_worker = child.operations_per_worker;
        }
        if child.min_delay_secs != default_min_delay() {
            parent.min_delay_secs = child.min_delay_secs;
        }
        if child.max_delay_secs != default_max_delay() {
            parent.max_delay_secs = child.max_delay_secs;
        }
        if child.request_timeout_secs != default_request_timeout() {
            parent.request_timeout_secs = child.request_timeout_secs;
        }
        if child.poll_interval_ms != default_poll_interval() {
            parent.poll_interval_ms = child.poll_interval_ms;
        }
        if child.stagger_ms != default_stagger() {
            parent.stagger_ms = child.stagger_ms;
        }
        if child.seed.is_some() {
            parent.seed = child.seed;
        }
        if child.proxy.is_some() {
            parent.proxy = child.proxy;
        }
        if child.report.is_some() {
            parent.report = child.report;
        }

        parent.extends = None;
        parent
    }
}
