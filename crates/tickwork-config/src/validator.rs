//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// The first error as a [`ConfigError::InvalidValue`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_store(config, &mut result);
        Self::validate_dispatcher(config, &mut result);
        Self::validate_workers(config, &mut result);
        Self::validate_sweeper(config, &mut result);
        Self::validate_logging(config, &mut result);

        Ok(result)
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_store(config: &Config, result: &mut ValidationResult) {
        if config.store.history_limit == 0 {
            result.add_error(ValidationError::new(
                "store.history_limit",
                "history_limit must be greater than 0",
            ));
        }

        if config.store.path.as_deref().is_some_and(str::is_empty) {
            result.add_error(ValidationError::new("store.path", "Path cannot be empty"));
        }
    }

    fn validate_dispatcher(config: &Config, result: &mut ValidationResult) {
        let dispatcher = &config.dispatcher;

        if dispatcher.poll_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "dispatcher.poll_interval_secs",
                "poll_interval_secs must be greater than 0",
            ));
        }

        if dispatcher.lease_duration_secs == 0 {
            result.add_error(ValidationError::new(
                "dispatcher.lease_duration_secs",
                "lease_duration_secs must be greater than 0",
            ));
        }

        if dispatcher.max_attempts == 0 {
            result.add_error(ValidationError::new(
                "dispatcher.max_attempts",
                "max_attempts must be greater than 0",
            ));
        }

        if dispatcher.max_backoff_secs < dispatcher.poll_interval_secs {
            result.add_warning(ValidationWarning::new(
                "dispatcher.max_backoff_secs",
                "max_backoff_secs is shorter than the poll interval, errors will not back off",
            ));
        }

        if dispatcher.holder.as_deref().is_some_and(str::is_empty) {
            result.add_error(ValidationError::new(
                "dispatcher.holder",
                "Holder cannot be empty",
            ));
        }
    }

    fn validate_workers(config: &Config, result: &mut ValidationResult) {
        if config.workers.max_workers == 0 {
            result.add_error(ValidationError::new(
                "workers.max_workers",
                "max_workers must be greater than 0",
            ));
        }

        if config.workers.job_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "workers.job_timeout_secs",
                "job_timeout_secs must be greater than 0",
            ));
        }

        if config.dispatcher.lease_duration_secs < config.workers.job_timeout_secs {
            result.add_warning(ValidationWarning::new(
                "dispatcher.lease_duration_secs",
                format!(
                    "Lease ({}s) is shorter than the job timeout ({}s), long runs depend on renewal",
                    config.dispatcher.lease_duration_secs, config.workers.job_timeout_secs
                ),
            ));
        }
    }

    fn validate_sweeper(config: &Config, result: &mut ValidationResult) {
        if config.sweeper.interval_secs == 0 {
            result.add_error(ValidationError::new(
                "sweeper.interval_secs",
                "interval_secs must be greater than 0",
            ));
        }

        if config.sweeper.interval_secs > config.dispatcher.lease_duration_secs {
            result.add_warning(ValidationWarning::new(
                "sweeper.interval_secs",
                "Sweep interval is longer than the lease, crashed runs wait more than one lease",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new("logging.level", "Level cannot be empty"));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
