use thiserror::Error;

/// Errors related to reading process configuration from the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable required by the application is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable is set but blank.
    #[error("Environment variable {0} is set but empty")]
    EmptyEnvVar(String),
}

/// Reads an environment variable, returning a structured error if it's missing.
///
/// Whitespace around the value is trimmed; a value that trims to nothing is
/// reported as [`ConfigError::EmptyEnvVar`] rather than passed along.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, ConfigError> {
    let raw = std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyEnvVar(name.to_string()));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_is_reported_by_name() {
        let err = get_env_var("SHARED_UTILS_TEST_SURELY_UNSET").unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnvVar("SHARED_UTILS_TEST_SURELY_UNSET".into())
        );
    }
}
