use std::env;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("environment variable is not set: {key}")]
    Missing { key: String },
    #[error("environment variable {key} is not valid unicode")]
    NotUnicode { key: String },
}

pub fn infer_string(key: &str) -> Result<String, EnvError> {
    match env::var(key) {
        Ok(value) => {
            debug!("inferred {key} from the environment");
            Ok(value)
        }
        Err(env::VarError::NotPresent) => Err(EnvError::Missing { key: key.into() }),
        Err(env::VarError::NotUnicode(_)) => Err(EnvError::NotUnicode { key: key.into() }),
    }
}

/// Like [`infer_string`], but an empty value counts as missing.
pub fn infer_non_empty(key: &str) -> Option<String> {
    infer_string(key).ok().filter(|value| !value.trim().is_empty())
}
