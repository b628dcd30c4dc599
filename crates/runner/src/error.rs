use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The plugin's interpreter is outside the supported set; no
    /// subprocess was spawned.
    #[error("unsupported interpreter: {0}")]
    UnsupportedInterpreter(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
