use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("failed to read '{path}': {message}")]
    Io { path: String, message: String },
    #[error("config parse error in '{path}': {message}")]
    ConfigParse { path: String, message: String },
    #[error("routing profile '{0}' is not defined")]
    ProfileNotFound(String),
    #[error("model choice '{0}' was not found in the model deck")]
    ModelChoiceNotFound(String),
    #[error("no enabled backend can serve model '{model}' under routing profile '{profile}'")]
    NoBackendForModel { model: String, profile: String },
    #[error("invalid route pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}
