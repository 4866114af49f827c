use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeaveError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Tool execution error: tool={tool_name}, {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Hook error: hook={hook}, {message}")]
    Hook { hook: String, message: String },

    /// A caller broke an API contract (duplicate sub-agent name, unknown speaker, ...).
    #[error("{0}")]
    Contract(String),

    #[error("Malformed log at line {line}: {message}")]
    MalformedLog { line: usize, message: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<toml::de::Error> for WeaveError {
    fn from(err: toml::de::Error) -> Self {
        WeaveError::Config(err.to_string())
    }
}

pub type WeaveResult<T> = Result<T, WeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = WeaveError::Provider("connection refused".into());
        assert_eq!(err.to_string(), "Provider error: connection refused");

        let err = WeaveError::ToolExecution {
            tool_name: "bash".into(),
            message: "command not found".into(),
        };
        assert!(err.to_string().contains("bash"));

        let err = WeaveError::MalformedLog {
            line: 7,
            message: "missing field `agent`".into(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed log at line 7: missing field `agent`"
        );

        let err = WeaveError::Contract("No subagent has name: bob".into());
        assert_eq!(err.to_string(), "No subagent has name: bob");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WeaveError>();
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WeaveError = io_err.into();
        assert!(matches!(err, WeaveError::Io(_)));
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: WeaveError = json_err.into();
        assert!(matches!(err, WeaveError::Serialization(_)));
    }

    #[test]
    fn toml_error_converts() {
        let toml_err = toml::from_str::<toml::Value>("= nope").unwrap_err();
        let err: WeaveError = toml_err.into();
        assert!(matches!(err, WeaveError::Config(_)));
    }
}
