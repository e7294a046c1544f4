use hive_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing config: grpc_server_port")]
    MissingPort,

    #[error("invalid grpc_server_port {value:?}: {reason}")]
    InvalidPort { value: String, reason: String },

    #[error("missing config cert")]
    MissingCert,

    #[error("missing config key")]
    MissingKey,

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_port(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPort {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

hive_common::impl_context!();
