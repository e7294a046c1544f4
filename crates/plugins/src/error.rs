use hive_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed common config, certificate, key or port.
    #[error(transparent)]
    Config(#[from] hive_config::Error),

    /// A channel slot in the property bag is missing or carries the wrong
    /// message type.
    #[error("channel wiring failed: {reason}")]
    Wiring { reason: String },

    #[error("missing initialization component: {what}")]
    MissingProperty { what: String },

    #[error(transparent)]
    Tls(#[from] hive_tls::Error),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rpc server failed: {message}")]
    Serve { message: String },

    /// Sent on the error channel when the plugin receives STOP.
    #[error("{plugin} shutting down")]
    ShuttingDown { plugin: String },

    #[error("integrity check failed for {artifact}: expected {expected}, found {actual}")]
    Integrity {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

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
    pub fn wiring(reason: impl Into<String>) -> Self {
        Self::Wiring {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn missing_property(what: impl Into<String>) -> Self {
        Self::MissingProperty { what: what.into() }
    }

    #[must_use]
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    /// Configuration problems: the plugin cannot start until the host fixes
    /// what it hands over.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Wiring { .. } | Self::MissingProperty { .. }
        )
    }

    /// Listener and TLS failures. The plugin stays startable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Tls(_) | Self::Bind { .. } | Self::Serve { .. }
        )
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShuttingDown { .. })
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

hive_common::impl_context!();
