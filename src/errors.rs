use crate::types::ZoneType;

/// All error types that can occur when interacting with Milight bridges.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A capability value was outside its accepted range.
    #[error("{name} parameter out of range: {value}")]
    OutOfRange { name: &'static str, value: f64 },

    /// A capability call was missing a required value.
    #[error("missing {name} parameter")]
    MissingArgument { name: &'static str },

    /// The capability is not valid for this zone type.
    #[error("can not {operation} on a {zone_type} zone")]
    UnsupportedOperation {
        zone_type: ZoneType,
        operation: &'static str,
    },

    /// A bridge candidate or device identity lacked a required field.
    #[error("missing {0} field")]
    MissingField(&'static str),

    /// The requested bridge is not registered and discovery did not find it.
    #[error("bridge {0} not found")]
    BridgeNotFound(String),

    /// A network socket operation failed while talking to a bridge.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// A discovery sweep failed.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The transport was closed while a send was still being issued.
    #[error("transport is closed")]
    TransportClosed,

    /// Failed to deserialize platform-supplied JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new unsupported operation error
    pub fn unsupported(zone_type: ZoneType, operation: &'static str) -> Self {
        Error::UnsupportedOperation {
            zone_type,
            operation,
        }
    }

    /// Create a new out of range error
    pub fn out_of_range(name: &'static str, value: f64) -> Self {
        Error::OutOfRange { name, value }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
