use crate::registry::MemberId;
use crate::registry::loader::LoadError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("cannot resolve '{function}' in '{module}': {source}")]
    ResolutionFailed {
        module: String,
        function: String,
        #[source]
        source: LoadError,
    },
    #[error("unknown member id: {0}")]
    UnknownId(MemberId),
    #[error("no member named '{0}'")]
    NotFound(String),
    #[error("member {0} can only be invoked as a method")]
    NotAMethod(MemberId),
    #[error("native call failed: {0}")]
    CallFailed(String),
    #[error("bad value '{text}': {reason}")]
    ParseValue { text: String, reason: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
