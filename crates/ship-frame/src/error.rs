/// Errors that can occur while encoding or decoding SHIP frames and messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A physical message carried no type byte.
    #[error("empty frame (missing message type byte)")]
    EmptyFrame,

    /// The leading type byte is not one of Init/Control/Data/End.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// An Init frame did not carry exactly the single byte 0x00.
    #[error("invalid init frame: {0:02x?}")]
    InvalidInitFrame(Vec<u8>),

    /// A wire key has no matching field in the target type.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// The JSON does not follow the array-of-single-key-objects convention.
    #[error("invalid message shape: {0}")]
    InvalidShape(String),

    /// The value being encoded or decoded is not a structure with named fields.
    #[error("{0} does not have a struct field layout")]
    NotAStruct(&'static str),

    /// The top-level key does not name a known message kind.
    #[error("unsupported message type: {0}")]
    UnsupportedMessage(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
