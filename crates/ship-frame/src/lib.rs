//! SHIP framing and message model.
//!
//! Every physical SHIP message is one type byte followed by a payload:
//! - `Init` (0) carries the single byte `0x00`
//! - `Control` (1), `Data` (2) and `End` (3) carry a JSON body
//!
//! JSON bodies are `{"<kind>": [...]}` where the value is an ordered array
//! of single-key objects, one per field (see [`codec`]). [`ShipMessage`]
//! decodes a body by dispatching on its single top-level key.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod model;

pub use error::{FrameError, Result};
pub use frame::{
    check_init_frame, decode_frame, encode_frame, Frame, MessageType, HEADER_SIZE, INIT_FRAME,
    INIT_PAYLOAD,
};
pub use message::ShipMessage;
pub use model::{
    AccessMethods, AccessMethodsDns, AccessMethodsRequest, ConnectionClose, ConnectionClosePhase,
    ConnectionCloseReason, ConnectionHello, ConnectionHelloPhase, ConnectionPinError,
    ConnectionPinInput, ConnectionPinState, Data, DataExtension, DataHeader, DnsSdMdns,
    HandshakeErrorCode, MessageProtocolFormats, MessageProtocolHandshake,
    MessageProtocolHandshakeError, PinInputPermission, PinState, ProtocolHandshakeType,
    ProtocolVersion, FORMAT_JSON_UTF8, PIN_ERROR_WRONG_PIN, PROTOCOL_ID, PROTOCOL_VERSION,
};
