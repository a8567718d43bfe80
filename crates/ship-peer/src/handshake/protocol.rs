//! Protocol handshake: the client announces its maximum version and formats,
//! the server selects, and the client confirms by echoing the selection.
//!
//! Only version 1.x with `JSON-UTF8` is supported. Any failure is reported to
//! the peer with `messageProtocolHandshakeError` before returning.

use std::time::Duration;

use ship_frame::{
    HandshakeErrorCode, MessageProtocolHandshake, MessageProtocolHandshakeError,
    ProtocolHandshakeType, ShipMessage, FORMAT_JSON_UTF8, PROTOCOL_VERSION,
};
use tracing::debug;

use super::{unexpected, Role};
use crate::error::{PeerError, Result};
use crate::transport::Transport;

const EXPECTED: &str = "messageProtocolHandshake";

pub(crate) async fn exchange(transport: &Transport, role: Role, timeout: Duration) -> Result<()> {
    match role {
        Role::Client => {
            let proposal = MessageProtocolHandshake::new(ProtocolHandshakeType::AnnounceMax);
            client(transport, proposal, timeout).await
        }
        Role::Server => server(transport, timeout).await,
    }
}

/// Propose `proposal` and confirm the server's selection.
pub(crate) async fn client(
    transport: &Transport,
    proposal: MessageProtocolHandshake,
    timeout: Duration,
) -> Result<()> {
    transport.send(&proposal.into()).await?;

    let selection = receive(transport, timeout).await?;
    if selection.handshake_type != ProtocolHandshakeType::Select {
        return fail(
            transport,
            HandshakeErrorCode::UnexpectedMessage,
            PeerError::ProtocolViolation("expected protocol selection".to_string()),
        )
        .await;
    }
    if selection.version != PROTOCOL_VERSION || !selection.formats.supports(FORMAT_JSON_UTF8) {
        return fail(
            transport,
            HandshakeErrorCode::SelectionMismatch,
            PeerError::ProtocolViolation(format!(
                "unsupported selection: version {} formats {:?}",
                selection.version, selection.formats.format
            )),
        )
        .await;
    }

    transport.send(&selection.into()).await?;
    debug!(transport = transport.id(), version = %PROTOCOL_VERSION, "protocol selected");
    Ok(())
}

async fn server(transport: &Transport, timeout: Duration) -> Result<()> {
    let proposal = receive(transport, timeout).await?;
    if proposal.handshake_type != ProtocolHandshakeType::AnnounceMax {
        return fail(
            transport,
            HandshakeErrorCode::UnexpectedMessage,
            PeerError::ProtocolViolation("expected protocol announcement".to_string()),
        )
        .await;
    }
    if proposal.version.major != PROTOCOL_VERSION.major
        || !proposal.formats.supports(FORMAT_JSON_UTF8)
    {
        return fail(
            transport,
            HandshakeErrorCode::SelectionMismatch,
            PeerError::ProtocolViolation(format!(
                "no common protocol: version {} formats {:?}",
                proposal.version, proposal.formats.format
            )),
        )
        .await;
    }

    let selection = MessageProtocolHandshake::new(ProtocolHandshakeType::Select);
    transport.send(&selection.clone().into()).await?;

    let confirmation = receive(transport, timeout).await?;
    if confirmation != selection {
        return fail(
            transport,
            HandshakeErrorCode::SelectionMismatch,
            PeerError::ProtocolViolation("selection confirmation differs".to_string()),
        )
        .await;
    }
    debug!(transport = transport.id(), version = %PROTOCOL_VERSION, "protocol selected");
    Ok(())
}

async fn receive(transport: &Transport, timeout: Duration) -> Result<MessageProtocolHandshake> {
    match transport.read_message(timeout).await {
        Ok(ShipMessage::MessageProtocolHandshake(handshake)) => Ok(handshake),
        Ok(ShipMessage::MessageProtocolHandshakeError(err)) => Err(PeerError::Aborted(format!(
            "peer rejected protocol handshake ({:?})",
            err.error
        ))),
        Ok(other) => {
            let err = unexpected(transport, &other, EXPECTED).await;
            fail(transport, HandshakeErrorCode::UnexpectedMessage, err).await
        }
        Err(PeerError::Timeout(elapsed)) => {
            fail(
                transport,
                HandshakeErrorCode::Timeout,
                PeerError::Timeout(elapsed),
            )
            .await
        }
        Err(err) => Err(err),
    }
}

async fn fail<T>(transport: &Transport, code: HandshakeErrorCode, err: PeerError) -> Result<T> {
    if transport.is_closed() {
        return Err(err);
    }
    let report = MessageProtocolHandshakeError { error: code };
    if let Err(send_err) = transport.send(&report.into()).await {
        debug!(transport = transport.id(), error = %send_err, "protocol error not sent");
    }
    Err(err)
}
