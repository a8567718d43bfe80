//! Connection mode initialisation: the client sends `[0x00, 0x00]` and the
//! server echoes it back.

use std::time::Duration;

use bytes::Bytes;
use ship_frame::{check_init_frame, INIT_FRAME};

use super::Role;
use crate::error::{PeerError, Result};
use crate::transport::Transport;

pub(crate) async fn exchange(transport: &Transport, role: Role, timeout: Duration) -> Result<()> {
    match role {
        Role::Client => {
            transport.write_binary(Bytes::from_static(&INIT_FRAME)).await?;
            check(&transport.read_binary(timeout).await?)
        }
        Role::Server => {
            check(&transport.read_binary(timeout).await?)?;
            transport.write_binary(Bytes::from_static(&INIT_FRAME)).await
        }
    }
}

fn check(frame: &[u8]) -> Result<()> {
    check_init_frame(frame).map_err(|err| PeerError::ProtocolViolation(err.to_string()))
}
