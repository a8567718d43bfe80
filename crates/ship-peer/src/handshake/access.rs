//! Access methods exchange: each side requests the other's access methods
//! and answers requests with its own identifier. The first `accessMethods`
//! received ends the phase.

use std::time::Duration;

use ship_frame::{AccessMethods, AccessMethodsRequest, ShipMessage};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{unexpected, ServiceDetails};
use crate::error::{PeerError, Result};
use crate::transport::Transport;

pub(crate) async fn exchange(
    transport: &Transport,
    local: &ServiceDetails,
    remote: &ServiceDetails,
    timeout: Duration,
) -> Result<AccessMethods> {
    transport.send(&AccessMethodsRequest {}.into()).await?;

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PeerError::Timeout(timeout));
        }
        let message = transport
            .read_message(remaining)
            .await
            .map_err(|err| match err {
                PeerError::Timeout(_) => PeerError::Timeout(timeout),
                other => other,
            })?;

        match message {
            ShipMessage::AccessMethodsRequest(_) => {
                transport
                    .send(&AccessMethods::new(&local.access_methods).into())
                    .await?;
            }
            ShipMessage::AccessMethods(methods) => {
                if !remote.access_methods.is_empty() && remote.access_methods != methods.id {
                    warn!(
                        transport = transport.id(),
                        expected = %remote.access_methods,
                        received = %methods.id,
                        "peer access methods differ from configuration"
                    );
                }
                debug!(transport = transport.id(), id = %methods.id, "access methods received");
                return Ok(methods);
            }
            other => return Err(unexpected(transport, &other, "accessMethods").await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::tests::transport_pair;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn both_sides_learn_each_other() {
        let (a, b) = transport_pair().await;
        let a_local = ServiceDetails::new("CEM-1");
        let b_local = ServiceDetails::new("EVSE-7");

        let (ra, rb) = tokio::join!(
            exchange(&a, &a_local, &b_local, TIMEOUT),
            exchange(&b, &b_local, &a_local, TIMEOUT)
        );
        assert_eq!(ra.unwrap().id, "EVSE-7");
        assert_eq!(rb.unwrap().id, "CEM-1");
    }

    #[tokio::test]
    async fn unsolicited_access_methods_end_the_phase() {
        let (a, b) = transport_pair().await;
        let local = ServiceDetails::new("CEM-1");

        let unknown = ServiceDetails::default();

        let (result, _) = tokio::join!(
            exchange(&a, &local, &unknown, TIMEOUT),
            async {
                b.send(&AccessMethods::new("HEMS").into()).await.unwrap();
            }
        );
        assert_eq!(result.unwrap().id, "HEMS");
        assert_eq!(
            b.read_message(TIMEOUT).await.unwrap(),
            ShipMessage::from(AccessMethodsRequest {})
        );
    }

    #[tokio::test]
    async fn request_is_answered_before_reply_arrives() {
        let (a, b) = transport_pair().await;
        let local = ServiceDetails::new("CEM-1");

        let unknown = ServiceDetails::default();

        let (result, _) = tokio::join!(
            exchange(&a, &local, &unknown, TIMEOUT),
            async {
                b.send(&AccessMethodsRequest {}.into()).await.unwrap();
                b.read_message(TIMEOUT).await.unwrap();
                let answer = b.read_message(TIMEOUT).await.unwrap();
                assert_eq!(answer, ShipMessage::from(AccessMethods::new("CEM-1")));
                b.send(&AccessMethods::new("EVSE-7").into()).await.unwrap();
            }
        );
        assert_eq!(result.unwrap().id, "EVSE-7");
    }

    #[tokio::test]
    async fn other_message_is_a_violation() {
        let (a, b) = transport_pair().await;
        let local = ServiceDetails::new("CEM-1");

        let unknown = ServiceDetails::default();

        let (result, _) = tokio::join!(
            exchange(&a, &local, &unknown, TIMEOUT),
            async {
                b.send(&ship_frame::Data::default().into()).await.unwrap();
            }
        );
        assert!(matches!(
            result.unwrap_err(),
            PeerError::ProtocolViolation(_)
        ));
    }
}
