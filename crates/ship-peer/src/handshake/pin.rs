//! PIN exchange.
//!
//! Each side announces whether it requires a PIN and, when the peer requires
//! one, presents the PIN configured for it. The phase ends once both
//! directions are settled, tracked as a two-bit mask.

use std::time::Duration;

use ship_frame::{
    ConnectionPinError, ConnectionPinInput, ConnectionPinState, PinInputPermission, PinState,
    ShipMessage, PIN_ERROR_WRONG_PIN,
};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{unexpected, ServiceDetails};
use crate::error::{PeerError, Result};
use crate::transport::Transport;

/// Our side is settled: we need no PIN, or the peer presented the right one.
pub const PIN_RECEIVED: u8 = 0b01;
/// Their side is settled: they need no PIN, or we presented ours.
pub const PIN_SENT: u8 = 0b10;
/// Both directions settled.
pub const PIN_COMPLETE: u8 = PIN_RECEIVED | PIN_SENT;

pub(crate) async fn exchange(
    transport: &Transport,
    local: &ServiceDetails,
    remote: &ServiceDetails,
    timeout: Duration,
) -> Result<u8> {
    let expected = local.pin();
    let mut progress = 0u8;
    if expected.is_some() {
        transport.send(&ConnectionPinState::required().into()).await?;
    } else {
        transport.send(&ConnectionPinState::none().into()).await?;
        progress |= PIN_RECEIVED;
    }

    let deadline = Instant::now() + timeout;
    while progress != PIN_COMPLETE {
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
            ShipMessage::ConnectionPinState(state) => {
                if progress & PIN_SENT != 0 {
                    trace!(transport = transport.id(), "repeated pin state");
                    continue;
                }
                match state.pin_state {
                    PinState::None | PinState::PinOk => progress |= PIN_SENT,
                    PinState::Required | PinState::Optional => {
                        if state.input_permission == Some(PinInputPermission::Busy) {
                            debug!(transport = transport.id(), "peer busy, waiting for pin input");
                            continue;
                        }
                        match remote.pin() {
                            Some(pin) => {
                                let input = ConnectionPinInput {
                                    pin: pin.to_string(),
                                };
                                transport.send(&input.into()).await?;
                                progress |= PIN_SENT;
                            }
                            None if state.pin_state == PinState::Required => {
                                return Err(PeerError::RemotePinRequired);
                            }
                            None => progress |= PIN_SENT,
                        }
                    }
                }
            }
            ShipMessage::ConnectionPinInput(input) => {
                let Some(expected) = expected else {
                    return Err(PeerError::ProtocolViolation(
                        "pin input without a pin requirement".to_string(),
                    ));
                };
                if input.pin != expected {
                    let report = ConnectionPinError {
                        error: PIN_ERROR_WRONG_PIN,
                    };
                    if let Err(err) = transport.send(&report.into()).await {
                        debug!(transport = transport.id(), error = %err, "pin error not sent");
                    }
                    return Err(PeerError::PinMismatch);
                }
                progress |= PIN_RECEIVED;
            }
            other => return Err(unexpected(transport, &other, "connectionPinState").await),
        }
    }

    debug!(transport = transport.id(), "pin exchange complete");
    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::tests::transport_pair;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn no_pins_completes_without_input() {
        let (a, b) = transport_pair().await;
        let none = ServiceDetails::default();

        let (result, _) = tokio::join!(exchange(&a, &none, &none, TIMEOUT), async {
            b.send(&ConnectionPinState::none().into()).await.unwrap();
        });
        assert_eq!(result.unwrap(), PIN_COMPLETE);

        let state = b.read_message(TIMEOUT).await.unwrap();
        assert_eq!(state, ShipMessage::from(ConnectionPinState::none()));
        // No PIN input follows.
        let err = b.read_message(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, PeerError::Timeout(_)));
    }

    #[tokio::test]
    async fn both_sides_without_pins() {
        let (a, b) = transport_pair().await;
        let none = ServiceDetails::default();

        let (ra, rb) = tokio::join!(
            exchange(&a, &none, &none, TIMEOUT),
            exchange(&b, &none, &none, TIMEOUT)
        );
        assert_eq!(ra.unwrap(), PIN_COMPLETE);
        assert_eq!(rb.unwrap(), PIN_COMPLETE);
    }

    #[tokio::test]
    async fn matching_pins_on_both_sides() {
        let (a, b) = transport_pair().await;
        let a_local = ServiceDetails::new("a").with_pin("1234");
        let b_local = ServiceDetails::new("b").with_pin("9876");

        let (ra, rb) = tokio::join!(
            exchange(&a, &a_local, &b_local, TIMEOUT),
            exchange(&b, &b_local, &a_local, TIMEOUT)
        );
        assert_eq!(ra.unwrap(), PIN_COMPLETE);
        assert_eq!(rb.unwrap(), PIN_COMPLETE);
    }

    #[tokio::test]
    async fn wrong_pin_is_rejected_with_pin_error() {
        let (a, b) = transport_pair().await;
        let local = ServiceDetails::new("a").with_pin("1234");

        let unknown = ServiceDetails::default();

        let (result, _) = tokio::join!(
            exchange(&a, &local, &unknown, TIMEOUT),
            async {
                b.send(&ConnectionPinState::none().into()).await.unwrap();
                let input = ConnectionPinInput {
                    pin: "0000".to_string(),
                };
                b.send(&input.into()).await.unwrap();
            }
        );
        assert!(matches!(result.unwrap_err(), PeerError::PinMismatch));

        assert_eq!(
            b.read_message(TIMEOUT).await.unwrap(),
            ShipMessage::from(ConnectionPinState::required())
        );
        assert_eq!(
            b.read_message(TIMEOUT).await.unwrap(),
            ShipMessage::from(ConnectionPinError {
                error: PIN_ERROR_WRONG_PIN
            })
        );
    }

    #[tokio::test]
    async fn peer_requiring_unknown_pin_fails() {
        let (a, b) = transport_pair().await;
        let none = ServiceDetails::default();

        let (result, _) = tokio::join!(exchange(&a, &none, &none, TIMEOUT), async {
            b.send(&ConnectionPinState::required().into()).await.unwrap();
        });
        assert!(matches!(result.unwrap_err(), PeerError::RemotePinRequired));
    }

    #[tokio::test]
    async fn pin_error_from_peer_is_a_mismatch() {
        let (a, b) = transport_pair().await;
        let remote = ServiceDetails::new("b").with_pin("1111");
        let local = ServiceDetails::new("a").with_pin("2222");

        let (result, _) = tokio::join!(exchange(&a, &local, &remote, TIMEOUT), async {
            b.send(&ConnectionPinState::required().into()).await.unwrap();
            let report = ConnectionPinError {
                error: PIN_ERROR_WRONG_PIN,
            };
            b.send(&report.into()).await.unwrap();
        });
        assert!(matches!(result.unwrap_err(), PeerError::PinMismatch));
    }

    #[tokio::test]
    async fn busy_peer_is_waited_for() {
        let (a, b) = transport_pair().await;
        let none = ServiceDetails::default();
        let remote = ServiceDetails::new("b").with_pin("4321");

        let (result, _) = tokio::join!(exchange(&a, &none, &remote, TIMEOUT), async {
            let busy = ConnectionPinState {
                input_permission: Some(PinInputPermission::Busy),
                ..ConnectionPinState::required()
            };
            b.send(&busy.into()).await.unwrap();
            b.send(&ConnectionPinState::required().into()).await.unwrap();
        });
        assert_eq!(result.unwrap(), PIN_COMPLETE);

        b.read_message(TIMEOUT).await.unwrap();
        assert_eq!(
            b.read_message(TIMEOUT).await.unwrap(),
            ShipMessage::from(ConnectionPinInput {
                pin: "4321".to_string()
            })
        );
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (a, _b) = transport_pair().await;
        let none = ServiceDetails::default();

        let err = exchange(&a, &none, &none, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Timeout(_)));
    }
}
