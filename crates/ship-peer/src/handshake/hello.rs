//! Connection hello: both sides announce readiness. A side that needs more
//! time sends `pending` with a prolongation request, which pushes our
//! deadline out by the configured prolongation.

use std::time::Duration;

use ship_frame::{ConnectionHello, ConnectionHelloPhase, ShipMessage};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::unexpected;
use crate::error::{PeerError, Result};
use crate::transport::Transport;

pub(crate) async fn exchange(
    transport: &Transport,
    timeout: Duration,
    prolongation: Duration,
) -> Result<()> {
    transport.send(&ConnectionHello::ready(timeout).into()).await?;

    let mut deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return abort(transport, PeerError::Timeout(timeout)).await;
        }

        let hello = match transport.read_message(remaining).await {
            Ok(ShipMessage::ConnectionHello(hello)) => hello,
            Ok(other) => {
                let err = unexpected(transport, &other, "connectionHello").await;
                return abort(transport, err).await;
            }
            Err(PeerError::Timeout(_)) => {
                return abort(transport, PeerError::Timeout(timeout)).await;
            }
            Err(err) => return Err(err),
        };

        match hello.phase {
            ConnectionHelloPhase::Ready => {
                debug!(transport = transport.id(), "peer ready");
                return Ok(());
            }
            ConnectionHelloPhase::Aborted => {
                return Err(PeerError::Aborted("peer aborted connection hello".to_string()));
            }
            ConnectionHelloPhase::Pending if hello.requests_prolongation() => {
                deadline += prolongation;
                let remaining = deadline.saturating_duration_since(Instant::now());
                debug!(
                    transport = transport.id(),
                    ?remaining,
                    "peer requested prolongation"
                );
                transport.send(&ConnectionHello::ready(remaining).into()).await?;
            }
            ConnectionHelloPhase::Pending => {
                trace!(transport = transport.id(), waiting = ?hello.waiting, "peer pending");
            }
        }
    }
}

async fn abort(transport: &Transport, err: PeerError) -> Result<()> {
    if transport.is_closed() {
        return Err(err);
    }
    if let Err(send_err) = transport.send(&ConnectionHello::aborted().into()).await {
        debug!(transport = transport.id(), error = %send_err, "hello abort not sent");
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::tests::transport_pair;

    async fn expect_hello(transport: &Transport) -> ConnectionHello {
        match transport.read_message(Duration::from_secs(2)).await.unwrap() {
            ShipMessage::ConnectionHello(hello) => hello,
            other => panic!("expected hello, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn both_sides_ready() {
        let (a, b) = transport_pair().await;
        let timeout = Duration::from_secs(1);

        let (ra, rb) = tokio::join!(
            exchange(&a, timeout, timeout),
            exchange(&b, timeout, timeout)
        );
        ra.unwrap();
        rb.unwrap();
    }

    #[tokio::test]
    async fn ready_hello_carries_waiting_millis() {
        let (a, b) = transport_pair().await;

        let (result, _) = tokio::join!(
            exchange(&a, Duration::from_millis(1500), Duration::from_secs(1)),
            async {
                let hello = expect_hello(&b).await;
                assert_eq!(hello.phase, ConnectionHelloPhase::Ready);
                assert_eq!(hello.waiting, Some(1500));
                b.send(&ConnectionHello::ready(Duration::from_secs(1)).into())
                    .await
                    .unwrap();
            }
        );
        result.unwrap();
    }

    #[tokio::test]
    async fn silent_peer_times_out_and_gets_abort() {
        let (a, b) = transport_pair().await;
        let timeout = Duration::from_millis(100);

        let err = exchange(&a, timeout, timeout).await.unwrap_err();
        assert!(matches!(err, PeerError::Timeout(d) if d == timeout));

        assert_eq!(expect_hello(&b).await.phase, ConnectionHelloPhase::Ready);
        assert_eq!(expect_hello(&b).await.phase, ConnectionHelloPhase::Aborted);
    }

    #[tokio::test]
    async fn prolongation_extends_deadline_repeatedly() {
        let (a, b) = transport_pair().await;
        let timeout = Duration::from_millis(300);
        let prolongation = Duration::from_millis(300);

        let started = Instant::now();
        let (result, _) = tokio::join!(exchange(&a, timeout, prolongation), async {
            expect_hello(&b).await;
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                b.send(&ConnectionHello::pending(Duration::from_secs(1), true).into())
                    .await
                    .unwrap();
                let reply = expect_hello(&b).await;
                assert_eq!(reply.phase, ConnectionHelloPhase::Ready);
                assert!(reply.waiting.is_some());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            b.send(&ConnectionHello::ready(Duration::from_secs(1)).into())
                .await
                .unwrap();
        });
        result.unwrap();
        assert!(started.elapsed() > timeout + prolongation);
    }

    #[tokio::test]
    async fn pending_without_prolongation_does_not_extend() {
        let (a, b) = transport_pair().await;
        let timeout = Duration::from_millis(200);

        let (result, _) = tokio::join!(exchange(&a, timeout, timeout), async {
            expect_hello(&b).await;
            b.send(&ConnectionHello::pending(Duration::from_secs(1), false).into())
                .await
                .unwrap();
        });
        assert!(matches!(result.unwrap_err(), PeerError::Timeout(_)));
    }

    #[tokio::test]
    async fn peer_abort_fails_the_phase() {
        let (a, b) = transport_pair().await;

        let (result, _) = tokio::join!(
            exchange(&a, Duration::from_secs(1), Duration::from_secs(1)),
            async {
                expect_hello(&b).await;
                b.send(&ConnectionHello::aborted().into()).await.unwrap();
            }
        );
        assert!(matches!(result.unwrap_err(), PeerError::Aborted(_)));
    }

    #[tokio::test]
    async fn other_message_is_a_violation() {
        let (a, b) = transport_pair().await;

        let (result, _) = tokio::join!(
            exchange(&a, Duration::from_secs(1), Duration::from_secs(1)),
            async {
                expect_hello(&b).await;
                b.send(&ship_frame::AccessMethodsRequest {}.into())
                    .await
                    .unwrap();
            }
        );
        assert!(matches!(
            result.unwrap_err(),
            PeerError::ProtocolViolation(_)
        ));
    }
}
