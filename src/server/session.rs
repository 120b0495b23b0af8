//! One relay session: the lock-step exchange loop for a single connection.
//!
//! A session alternates between waiting for a header and running one
//! exchange. The wait has no deadline so forwarders may hold idle
//! connections open between detections; every step of an exchange is bound
//! by [`SessionConfig::io_timeout`].

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use log::{debug, info};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite},
    select,
};
use tokio_util::sync::CancellationToken;

use super::SessionError;
use crate::{
    codec::{DEFAULT_MAX_PAYLOAD_LEN, FrameHeader, FramingError, MAX_HEADER_LEN, READY_TOKEN},
    detection::{DecodeError, Envelope},
    metrics,
    store::ArtifactStore,
    transport::{self, DEFAULT_IO_TIMEOUT, TransportError},
};

/// Per-session limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for each socket operation within an exchange.
    pub io_timeout: Duration,
    /// Largest payload a header may announce.
    pub max_payload_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            io_timeout: DEFAULT_IO_TIMEOUT,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

/// Counters reported when a session ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Headers received.
    pub requests: u64,
    /// Detections stored and acknowledged.
    pub stored: u64,
}

pub(super) struct Session<S> {
    stream: S,
    peer_addr: Option<SocketAddr>,
    store: Arc<ArtifactStore>,
    config: SessionConfig,
    summary: SessionSummary,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(super) fn new(
        stream: S,
        peer_addr: Option<SocketAddr>,
        store: Arc<ArtifactStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            store,
            config,
            summary: SessionSummary::default(),
        }
    }

    /// Serve exchanges until the peer closes the connection or `shutdown`
    /// fires while the session is idle.
    ///
    /// An exchange already in progress is finished before the shutdown is
    /// honoured.
    pub(super) async fn run(
        mut self,
        shutdown: CancellationToken,
    ) -> Result<SessionSummary, SessionError> {
        let mut buf = [0u8; MAX_HEADER_LEN];
        loop {
            let read = select! {
                biased;

                () = shutdown.cancelled() => {
                    debug!("session closed by shutdown: peer_addr={:?}", self.peer_addr);
                    return Ok(self.summary);
                }
                res = self.stream.read(&mut buf) => res.map_err(TransportError::from)?,
            };
            if read == 0 {
                debug!("peer closed session: peer_addr={:?}", self.peer_addr);
                return Ok(self.summary);
            }
            self.summary.requests += 1;
            let header = FrameHeader::decode(&buf[..read])?;
            self.exchange(&header).await?;
        }
    }

    async fn exchange(&mut self, header: &FrameHeader) -> Result<(), SessionError> {
        let limit = self.config.io_timeout;
        if header.length() > self.config.max_payload_len {
            return Err(FramingError::PayloadTooLarge {
                length: header.length(),
                max: self.config.max_payload_len,
            }
            .into());
        }

        transport::write_all(&mut self.stream, READY_TOKEN, limit, "ready token").await?;

        let mut payload = BytesMut::new();
        transport::read_payload(
            &mut self.stream,
            &mut payload,
            header.length(),
            limit,
            "payload read",
        )
        .await?;

        let envelope = Envelope::from_json(&payload)?;
        if envelope.uuid != header.id() {
            return Err(DecodeError::IdMismatch {
                header: header.id().to_owned(),
                envelope: envelope.uuid,
            }
            .into());
        }
        let detection = envelope.into_detection()?;
        let artifact = self.store.store(&detection).await?;
        metrics::inc_artifacts();

        transport::write_all(&mut self.stream, header.id().as_bytes(), limit, "receipt").await?;
        self.summary.stored += 1;
        info!(
            "detection stored: request={}, id={}, size={}, image={:?}, peer_addr={:?}",
            self.summary.requests,
            detection.id,
            header.length(),
            artifact.image,
            self.peer_addr
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use firerelay_testing::{LoggerHandle, logger};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    use super::*;
    use crate::{
        codec::encode,
        detection::{Detection, Image, Telemetry},
        store::{IMAGERY_DIR, TELEMETRY_DIR},
    };

    const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0, 1, 2, 3, 4, 5, 0xff, 0xd9];

    #[fixture]
    fn root() -> TempDir { TempDir::new().expect("create temp dir") }

    fn detection(id: &str) -> Detection {
        let telemetry = Telemetry {
            captured_at: 1_700_000_000_000_000,
            latitude: 34.05,
            longitude: -118.25,
            altitude: 100.0,
            ..Telemetry::default()
        };
        Detection::new(id, telemetry, 87.5, Image::new(JPEG, "jpg").expect("image"))
    }

    fn start(
        root: &Path,
        config: SessionConfig,
    ) -> (
        DuplexStream,
        CancellationToken,
        tokio::task::JoinHandle<Result<SessionSummary, SessionError>>,
    ) {
        let (client, server) = duplex(64 * 1024);
        let store = Arc::new(ArtifactStore::new(root));
        let shutdown = CancellationToken::new();
        let session = Session::new(server, None, store, config);
        let handle = tokio::spawn(session.run(shutdown.clone()));
        (client, shutdown, handle)
    }

    async fn read_exactly(client: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        client.read_exact(&mut buf).await.expect("read");
        buf
    }

    async fn send(client: &mut DuplexStream, detection: &Detection) -> Vec<u8> {
        let frame = encode(detection).expect("encode");
        client.write_all(&frame.header.to_bytes()).await.expect("header");
        assert_eq!(read_exactly(client, READY_TOKEN.len()).await, READY_TOKEN);
        client.write_all(&frame.payload).await.expect("payload");
        read_exactly(client, detection.id.len()).await
    }

    fn artifact_count(root: &Path) -> usize {
        [TELEMETRY_DIR, IMAGERY_DIR]
            .iter()
            .map(|dir| std::fs::read_dir(root.join(dir)).map_or(0, Iterator::count))
            .sum()
    }

    #[rstest]
    #[tokio::test]
    async fn stores_and_acknowledges_detection(root: TempDir) {
        let (mut client, _shutdown, handle) = start(root.path(), SessionConfig::default());

        assert_eq!(send(&mut client, &detection("a1")).await, b"a1");
        drop(client);

        let summary = handle.await.expect("join").expect("session");
        assert_eq!(summary, SessionSummary { requests: 1, stored: 1 });
        let image = std::fs::read(root.path().join(IMAGERY_DIR).join("a1.jpg")).expect("image");
        assert_eq!(image, JPEG);
        assert!(root.path().join(TELEMETRY_DIR).join("a1").is_file());
    }

    #[rstest]
    #[tokio::test]
    async fn serves_sequential_detections_on_one_connection(root: TempDir) {
        let (mut client, _shutdown, handle) = start(root.path(), SessionConfig::default());

        assert_eq!(send(&mut client, &detection("first")).await, b"first");
        assert_eq!(send(&mut client, &detection("second")).await, b"second");
        drop(client);

        let summary = handle.await.expect("join").expect("session");
        assert_eq!(summary.stored, 2);
        assert_eq!(artifact_count(root.path()), 4);
    }

    #[rstest]
    #[tokio::test]
    async fn stored_log_carries_request_count(root: TempDir, mut logger: LoggerHandle) {
        let (mut client, _shutdown, handle) = start(root.path(), SessionConfig::default());

        assert_eq!(send(&mut client, &detection("log-one")).await, b"log-one");
        assert_eq!(send(&mut client, &detection("log-two")).await, b"log-two");
        drop(client);
        handle.await.expect("join").expect("session");

        let mut stored = Vec::new();
        while let Some(record) = logger.pop() {
            let message = record.args().to_string();
            if message.starts_with("detection stored:") && message.contains("id=log-") {
                stored.push(message);
            }
        }
        assert_eq!(stored.len(), 2, "stored lines: {stored:?}");
        assert!(stored.iter().any(|m| m.contains("request=1, id=log-one")));
        assert!(stored.iter().any(|m| m.contains("request=2, id=log-two")));
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_header_ends_session_without_ack(root: TempDir) {
        let (mut client, _shutdown, handle) = start(root.path(), SessionConfig::default());
        client.write_all(b"a1;100").await.expect("write");

        let err = handle.await.expect("join").expect_err("header must be rejected");
        assert!(matches!(
            err,
            SessionError::Framing(FramingError::MissingFields { found: 1 })
        ));
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.expect("read");
        assert!(rest.is_empty());
        assert_eq!(artifact_count(root.path()), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn short_payload_is_not_stored(root: TempDir) {
        let (mut client, _shutdown, handle) = start(root.path(), SessionConfig::default());
        client.write_all(b"a1,100").await.expect("write");
        assert_eq!(read_exactly(&mut client, READY_TOKEN.len()).await, READY_TOKEN);
        client.write_all(b"{\"uuid\":").await.expect("write");
        client.shutdown().await.expect("shutdown");

        let err = handle.await.expect("join").expect_err("short payload must fail");
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Closed { received: 8, expected: 100, .. })
        ));
        assert_eq!(artifact_count(root.path()), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_json_is_rejected(root: TempDir) {
        let (mut client, _shutdown, handle) = start(root.path(), SessionConfig::default());
        client.write_all(b"a1,4").await.expect("write");
        assert_eq!(read_exactly(&mut client, READY_TOKEN.len()).await, READY_TOKEN);
        client.write_all(b"nope").await.expect("write");

        let err = handle.await.expect("join").expect_err("payload must be rejected");
        assert!(matches!(err, SessionError::Decode(DecodeError::Json(_))));
        assert_eq!(artifact_count(root.path()), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn envelope_id_must_match_header(root: TempDir) {
        let (mut client, _shutdown, handle) = start(root.path(), SessionConfig::default());
        let frame = encode(&detection("b2")).expect("encode");
        let header = FrameHeader::new("a1", frame.payload.len()).expect("header");
        client.write_all(&header.to_bytes()).await.expect("write");
        assert_eq!(read_exactly(&mut client, READY_TOKEN.len()).await, READY_TOKEN);
        client.write_all(&frame.payload).await.expect("write");

        let err = handle.await.expect("join").expect_err("mismatch must be rejected");
        assert!(matches!(err, SessionError::Decode(DecodeError::IdMismatch { .. })));
        assert_eq!(artifact_count(root.path()), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn oversized_payload_is_refused_before_ready(root: TempDir) {
        let config = SessionConfig {
            max_payload_len: 16,
            ..SessionConfig::default()
        };
        let (mut client, _shutdown, handle) = start(root.path(), config);
        client.write_all(b"a1,17").await.expect("write");

        let err = handle.await.expect("join").expect_err("length must be refused");
        assert!(matches!(
            err,
            SessionError::Framing(FramingError::PayloadTooLarge { length: 17, max: 16 })
        ));
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.expect("read");
        assert!(rest.is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn stalled_payload_times_out(root: TempDir) {
        let config = SessionConfig {
            io_timeout: Duration::from_millis(100),
            ..SessionConfig::default()
        };
        let (mut client, _shutdown, handle) = start(root.path(), config);
        client.write_all(b"a1,10").await.expect("write");
        assert_eq!(read_exactly(&mut client, READY_TOKEN.len()).await, READY_TOKEN);

        let err = handle.await.expect("join").expect_err("stall must time out");
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Timeout { operation: "payload read", .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn idle_session_stops_on_shutdown(root: TempDir) {
        let (_client, shutdown, handle) = start(root.path(), SessionConfig::default());
        shutdown.cancel();
        let summary = handle.await.expect("join").expect("session");
        assert_eq!(summary, SessionSummary::default());
    }
}
