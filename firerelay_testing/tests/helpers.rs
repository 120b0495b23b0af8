//! Integration coverage for the `firerelay_testing` helpers.

use firerelay_testing::{JPEG_STUB, RunningServer, TestResult, sample_detection};

#[tokio::test]
async fn raw_peer_stores_detection() -> TestResult {
    let server = RunningServer::start().await?;
    let mut peer = server.raw_peer().await?;
    let receipt = peer.send_detection(&sample_detection("helper-1")).await?;
    if receipt != b"helper-1" {
        return Err(format!("unexpected receipt: {receipt:?}").into());
    }
    drop(peer);

    let root = server.stop().await?;
    let image = std::fs::read(root.path().join("imagery/helper-1.jpg"))?;
    if image != JPEG_STUB {
        return Err("stored image differs from the sample".into());
    }
    Ok(())
}
