//! `Channel`: authenticated, length-framed point-to-point transport
//! (spec §4.A, §6.3).

use crate::error::{NetError, Result};
use async_trait::async_trait;
use bft_crypto::Verifier;
use bft_types::{BroadcastData, Envelope, Request, RequestType};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Maximum number of transient connect/send retries before a send gives up
/// (spec §4.A: "Retries connection up to 3 times on transient failure").
const MAX_SEND_RETRIES: u32 = 3;

/// The transport contract any `Channel` implementation must satisfy
/// (spec §6.3). Generic over the concrete byte-oriented transport so that a
/// future QUIC/TLS implementation can plug in without touching callers.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Opens (or reopens) the underlying connection to `ip:port`.
    async fn connect(&mut self, ip: &str, port: u16) -> Result<()>;

    /// Writes a length-prefixed frame. On success the peer has received the
    /// exact bytes.
    async fn send(&mut self, bytes: Bytes) -> Result<()>;

    /// Reads one length-prefixed frame, blocking up to the configured
    /// receive timeout.
    async fn recv_raw_message(&mut self) -> Result<Vec<u8>>;

    /// Sets the receive timeout, in microseconds.
    fn set_recv_timeout(&mut self, micros: u64);

    /// Closes the connection. The channel is only reusable again after
    /// `reinit()` (spec §4.A).
    async fn close(&mut self);

    /// Reopens a closed channel against its last-known address.
    async fn reinit(&mut self) -> Result<()>;

    /// The locally bound port, once listening or connected.
    fn get_binding_port(&self) -> Option<u16>;
}

/// A `Channel` over a persistent `tokio::net::TcpStream`, framed with
/// `tokio_util`'s length-delimited codec.
pub struct TcpChannel {
    addr: Option<(String, u16)>,
    stream: Option<Framed<TcpStream, LengthDelimitedCodec>>,
    recv_timeout: Duration,
}

impl TcpChannel {
    /// Creates a channel with no connection yet established.
    #[must_use]
    pub fn new() -> Self {
        Self {
            addr: None,
            stream: None,
            recv_timeout: Duration::from_secs(5),
        }
    }

    /// Wraps an already-accepted inbound stream (server side of `accept`).
    #[must_use]
    pub fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            addr: Some((peer.ip().to_string(), peer.port())),
            stream: Some(Framed::new(stream, LengthDelimitedCodec::new())),
            recv_timeout: Duration::from_secs(5),
        }
    }

    async fn dial(ip: &str, port: u16) -> Result<Framed<TcpStream, LengthDelimitedCodec>> {
        let stream = TcpStream::connect((ip, port))
            .await
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        Ok(Framed::new(stream, LengthDelimitedCodec::new()))
    }

    /// Builds the signed envelope described by spec §4.A
    /// (`send_request(msg, type, need_response)`), then sends it, retrying
    /// the connection up to `MAX_SEND_RETRIES` times on transient failure.
    pub async fn send_request(
        &mut self,
        verifier: &dyn Verifier,
        request_type: RequestType,
        sender_id: u32,
        msg: Vec<u8>,
        hash: Vec<u8>,
    ) -> Result<()> {
        let data_signature = verifier.sign_message(&msg).ok();
        let mut request = Request::new(request_type, sender_id, msg, hash);
        request.data_signature = data_signature;

        let request_bytes = request
            .encode()
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        let envelope_signature = verifier.sign_message(&request_bytes).ok();
        let envelope = Envelope::new(request_bytes, envelope_signature);
        let bytes = envelope
            .encode()
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;

        self.send_with_retry(Bytes::from(bytes)).await
    }

    async fn send_with_retry(&mut self, bytes: Bytes) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..MAX_SEND_RETRIES {
            match self.send(bytes.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "send failed, retrying");
                    last_err = Some(e);
                    if let Some((ip, port)) = self.addr.clone() {
                        let _ = self.connect(&ip, port).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(NetError::Closed))
    }

    /// Parses a received envelope and, if a verifier is configured, checks
    /// its signature — returning the inner `Request` payload only once that
    /// check passes (spec §4.A).
    pub fn parse_and_verify(
        verifier: Option<&dyn Verifier>,
        raw: &[u8],
    ) -> Result<Request> {
        let envelope =
            Envelope::decode(raw).map_err(|e| NetError::TransportFailure(e.to_string()))?;

        if let Some(verifier) = verifier {
            if let Some(sig) = &envelope.signature {
                if !verifier.verify_message(&envelope.data, sig) {
                    return Err(NetError::InvalidSignature);
                }
            }
        }

        Request::decode(&envelope.data).map_err(|e| NetError::TransportFailure(e.to_string()))
    }

    /// Parses one length-framed wire payload as a [`BroadcastData`] bundle —
    /// the shape every `ReplicaCommunicator` send produces, whether it came
    /// from the batched broadcast drain (many envelopes) or a direct
    /// `send_message`/heartbeat (a bundle of exactly one). Each inner
    /// envelope is verified independently, so one peer's bad signature drops
    /// only that message rather than the whole bundle.
    pub fn parse_and_verify_bundle(
        verifier: Option<&dyn Verifier>,
        raw: &[u8],
    ) -> Result<Vec<std::result::Result<Request, NetError>>> {
        let bundle =
            BroadcastData::decode(raw).map_err(|e| NetError::TransportFailure(e.to_string()))?;
        Ok(bundle
            .envelopes
            .into_iter()
            .map(|envelope| {
                if let Some(verifier) = verifier {
                    if let Some(sig) = &envelope.signature {
                        if !verifier.verify_message(&envelope.data, sig) {
                            return Err(NetError::InvalidSignature);
                        }
                    }
                }
                Request::decode(&envelope.data).map_err(|e| NetError::TransportFailure(e.to_string()))
            })
            .collect())
    }
}

impl Default for TcpChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn connect(&mut self, ip: &str, port: u16) -> Result<()> {
        let framed = Self::dial(ip, port).await?;
        self.stream = Some(framed);
        self.addr = Some((ip.to_string(), port));
        Ok(())
    }

    async fn send(&mut self, bytes: Bytes) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(NetError::Closed)?;
        stream
            .send(bytes)
            .await
            .map_err(|e| NetError::TransportFailure(e.to_string()))
    }

    async fn recv_raw_message(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(NetError::Closed)?;
        let frame = tokio::time::timeout(self.recv_timeout, stream.next())
            .await
            .map_err(|_| NetError::TransportFailure("recv timed out".into()))?
            .ok_or_else(|| NetError::TransportFailure("connection closed by peer".into()))?
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        Ok(frame.to_vec())
    }

    fn set_recv_timeout(&mut self, micros: u64) {
        self.recv_timeout = Duration::from_micros(micros);
    }

    async fn close(&mut self) {
        self.stream = None;
    }

    async fn reinit(&mut self) -> Result<()> {
        let (ip, port) = self.addr.clone().ok_or(NetError::Closed)?;
        self.connect(&ip, port).await
    }

    fn get_binding_port(&self) -> Option<u16> {
        self.stream
            .as_ref()
            .and_then(|s| s.get_ref().local_addr().ok())
            .map(|a| a.port())
    }
}

/// Listens for inbound replica/client connections, yielding one `TcpChannel`
/// per accepted peer.
pub struct TcpListenerChannel {
    listener: TcpListener,
}

impl TcpListenerChannel {
    /// Binds a listener on `addr`.
    pub async fn listen(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        Ok(Self { listener })
    }

    /// Accepts the next inbound connection.
    pub async fn accept(&self) -> Result<(TcpChannel, SocketAddr)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        Ok((TcpChannel::from_stream(stream, peer), peer))
    }

    /// The actual bound local address (useful when `addr`'s port was 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| NetError::TransportFailure(e.to_string()))
    }
}

/// Shared, `Arc`-wrapped verifier alias used throughout the transport layer.
pub type SharedVerifier = Arc<dyn Verifier>;

#[cfg(test)]
mod tests {
    use super::*;
    use bft_crypto::{InMemoryVerifier, Keypair};

    #[tokio::test]
    async fn channel_roundtrip_over_loopback() {
        let listener = TcpListenerChannel::listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut chan, _peer) = listener.accept().await.unwrap();
            chan.recv_raw_message().await.unwrap()
        });

        let mut client = TcpChannel::new();
        client.connect("127.0.0.1", addr.port()).await.unwrap();
        let verifier = InMemoryVerifier::with_signing_key(1, Keypair::generate());
        client
            .send_request(
                &verifier,
                RequestType::Prepare,
                1,
                b"payload".to_vec(),
                vec![9, 9],
            )
            .await
            .unwrap();

        let raw = server.await.unwrap();
        let req = TcpChannel::parse_and_verify(Some(&verifier), &raw).unwrap();
        assert_eq!(req.data, b"payload".to_vec());
        assert_eq!(req.sender_id, 1);
    }

    #[tokio::test]
    async fn parse_rejects_tampered_envelope_signature() {
        let verifier = InMemoryVerifier::with_signing_key(1, Keypair::generate());
        let req = Request::new(RequestType::Commit, 1, vec![1], vec![2]);
        let data = req.encode().unwrap();
        let sig = verifier.sign_message(&data).unwrap();
        let mut envelope = Envelope::new(data, Some(sig));
        envelope.data[0] ^= 0xFF;
        let raw = envelope.encode().unwrap();

        let result = TcpChannel::parse_and_verify(Some(&verifier), &raw);
        assert!(matches!(result, Err(NetError::InvalidSignature)));
    }

    #[tokio::test]
    async fn parse_and_verify_bundle_judges_each_envelope_independently() {
        let verifier = InMemoryVerifier::with_signing_key(1, Keypair::generate());

        let good_req = Request::new(RequestType::Prepare, 1, vec![1], vec![9]);
        let good_data = good_req.encode().unwrap();
        let good_sig = verifier.sign_message(&good_data).unwrap();
        let good_envelope = Envelope::new(good_data, Some(good_sig));

        let bad_req = Request::new(RequestType::Commit, 1, vec![2], vec![8]);
        let bad_data = bad_req.encode().unwrap();
        let bad_sig = verifier.sign_message(&bad_data).unwrap();
        let mut bad_envelope = Envelope::new(bad_data, Some(bad_sig));
        bad_envelope.data[0] ^= 0xFF;

        let bundle = bft_types::BroadcastData::from_envelopes(vec![good_envelope, bad_envelope]);
        let raw = bundle.encode().unwrap();

        let results = TcpChannel::parse_and_verify_bundle(Some(&verifier), &raw).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(NetError::InvalidSignature)));
    }
}
