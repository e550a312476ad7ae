//! One authenticated stream to a pod
//!
//! Frames are JSON (or the bare auth secret) followed by the sentinel. The
//! reader accumulates bytes until the sentinel shows up or the read deadline
//! passes; bytes after a sentinel stay buffered for the next read.

use crate::config::AuthMode;
use crate::transport::TransportSettings;
use crate::{Result, SwarmError};
use bytes::{Buf, BytesMut};
use podswarm_common::{Endpoint, AUTH_SUCCESS_MARKER};
use podswarm_proto::{
    encode_auth, encode_frame, find_sentinel, parse_planets, Command, CubeList, JointsForCube,
    Planet,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, trace};

const READ_CHUNK: usize = 1024;

/// Result of reading one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The sentinel was seen; payload is everything before it
    Complete(String),
    /// The read deadline passed first; payload is whatever arrived
    TimedOut(String),
    /// The peer closed the stream first; payload is whatever arrived
    Closed(String),
}

impl Reply {
    pub fn payload(&self) -> &str {
        match self {
            Reply::Complete(p) | Reply::TimedOut(p) | Reply::Closed(p) => p,
        }
    }

    pub fn into_payload(self) -> String {
        match self {
            Reply::Complete(p) | Reply::TimedOut(p) | Reply::Closed(p) => p,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Reply::Complete(_))
    }

    /// Payload of a complete frame, or a protocol error naming what was awaited
    pub fn into_complete(self, endpoint: &Endpoint, what: &str) -> Result<String> {
        match self {
            Reply::Complete(p) => Ok(p),
            Reply::TimedOut(p) => Err(SwarmError::Protocol(format!(
                "{} timed out waiting for {} (partial: {:?})",
                endpoint, what, p
            ))),
            Reply::Closed(p) => Err(SwarmError::Protocol(format!(
                "{} closed the connection before {} (partial: {:?})",
                endpoint, what, p
            ))),
        }
    }
}

/// A stream owned by exactly one task; dropping it closes the socket
pub struct Connection<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    endpoint: Endpoint,
    settings: Arc<TransportSettings>,
}

impl Connection<TcpStream> {
    /// Dial `endpoint`, bounded by the configured dial timeout
    pub async fn dial(endpoint: &Endpoint, settings: Arc<TransportSettings>) -> Result<Self> {
        let addr = endpoint.to_string();
        debug!(endpoint = %addr, "Dialing pod");

        let stream = match timeout(settings.dial_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(SwarmError::connectivity(&addr, e)),
            Err(_) => {
                return Err(SwarmError::connectivity(
                    &addr,
                    format!("dial timed out after {:?}", settings.dial_timeout),
                ))
            }
        };
        stream.set_nodelay(true).ok();

        Ok(Self::from_stream(stream, endpoint.clone(), settings))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn from_stream(stream: S, endpoint: Endpoint, settings: Arc<TransportSettings>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            endpoint,
            settings,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send the shared secret and check the reply according to `mode`
    pub async fn authenticate(&mut self, mode: AuthMode) -> Result<()> {
        let frame = encode_auth(&self.settings.secret, &self.settings.sentinel);
        self.check_body(&frame, "auth secret")?;
        self.write_frame(&frame).await?;

        let reply = self.read_reply().await?;
        match mode {
            AuthMode::Strict => {
                if !reply.is_complete() || !reply.payload().contains(AUTH_SUCCESS_MARKER) {
                    return Err(SwarmError::Protocol(format!(
                        "authentication rejected by {}: {:?}",
                        self.endpoint,
                        reply.payload()
                    )));
                }
            }
            AuthMode::Lenient => {
                trace!(endpoint = %self.endpoint, reply = reply.payload(), "Auth reply ignored");
            }
        }
        Ok(())
    }

    /// Write one command frame
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        let frame = encode_frame(command, &self.settings.sentinel)?;
        self.check_body(&frame, command.kind())?;
        trace!(endpoint = %self.endpoint, kind = command.kind(), "Sending command");
        self.write_frame(&frame).await
    }

    /// The host splits on the first sentinel, so a body carrying one would arrive torn
    fn check_body(&self, frame: &[u8], what: &str) -> Result<()> {
        let sentinel = self.settings.sentinel.as_bytes();
        let body = &frame[..frame.len().saturating_sub(sentinel.len())];
        if find_sentinel(body, sentinel).is_some() {
            return Err(SwarmError::Validation(format!(
                "{} for {} contains the frame sentinel",
                what, self.endpoint
            )));
        }
        Ok(())
    }

    /// Send `command` and read exactly one reply
    pub async fn request(&mut self, command: &Command) -> Result<Reply> {
        self.send(command).await?;
        self.read_reply().await
    }

    /// Send `command`, reading a reply only when the host sends one
    pub async fn execute(&mut self, command: &Command) -> Result<Option<Reply>> {
        self.send(command).await?;
        if command.expects_reply() {
            Ok(Some(self.read_reply().await?))
        } else {
            Ok(None)
        }
    }

    /// Read until the sentinel, the deadline, or end of stream
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let sentinel = self.settings.sentinel.clone();
        let deadline = Instant::now() + self.settings.read_timeout;

        loop {
            if let Some(pos) = find_sentinel(&self.buffer, sentinel.as_bytes()) {
                let frame = self.buffer.split_to(pos);
                self.buffer.advance(sentinel.len());
                return Ok(Reply::Complete(decode(&frame)));
            }

            self.buffer.reserve(READ_CHUNK);
            match timeout_at(deadline, self.stream.read_buf(&mut self.buffer)).await {
                Ok(Ok(0)) => return Ok(Reply::Closed(self.drain())),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(SwarmError::connectivity(&self.endpoint, e)),
                Err(_) => {
                    debug!(endpoint = %self.endpoint, "Read deadline elapsed");
                    return Ok(Reply::TimedOut(self.drain()));
                }
            }
        }
    }

    /// Names of every cube the pod currently reports
    pub async fn cube_list(&mut self) -> Result<Vec<String>> {
        let payload = self
            .request(&Command::GetCubeList)
            .await?
            .into_complete(&self.endpoint, "cube list")?;
        let list = CubeList::parse(&payload)
            .map_err(|e| SwarmError::Protocol(format!("malformed cube list: {}", e)))?;
        Ok(list.cubes)
    }

    pub async fn planets(&mut self) -> Result<Vec<Planet>> {
        let payload = self
            .request(&Command::GetPlanets)
            .await?
            .into_complete(&self.endpoint, "planet list")?;
        parse_planets(&payload)
            .map_err(|e| SwarmError::Protocol(format!("malformed planet list: {}", e)))
    }

    /// Joint names the pod associates with `cube`
    pub async fn joints_for_cube(&mut self, cube: &str) -> Result<Vec<String>> {
        let command = Command::GetJointsForCube {
            cube_name: cube.to_string(),
        };
        let payload = self
            .request(&command)
            .await?
            .into_complete(&self.endpoint, "joint list")?;
        let reply: JointsForCube = serde_json::from_str(&payload)
            .map_err(|e| SwarmError::Protocol(format!("malformed joint list for {}: {}", cube, e)))?;
        Ok(reply.joints)
    }

    /// Flush and shut down the write half
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.stream
            .write_all(frame)
            .await
            .map_err(|e| SwarmError::connectivity(&self.endpoint, e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| SwarmError::connectivity(&self.endpoint, e))
    }

    fn drain(&mut self) -> String {
        let rest = self.buffer.split();
        decode(&rest)
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use podswarm_common::Vec3;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    fn settings(read_ms: u64) -> Arc<TransportSettings> {
        Arc::new(TransportSettings {
            secret: "pw".into(),
            sentinel: "<END>".into(),
            dial_timeout: Duration::from_millis(100),
            read_timeout: Duration::from_millis(read_ms),
        })
    }

    fn pair(read_ms: u64) -> (Connection<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(4096);
        let conn = Connection::from_stream(client, Endpoint::new("test", 1), settings(read_ms));
        (conn, server)
    }

    #[tokio::test]
    async fn test_complete_frame_is_trimmed() {
        let (mut conn, mut server) = pair(500);
        server.write_all(b"  {\"ok\":true}\n<END>").await.unwrap();
        let reply = conn.read_reply().await.unwrap();
        assert_eq!(reply, Reply::Complete("{\"ok\":true}".into()));
    }

    #[tokio::test]
    async fn test_coalesced_frames_are_split() {
        let (mut conn, mut server) = pair(500);
        server.write_all(b"first<END>second<END>").await.unwrap();
        assert_eq!(conn.read_reply().await.unwrap(), Reply::Complete("first".into()));
        assert_eq!(conn.read_reply().await.unwrap(), Reply::Complete("second".into()));
    }

    #[tokio::test]
    async fn test_sentinel_split_across_writes() {
        let (mut conn, mut server) = pair(500);
        let writer = tokio::spawn(async move {
            server.write_all(b"payload<EN").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"D>").await.unwrap();
            server
        });
        assert_eq!(conn.read_reply().await.unwrap(), Reply::Complete("payload".into()));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_deadline_returns_partial() {
        let (mut conn, mut server) = pair(50);
        server.write_all(b"half a mess").await.unwrap();
        let reply = conn.read_reply().await.unwrap();
        assert_eq!(reply, Reply::TimedOut("half a mess".into()));
        assert!(!reply.is_complete());
    }

    #[tokio::test]
    async fn test_closed_stream_returns_partial() {
        let (mut conn, mut server) = pair(500);
        server.write_all(b"bye").await.unwrap();
        drop(server);
        assert_eq!(conn.read_reply().await.unwrap(), Reply::Closed("bye".into()));
    }

    #[tokio::test]
    async fn test_send_appends_sentinel() {
        let (mut conn, mut server) = pair(500);
        conn.send(&Command::GetCubeList).await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], br#"{"type":"get_cube_list"}<END>"#);
    }

    #[tokio::test]
    async fn test_sentinel_in_name_is_rejected_before_writing() {
        let (mut conn, mut server) = pair(500);
        let err = conn
            .send(&Command::spawn_base("evil<END>name", Vec3::ZERO))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);

        let mut buf = vec![0u8; 64];
        let read = tokio::time::timeout(Duration::from_millis(50), server.read(&mut buf)).await;
        assert!(read.is_err(), "nothing may reach the host");
    }

    #[tokio::test]
    async fn test_strict_auth_requires_marker() {
        let (mut conn, mut server) = pair(200);
        server.write_all(b"denied<END>").await.unwrap();
        let err = conn.authenticate(AuthMode::Strict).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);

        let (mut conn, mut server) = pair(200);
        server.write_all(b"{\"status\":\"auth_success\"}<END>").await.unwrap();
        conn.authenticate(AuthMode::Strict).await.unwrap();
    }

    #[tokio::test]
    async fn test_cube_list_drops_non_strings() {
        let (mut conn, mut server) = pair(500);
        server
            .write_all(br#"{"cubes":["a_BASE",7,"b_BASE",null]}<END>"#)
            .await
            .unwrap();
        assert_eq!(conn.cube_list().await.unwrap(), vec!["a_BASE", "b_BASE"]);
    }

    #[tokio::test]
    async fn test_malformed_planets_is_protocol_error() {
        let (mut conn, mut server) = pair(500);
        server.write_all(b"[1,2,3]<END>").await.unwrap();
        let err = conn.planets().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_lenient_auth_ignores_reply() {
        let (mut conn, _server) = pair(30);
        conn.authenticate(AuthMode::Lenient).await.unwrap();
    }
}
