//! TCP transport implementation.
//!
//! Raw TCP socket transport with newline-delimited JSON messages. Every
//! accepted connection gets its own independent session.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use super::{TransportError, TransportResult, config::TcpConfig};
use crate::core::ToolServer;

/// TCP transport handler.
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    /// Create a new TCP transport with the given config.
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Run the TCP transport.
    ///
    /// Fails only when the listener cannot be bound.
    pub async fn run(self, server: ToolServer) -> TransportResult<()> {
        let addr = self.config.listen.address();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!("Ready - listening on {} (newline-delimited JSON over TCP)", addr);

        accept_loop(listener, server).await
    }
}

/// Accept connections forever; accept errors are logged and retried.
async fn accept_loop(listener: TcpListener, server: ToolServer) -> TransportResult<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("Accepted connection from {}", peer_addr);

                // Set TCP_NODELAY to disable Nagle's algorithm
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                }

                let server_clone = server.clone();
                tokio::spawn(async move {
                    handle_connection(server_clone, stream, peer_addr).await;
                });
            }
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                // Small delay to avoid spinning on persistent errors
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        }
    }
}

/// Handle a single TCP connection.
async fn handle_connection(server: ToolServer, stream: TcpStream, peer_addr: SocketAddr) {
    let (reader, writer) = stream.into_split();
    let summary = server.serve(reader, writer).await;

    info!(
        requests = summary.requests,
        protocol_errors = summary.protocol_errors,
        "Client {} disconnected: {}",
        peer_addr,
        summary.close_reason
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::core::transport::config::ListenConfig;
    use crate::domains::tools::register_builtin_tools;
    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn test_server() -> ToolServer {
        let mut config = Config::default();
        config.announce_capabilities = false;
        let server = ToolServer::new(config);
        register_builtin_tools(server.registry()).unwrap();
        server
    }

    async fn start() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(accept_loop(listener, test_server()));
        addr
    }

    async fn round_trip(addr: SocketAddr, line: &str) -> Value {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(line.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();

        let mut reader = BufReader::new(reader);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        serde_json::from_str(&response).unwrap()
    }

    #[tokio::test]
    async fn test_tcp_sessions_are_independent() {
        let addr = start().await;

        let (a, b) = tokio::join!(
            round_trip(
                addr,
                r#"{"id":1,"method":"call_tool","params":{"name":"get_weather","arguments":{"city":"Lima"}}}"#
            ),
            round_trip(addr, r#"{"id":1,"method":"list_tools"}"#),
        );

        assert_eq!(a["id"], 1);
        assert_eq!(a["result"]["content"][0]["text"], "Lima: sunny");
        assert_eq!(b["id"], 1);
        assert_eq!(b["result"]["tools"][0]["name"], "get_weather");
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let transport = TcpTransport::new(TcpConfig {
            listen: ListenConfig::new("127.0.0.1", port),
        });
        let result = transport.run(test_server()).await;
        assert!(matches!(result, Err(TransportError::BindError { .. })));
    }

    #[test]
    fn test_default_address() {
        assert_eq!(TcpConfig::default().listen.address(), "127.0.0.1:3000");
    }
}
