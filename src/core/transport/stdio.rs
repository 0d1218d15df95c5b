//! STDIO transport implementation.
//!
//! Standard input/output transport - the default mode. The process serves a
//! single session and exits when stdin closes. Because that session is the
//! whole process, a broken stream is reported as a transport error.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use super::{TransportError, TransportResult};
use crate::core::{CloseReason, ToolServer};

/// STDIO transport handler.
pub struct StdioTransport;

impl StdioTransport {
    /// Run the STDIO transport.
    pub async fn run(server: ToolServer) -> TransportResult<()> {
        info!("Ready - communicating via stdin/stdout");
        serve_session(server, tokio::io::stdin(), tokio::io::stdout()).await
    }
}

/// Serve the single session and turn an abnormal close into an error.
async fn serve_session<R, W>(server: ToolServer, reader: R, writer: W) -> TransportResult<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let summary = server.serve(reader, writer).await;

    info!(
        requests = summary.requests,
        cancelled = summary.cancelled,
        "STDIO transport finished: {}", summary.close_reason
    );

    match summary.close_reason {
        CloseReason::EndOfStream => Ok(()),
        CloseReason::ReadFailed(err) => Err(TransportError::from(err)),
        CloseReason::WriteFailed(reason) => Err(TransportError::output(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::core::transport::FrameError;

    fn test_server() -> ToolServer {
        let mut config = Config::default();
        config.announce_capabilities = false;
        ToolServer::new(config)
    }

    #[tokio::test]
    async fn test_clean_end_of_input_is_ok() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"id\":1,\"method\":\"list_tools\"}\n")
            .build();
        let (writer, _output) = tokio::io::duplex(4096);

        let result = serve_session(test_server(), reader, writer).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_truncated_input_is_a_transport_error() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"id\":1,\"method\"")
            .build();
        let (writer, _output) = tokio::io::duplex(4096);

        let result = serve_session(test_server(), reader, writer).await;
        assert!(matches!(
            result,
            Err(TransportError::FrameError(FrameError::Truncated { .. }))
        ));
    }
}
