//! Server state and connection lifecycle.
//!
//! A [`ToolServer`] owns the configuration and the tool registry. Every
//! connection handed to [`ToolServer::serve`] gets its own session:
//!
//! - frames are read one at a time and decoded;
//! - each request runs in its own task, bounded by `max_in_flight`;
//! - responses funnel through a single writer task, so frames never
//!   interleave, and are written in completion order;
//! - when the inbound stream ends, in-flight requests get a grace period,
//!   after which the rest are answered with a cancellation error.
//!
//! **Adding a new tool does NOT require modifying this file!** Register it on
//! [`ToolServer::registry`].

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use super::config::Config;
use super::dispatcher::Dispatcher;
use super::interceptor::{CallLogInterceptor, InterceptorChain, ToolInterceptor};
use super::protocol::{
    NotificationMessage, OutboundMessage, PROTOCOL_VERSION, ProtocolError, RequestId,
    RequestMessage, ResponseMessage, methods,
};
use super::transport::TransportService;
use super::transport::framing::{FrameError, FrameReader, FrameWriter};
use crate::domains::tools::{ToolRegistry, register_builtin_tools};

/// State shared by every connection and request.
pub struct ServerState {
    config: Config,
    registry: ToolRegistry,
    interceptors: InterceptorChain,
}

impl ServerState {
    pub fn new(config: Config, registry: ToolRegistry) -> Self {
        Self {
            config,
            registry,
            interceptors: InterceptorChain::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Capability document describing this server.
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.config.server.name.clone(),
            version: self.config.server.version.clone(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                methods: methods::ALL.iter().map(|m| m.to_string()).collect(),
                tools: ToolsCapability {
                    count: self.registry.len(),
                },
            },
        }
    }
}

/// Capability document sent in the announcement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capabilities {
    pub methods: Vec<String>,
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolsCapability {
    pub count: usize,
}

/// Why a connection ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its side of the stream.
    EndOfStream,
    /// Reading failed or the stream ended inside a frame.
    ReadFailed(FrameError),
    /// The outbound side could not be written.
    WriteFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("end of stream"),
            Self::ReadFailed(err) => write!(f, "read failed: {}", err),
            Self::WriteFailed(err) => write!(f, "write failed: {}", err),
        }
    }
}

/// What happened on one connection.
#[derive(Debug)]
pub struct ConnectionSummary {
    /// Requests that were decoded and dispatched.
    pub requests: u64,
    /// Frames answered with a wire-level error.
    pub protocol_errors: u64,
    /// Requests answered with a cancellation at shutdown.
    pub cancelled: usize,
    pub close_reason: CloseReason,
}

/// Ids currently being processed on one connection.
///
/// Whoever removes an id owns its response: the request task on completion,
/// or the shutdown path on cancellation. Exactly one of them answers.
#[derive(Default)]
struct InFlight {
    ids: Mutex<HashSet<RequestId>>,
}

impl InFlight {
    /// Returns `false` when the id is already in flight.
    fn begin(&self, id: &RequestId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone())
    }

    fn finish(&self, id: &RequestId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn take_all(&self) -> Vec<RequestId> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect()
    }
}

/// The tool server.
///
/// Cheap to clone; clones share the registry and configuration.
#[derive(Clone)]
pub struct ToolServer {
    state: Arc<ServerState>,
    dispatcher: Dispatcher,
}

impl ToolServer {
    /// Create a server with an empty registry.
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, ToolRegistry::new())
    }

    /// Create a server around an existing registry.
    pub fn with_registry(config: Config, registry: ToolRegistry) -> Self {
        let state = Arc::new(ServerState::new(config, registry));
        if state.config.dispatch.log_tool_calls {
            state.interceptors.add(Arc::new(CallLogInterceptor));
        }
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&state)),
            state,
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.state.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.state.config.server.version
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// The tool registry. Tools may be added or removed while serving.
    pub fn registry(&self) -> &ToolRegistry {
        &self.state.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Register the built-in tools.
    pub fn register_builtin_tools(&self) -> crate::Result<()> {
        register_builtin_tools(self.registry())?;
        Ok(())
    }

    /// Wrap every subsequent tool call with `interceptor`.
    pub fn add_interceptor(&self, interceptor: impl ToolInterceptor + 'static) {
        self.state.interceptors.add(Arc::new(interceptor));
    }

    /// Serve on the configured transport until it shuts down.
    pub async fn run(self) -> crate::Result<()> {
        let transport = TransportService::new(self.config().transport.clone());
        transport.run(self).await?;
        Ok(())
    }

    pub fn server_info(&self) -> ServerInfo {
        self.state.server_info()
    }

    /// Serve one connection until its inbound stream ends.
    ///
    /// Never fails: transport problems end the session and are reported in
    /// the returned summary.
    #[instrument(name = "connection", skip_all)]
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> ConnectionSummary
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let config = self.config();
        let (tx, rx) = mpsc::channel::<OutboundMessage>(config.framing.outbound_queue.max(1));
        let mut writer_task = tokio::spawn(write_loop(FrameWriter::new(writer), rx));
        let mut writer_finished = false;

        if config.announce_capabilities {
            self.announce(&tx).await;
        }

        let frames = FrameReader::new(reader, config.framing.max_frame_bytes).into_stream();
        tokio::pin!(frames);

        let in_flight = Arc::new(InFlight::default());
        let limiter = Arc::new(Semaphore::new(config.dispatch.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        let mut requests = 0u64;
        let mut protocol_errors = 0u64;

        let close_reason = loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    None => break CloseReason::EndOfStream,
                    Some(Err(err)) if err.is_terminal() => {
                        warn!("Inbound stream failed: {}", err);
                        break CloseReason::ReadFailed(err);
                    }
                    Some(Err(err)) => {
                        protocol_errors += 1;
                        warn!("Rejected frame: {}", err);
                        let response = ProtocolError::invalid_request(
                            None,
                            format!("Invalid request: {}", err),
                        )
                        .into_response();
                        send(&tx, response.into()).await;
                    }
                    Some(Ok(frame)) => {
                        let request = match RequestMessage::decode(&frame) {
                            Ok(request) => request,
                            Err(err) => {
                                protocol_errors += 1;
                                warn!("Rejected frame: {}", err);
                                send(&tx, err.into_response().into()).await;
                                continue;
                            }
                        };

                        if !in_flight.begin(&request.id) {
                            protocol_errors += 1;
                            warn!("Duplicate in-flight id {}", request.id);
                            let response = ProtocolError::invalid_request(
                                Some(request.id.clone()),
                                format!("Invalid request: id {} is already in flight", request.id),
                            )
                            .into_response();
                            send(&tx, response.into()).await;
                            continue;
                        }

                        let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
                            error!("Request limiter closed unexpectedly");
                            in_flight.finish(&request.id);
                            break CloseReason::WriteFailed("request limiter closed".to_string());
                        };

                        requests += 1;
                        let dispatcher = self.dispatcher.clone();
                        let in_flight = Arc::clone(&in_flight);
                        let tx = tx.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            let id = request.id.clone();
                            let response = dispatcher.dispatch(request).await;

                            // Reserve first: once the id is released the send
                            // must not hit another await point.
                            let Ok(slot) = tx.reserve().await else {
                                debug!("Dropping response {}: outbound stream closed", id);
                                return;
                            };
                            if in_flight.finish(&id) {
                                slot.send(response.into());
                            }
                        });
                    }
                },
                joined = &mut writer_task => {
                    writer_finished = true;
                    let reason = match joined {
                        Ok(Ok(())) => "outbound queue closed".to_string(),
                        Ok(Err(err)) => err.to_string(),
                        Err(err) => err.to_string(),
                    };
                    warn!("Outbound stream failed: {}", reason);
                    break CloseReason::WriteFailed(reason);
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(err) = joined {
                        error!("Request task failed: {}", err);
                    }
                }
            }
        };

        let grace = match close_reason {
            CloseReason::EndOfStream => config.dispatch.shutdown_grace(),
            _ => Duration::ZERO,
        };
        let cancelled = drain(&mut tasks, &in_flight, &tx, grace).await;

        drop(tx);
        if !writer_finished {
            match writer_task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("Failed to flush outbound stream: {}", err),
                Err(err) => error!("Writer task failed: {}", err),
            }
        }

        info!(
            requests,
            protocol_errors, cancelled, "Connection closed: {}", close_reason
        );

        ConnectionSummary {
            requests,
            protocol_errors,
            cancelled,
            close_reason,
        }
    }

    async fn announce(&self, tx: &mpsc::Sender<OutboundMessage>) {
        match serde_json::to_value(self.server_info()) {
            Ok(params) => {
                debug!("Announcing capabilities");
                send(tx, NotificationMessage::new(methods::CAPABILITIES, params).into()).await;
            }
            Err(err) => warn!("Failed to encode capability announcement: {}", err),
        }
    }
}

async fn send(tx: &mpsc::Sender<OutboundMessage>, message: OutboundMessage) {
    if tx.send(message).await.is_err() {
        debug!("Outbound stream closed, dropping message");
    }
}

/// Single writer: the only place frames touch the transport.
async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        writer.write_message(&message).await?;
    }
    writer.shutdown().await
}

/// Let in-flight requests finish within `grace`, then cancel the rest.
///
/// Cancelled handlers are detached, not waited for. Returns the number of
/// requests answered with a cancellation.
async fn drain(
    tasks: &mut JoinSet<()>,
    in_flight: &InFlight,
    tx: &mpsc::Sender<OutboundMessage>,
    grace: Duration,
) -> usize {
    if !tasks.is_empty() && !grace.is_zero() {
        info!(
            "Waiting up to {:?} for {} in-flight request(s)",
            grace,
            tasks.len()
        );
        let finished = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            warn!("Grace period elapsed with {} request(s) still running", tasks.len());
        }
    }

    let abandoned = in_flight.take_all();
    tasks.abort_all();

    for id in &abandoned {
        warn!("Cancelling request {}", id);
        if tx.send(ResponseMessage::cancelled(id.clone()).into()).await.is_err() {
            break;
        }
    }

    abandoned.len()
}
