// src/protocol/udp_engine.rs
//! Built-in UDP protocol engine
//!
//! Each listener owns one bound `UdpSocket` served by a background task.
//! Closing a listener cancels the task and waits for it, so the socket is
//! dropped (and the port released) before `close` returns.

use crate::protocol::message::{Request, RequestPdu, Response, ServerCodec};
use crate::protocol::mib::{AccessControl, MibStore};
use crate::protocol::session::UdpSession;
use crate::protocol::{
    AgentListener, Authorizer, ListenOptions, ObjectStore, ProtocolEngine, Session, SessionOptions,
};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::udp::UdpFramed;
use tracing::{debug, info, warn};

/// Protocol engine serving JSON datagrams over UDP
#[derive(Debug, Clone, Default)]
pub struct UdpEngine;

impl UdpEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProtocolEngine for UdpEngine {
    async fn create_agent(&self, options: ListenOptions) -> Result<Box<dyn AgentListener>> {
        let listener = UdpListener::bind(options).await?;
        Ok(Box::new(listener))
    }

    async fn open_session(&self, options: SessionOptions) -> Result<Box<dyn Session>> {
        let session = UdpSession::connect(options).await?;
        Ok(Box::new(session))
    }
}

/// A bound agent port and its serving task
pub struct UdpListener {
    port: u16,
    store: Arc<MibStore>,
    access: Arc<AccessControl>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl UdpListener {
    /// Bind the port and start serving
    pub async fn bind(options: ListenOptions) -> Result<Self> {
        let addr = SocketAddr::new(options.address, options.port);

        let socket = UdpSocket::bind(addr).await.map_err(|e| match e.kind() {
            ErrorKind::AddrInUse => EngineError::PortInUse(options.port),
            _ => EngineError::Protocol(format!("Failed to bind {}: {}", addr, e)),
        })?;
        let port = socket.local_addr()?.port();

        let store = Arc::new(MibStore::new());
        let access = Arc::new(AccessControl::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(serve(
            UdpFramed::new(socket, ServerCodec::new()),
            Arc::clone(&store),
            Arc::clone(&access),
            options.authorization,
            cancel.clone(),
        ));

        info!("Agent listener bound on {}:{}", options.address, port);

        Ok(Self {
            port,
            store,
            access,
            cancel,
            task: Some(task),
        })
    }
}

#[async_trait]
impl AgentListener for UdpListener {
    fn local_port(&self) -> u16 {
        self.port
    }

    fn authorizer(&self) -> Arc<dyn Authorizer> {
        self.access.clone()
    }

    fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                EngineError::Protocol(format!("Listener task on port {} failed: {}", self.port, e))
            })?;
            debug!("Listener on port {} closed", self.port);
        }

        Ok(())
    }
}

impl Drop for UdpListener {
    fn drop(&mut self) {
        // the task exits and drops the socket on its own
        self.cancel.cancel();
    }
}

async fn serve(
    mut framed: UdpFramed<ServerCodec>,
    store: Arc<MibStore>,
    access: Arc<AccessControl>,
    authorization: bool,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = framed.next() => next,
        };

        match next {
            Some(Ok((request, peer))) => {
                let response = handle_request(&store, &access, authorization, request);
                if let Err(e) = framed.send((response, peer)).await {
                    warn!("Failed to answer {}: {}", peer, e);
                }
            }
            Some(Err(e)) => warn!("Dropping malformed datagram: {}", e),
            None => break,
        }
    }
}

/// Resolve one request against the store
pub fn handle_request(
    store: &MibStore,
    access: &AccessControl,
    authorization: bool,
    request: Request,
) -> Response {
    if authorization && !access.permits(&request.community) {
        debug!("Rejected request {} for unknown community", request.request_id);
        return Response::error(request.request_id, "Authorization failed");
    }

    let varbinds = match &request.pdu {
        RequestPdu::Get { oid } => vec![store.get(oid)],
        RequestPdu::GetNext { oid } => vec![store.get_next(oid)],
        RequestPdu::GetBulk {
            oid,
            max_repetitions,
        } => store.get_bulk(oid, *max_repetitions),
    };

    Response::ok(request.request_id, varbinds)
}
