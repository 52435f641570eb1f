// src/protocol/session.rs
//! Client session for the built-in engine

use crate::model::Oid;
use crate::protocol::message::{ClientCodec, Request, RequestPdu, ResponseBody};
use crate::protocol::{Session, SessionOptions, Varbind};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tokio_util::udp::UdpFramed;
use tracing::{debug, warn};

/// Short-lived client bound to an ephemeral local port
pub struct UdpSession {
    options: SessionOptions,
    target: SocketAddr,
    framed: UdpFramed<ClientCodec>,
    next_request_id: u32,
}

impl UdpSession {
    pub async fn connect(options: SessionOptions) -> Result<Self> {
        let local: IpAddr = match options.host {
            IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let socket = UdpSocket::bind(SocketAddr::new(local, 0)).await?;
        let target = SocketAddr::new(options.host, options.port);

        Ok(Self {
            options,
            target,
            framed: UdpFramed::new(socket, ClientCodec::new()),
            next_request_id: 1,
        })
    }

    /// Send one PDU, retransmitting on timeout, and wait for its response
    pub async fn request(&mut self, pdu: RequestPdu) -> Result<Vec<Varbind>> {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let request = Request {
            request_id,
            community: self.options.community.clone(),
            pdu,
        };

        for attempt in 0..=self.options.retries {
            if attempt > 0 {
                debug!("Retrying request {} to {} (attempt {})", request_id, self.target, attempt + 1);
            }

            self.framed.send((request.clone(), self.target)).await?;

            let deadline = Instant::now() + self.options.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let received = match timeout(remaining, self.framed.next()).await {
                    Ok(received) => received,
                    Err(_) => break,
                };

                match received {
                    Some(Ok((response, _))) if response.request_id == request_id => {
                        return match response.body {
                            ResponseBody::Ok { varbinds } => Ok(varbinds),
                            ResponseBody::Error { message } => Err(EngineError::Protocol(message)),
                        };
                    }
                    Some(Ok((stale, _))) => {
                        debug!("Ignoring stale response {}", stale.request_id);
                    }
                    Some(Err(e)) => warn!("Malformed response from {}: {}", self.target, e),
                    None => {
                        return Err(EngineError::Protocol("Session socket closed".into()));
                    }
                }
            }
        }

        Err(EngineError::Protocol(format!(
            "Request timed out after {} attempt(s) to {}",
            self.options.retries + 1,
            self.target
        )))
    }
}

#[async_trait]
impl Session for UdpSession {
    async fn walk(&mut self, start: &Oid) -> Result<Vec<Varbind>> {
        let mut results = Vec::new();
        let mut cursor = start.clone();

        loop {
            let pdu = if self.options.max_repetitions > 1 {
                RequestPdu::GetBulk {
                    oid: cursor.clone(),
                    max_repetitions: self.options.max_repetitions,
                }
            } else {
                RequestPdu::GetNext { oid: cursor.clone() }
            };

            let varbinds = self.request(pdu).await?;
            if varbinds.is_empty() {
                return Ok(results);
            }

            for varbind in varbinds {
                if varbind.is_error() {
                    return Ok(results);
                }
                if !varbind.oid.starts_with(start) {
                    return Ok(results);
                }
                if varbind.oid <= cursor {
                    return Err(EngineError::Protocol(format!(
                        "Identifier {} does not increase past {}",
                        varbind.oid, cursor
                    )));
                }

                cursor = varbind.oid.clone();
                results.push(varbind);
            }
        }
    }
}
