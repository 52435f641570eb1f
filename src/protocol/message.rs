// src/protocol/message.rs
//! Datagram messages for the built-in engine
//!
//! One JSON document per UDP datagram. Requests carry a community and a
//! PDU; responses echo the request id.

use crate::model::Oid;
use crate::protocol::Varbind;
use crate::utils::errors::EngineError;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: u32,
    pub community: String,
    #[serde(flatten)]
    pub pdu: RequestPdu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pdu", rename_all = "snake_case")]
pub enum RequestPdu {
    Get { oid: Oid },
    GetNext { oid: Oid },
    GetBulk { oid: Oid, max_repetitions: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u32,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseBody {
    Ok { varbinds: Vec<Varbind> },
    Error { message: String },
}

impl Response {
    pub fn ok(request_id: u32, varbinds: Vec<Varbind>) -> Self {
        Self {
            request_id,
            body: ResponseBody::Ok { varbinds },
        }
    }

    pub fn error(request_id: u32, message: impl Into<String>) -> Self {
        Self {
            request_id,
            body: ResponseBody::Error {
                message: message.into(),
            },
        }
    }
}

/// Codec decoding `D` from and encoding `E` into whole datagrams
pub struct JsonDatagramCodec<D, E> {
    _marker: PhantomData<fn() -> (D, E)>,
}

impl<D, E> JsonDatagramCodec<D, E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<D, E> Default for JsonDatagramCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener side: reads requests, writes responses
pub type ServerCodec = JsonDatagramCodec<Request, Response>;

/// Session side: reads responses, writes requests
pub type ClientCodec = JsonDatagramCodec<Response, Request>;

impl<D: DeserializeOwned, E> Decoder for JsonDatagramCodec<D, E> {
    type Item = D;
    type Error = EngineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, EngineError> {
        if src.is_empty() {
            return Ok(None);
        }
        // consume the whole datagram even if it fails to parse
        let datagram = src.split_to(src.len());
        Ok(Some(serde_json::from_slice(&datagram)?))
    }
}

impl<D, E: Serialize> Encoder<E> for JsonDatagramCodec<D, E> {
    type Error = EngineError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), EngineError> {
        let encoded = serde_json::to_vec(&item)?;
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
