//! Length-prefixed binary framing.
//!
//! Every frame is a big-endian `i32` payload length followed by exactly that
//! many payload bytes; the payload is one bincode-serialized record. Both
//! directions of the wire use the same format, with the encoder and decoder
//! each configured for a single record type.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

/// Upper bound on a frame payload, in bytes.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Writes records of one type as frames.
pub struct FrameEncoder<T> {
    record: PhantomData<fn(T)>,
}

impl<T: Serialize> FrameEncoder<T> {
    pub fn new() -> Self {
        Self {
            record: PhantomData,
        }
    }

    /// Serialize `record` and append one complete frame to `dst`.
    ///
    /// Nothing is written if serialization fails or the payload exceeds
    /// [`MAX_FRAME`].
    pub fn encode(&self, record: &T, dst: &mut BytesMut) -> Result<()> {
        let payload = bincode::serialize(record)
            .map_err(|e| Error::Protocol(format!("serialize record: {e}")))?;
        if payload.len() > MAX_FRAME {
            return Err(Error::Protocol(format!(
                "frame of {} bytes exceeds maximum {MAX_FRAME}",
                payload.len()
            )));
        }
        dst.reserve(LEN_PREFIX + payload.len());
        dst.put_i32(payload.len() as i32);
        dst.put_slice(&payload);
        Ok(())
    }
}

impl<T: Serialize> Default for FrameEncoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming decoder for frames carrying one record type.
///
/// Feed it a buffer holding zero, partial, or several frames; it consumes
/// complete frames only and is stateless across them.
pub struct FrameDecoder<T> {
    record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> FrameDecoder<T> {
    pub fn new() -> Self {
        Self {
            record: PhantomData,
        }
    }

    /// Decode one record if `src` holds a complete frame.
    ///
    /// `Ok(None)` means more bytes are needed; the buffer is left untouched
    /// until the whole frame has arrived. A negative or oversized length, or
    /// an undecodable payload, fails the connection.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }
        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&src[..LEN_PREFIX]);
        let len = i32::from_be_bytes(len_bytes);
        if len < 0 {
            return Err(Error::Protocol(format!("negative frame length {len}")));
        }
        let len = len as usize;
        if len > MAX_FRAME {
            return Err(Error::Protocol(format!(
                "frame length {len} exceeds maximum {MAX_FRAME}"
            )));
        }
        if src.len() < LEN_PREFIX + len {
            return Ok(None);
        }
        src.advance(LEN_PREFIX);
        let payload = src.split_to(len);
        let record = bincode::deserialize(&payload)
            .map_err(|e| Error::Protocol(format!("deserialize record: {e}")))?;
        Ok(Some(record))
    }
}

impl<T: DeserializeOwned> Default for FrameDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        net::{Fault, RpcRequest, RpcResponse},
        types::Value,
    };

    fn sample_request() -> RpcRequest {
        RpcRequest {
            request_id: "req-1".into(),
            interface_name: "EchoService".into(),
            service_version: "v1.0".into(),
            method_name: "echo".into(),
            parameter_types: vec!["string".into(), "int".into()],
            parameters: vec![Value::Str("hello".into()), Value::Int(42)],
        }
    }

    fn encoded(request: &RpcRequest) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameEncoder::new().encode(request, &mut buf).unwrap();
        buf
    }

    #[test]
    fn request_round_trips() {
        let request = sample_request();
        let mut buf = encoded(&request);
        let decoded = FrameDecoder::<RpcRequest>::new()
            .decode(&mut buf)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, request);
        assert!(buf.is_empty());
    }

    #[test]
    fn response_round_trips() {
        let response = RpcResponse::failure("req-9".into(), Fault::handler("boom"));
        let mut buf = BytesMut::new();
        FrameEncoder::new().encode(&response, &mut buf).unwrap();
        let decoded = FrameDecoder::<RpcResponse>::new()
            .decode(&mut buf)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn partial_frame_waits_at_every_split() {
        let request = sample_request();
        let frame = encoded(&request);
        for split in 0..frame.len() {
            let mut decoder = FrameDecoder::<RpcRequest>::new();
            let mut buf = BytesMut::from(&frame[..split]);
            assert!(
                decoder.decode(&mut buf).unwrap().is_none(),
                "emitted a record from {split} of {} bytes",
                frame.len()
            );
            buf.extend_from_slice(&frame[split..]);
            assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), request);
            assert!(decoder.decode(&mut buf).unwrap().is_none());
        }
    }

    #[test]
    fn two_frames_in_one_buffer_decode_in_order() {
        let first = sample_request();
        let mut second = sample_request();
        second.request_id = "req-2".into();

        let mut buf = encoded(&first);
        buf.extend_from_slice(&encoded(&second));

        let mut decoder = FrameDecoder::<RpcRequest>::new();
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), second);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn negative_length_fails_the_connection() {
        let mut buf = BytesMut::new();
        buf.put_i32(-1);
        let err = FrameDecoder::<RpcRequest>::new()
            .decode(&mut buf)
            .unwrap_err();
        assert!(err.to_string().contains("negative frame length"));
    }

    #[test]
    fn oversized_length_fails_before_payload_arrives() {
        let mut buf = BytesMut::new();
        buf.put_i32(MAX_FRAME as i32 + 1);
        let err = FrameDecoder::<RpcRequest>::new()
            .decode(&mut buf)
            .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn garbage_payload_is_a_protocol_error() {
        let mut buf = BytesMut::new();
        buf.put_i32(3);
        buf.put_slice(&[0xff, 0xff, 0xff]);
        let err = FrameDecoder::<RpcRequest>::new()
            .decode(&mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn empty_buffer_waits() {
        let mut buf = BytesMut::new();
        assert!(FrameDecoder::<RpcRequest>::new()
            .decode(&mut buf)
            .unwrap()
            .is_none());
    }
}
