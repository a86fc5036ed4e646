//! 负载批次的二进制帧格式。
//!
//! 帧布局（全部大端）：
//!
//! ```text
//! "SPP1" | u32 负载数 | { u32 元数据条数 | { u16 键长 | 键 | u32 值长 | 值 }* | u32 数据长 | 数据 }*
//! ```
//!
//! 整体包装型编解码器（压缩、加密）也用同一格式序列化内层负载。

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::PayloadError;
use crate::payload::Payload;

const MAGIC: &[u8; 4] = b"SPP1";

/// 将负载批次帧化为字节。
///
/// 元数据键超过 `u16::MAX` 字节或任一长度超过 `u32::MAX` 时返回 [`PayloadError::MalformedWire`]。
pub fn encode_payloads(payloads: &[Payload]) -> Result<Bytes, PayloadError> {
    let mut buf = BytesMut::with_capacity(estimate(payloads));
    buf.put_slice(MAGIC);
    buf.put_u32(len_u32(payloads.len(), "payload count")?);
    for payload in payloads {
        put_payload(&mut buf, payload)?;
    }
    Ok(buf.freeze())
}

/// 解析 [`encode_payloads`] 产出的字节。
///
/// 截断、魔数不符、键非 UTF-8 或存在尾随字节时返回 [`PayloadError::MalformedWire`]。
pub fn decode_payloads(bytes: &[u8]) -> Result<Vec<Payload>, PayloadError> {
    let mut src = bytes;
    if src.len() < MAGIC.len() || &src[..MAGIC.len()] != MAGIC {
        return Err(PayloadError::malformed_wire("missing SPP1 frame header"));
    }
    src.advance(MAGIC.len());

    let count = take_u32(&mut src, "payload count")? as usize;
    // 每个负载至少 8 字节，借此拒绝伪造的超大计数。
    if count > src.len() / 8 {
        return Err(PayloadError::malformed_wire(format!(
            "payload count {count} exceeds remaining {} bytes",
            src.len()
        )));
    }
    let mut payloads = Vec::with_capacity(count);
    for _ in 0..count {
        payloads.push(take_payload(&mut src)?);
    }
    if src.has_remaining() {
        return Err(PayloadError::malformed_wire(format!(
            "{} trailing bytes after last payload",
            src.remaining()
        )));
    }
    Ok(payloads)
}

/// 帧化单个负载。
pub fn encode_payload(payload: &Payload) -> Result<Bytes, PayloadError> {
    encode_payloads(std::slice::from_ref(payload))
}

/// 解析恰好包含一个负载的帧。
pub fn decode_payload(bytes: &[u8]) -> Result<Payload, PayloadError> {
    let mut payloads = decode_payloads(bytes)?;
    match (payloads.pop(), payloads.is_empty()) {
        (Some(payload), true) => Ok(payload),
        _ => Err(PayloadError::malformed_wire(
            "expected exactly one payload in frame",
        )),
    }
}

fn estimate(payloads: &[Payload]) -> usize {
    payloads.iter().fold(8, |acc, payload| {
        acc + 8
            + payload.data.len()
            + payload
                .metadata
                .iter()
                .map(|(k, v)| 6 + k.len() + v.len())
                .sum::<usize>()
    })
}

fn put_payload(buf: &mut BytesMut, payload: &Payload) -> Result<(), PayloadError> {
    buf.put_u32(len_u32(payload.metadata.len(), "metadata count")?);
    for (key, value) in &payload.metadata {
        let key_len = u16::try_from(key.len()).map_err(|_| {
            PayloadError::malformed_wire(format!("metadata key of {} bytes is too long", key.len()))
        })?;
        buf.put_u16(key_len);
        buf.put_slice(key.as_bytes());
        buf.put_u32(len_u32(value.len(), "metadata value")?);
        buf.put_slice(value);
    }
    buf.put_u32(len_u32(payload.data.len(), "payload data")?);
    buf.put_slice(&payload.data);
    Ok(())
}

fn take_payload(src: &mut &[u8]) -> Result<Payload, PayloadError> {
    let entries = take_u32(src, "metadata count")?;
    let mut metadata = BTreeMap::new();
    for _ in 0..entries {
        let key_len = take_u16(src, "metadata key length")? as usize;
        let key = take_bytes(src, key_len, "metadata key")?;
        let key = String::from_utf8(key.to_vec())
            .map_err(|_| PayloadError::malformed_wire("metadata key is not valid UTF-8"))?;
        let value_len = take_u32(src, "metadata value length")? as usize;
        let value = take_bytes(src, value_len, "metadata value")?;
        metadata.insert(key, value);
    }
    let data_len = take_u32(src, "payload data length")? as usize;
    let data = take_bytes(src, data_len, "payload data")?;
    Ok(Payload { metadata, data })
}

fn len_u32(len: usize, what: &str) -> Result<u32, PayloadError> {
    u32::try_from(len)
        .map_err(|_| PayloadError::malformed_wire(format!("{what} of {len} exceeds u32 range")))
}

fn take_u32(src: &mut &[u8], what: &str) -> Result<u32, PayloadError> {
    if src.remaining() < 4 {
        return Err(truncated(what));
    }
    Ok(src.get_u32())
}

fn take_u16(src: &mut &[u8], what: &str) -> Result<u16, PayloadError> {
    if src.remaining() < 2 {
        return Err(truncated(what));
    }
    Ok(src.get_u16())
}

fn take_bytes(src: &mut &[u8], len: usize, what: &str) -> Result<Bytes, PayloadError> {
    if src.remaining() < len {
        return Err(truncated(what));
    }
    let out = Bytes::copy_from_slice(&src[..len]);
    src.advance(len);
    Ok(out)
}

fn truncated(what: &str) -> PayloadError {
    PayloadError::malformed_wire(format!("frame truncated while reading {what}"))
}
