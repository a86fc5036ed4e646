use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use spark_payload::{
    CodecDescriptor, CodecError, Encoding, Payload, PayloadCodec, map_payloads, wire,
};
use tracing::trace;

/// 默认的解压上限：64 MiB。
pub const DEFAULT_MAX_DECODED_SIZE: usize = 64 * 1024 * 1024;

/// `GzipCodec` 将整条负载帧化后以 gzip 压缩，产出 `binary/gzip` 负载。
///
/// # 设计背景（Why）
/// - 大体积的工作流参数（批量记录、文档）在历史中反复存储，压缩能显著降低存储与传输成本；
/// - 小负载压缩后往往反而变大，因此低于 `min_size` 的负载原样透传。
///
/// # 行为逻辑（How）
/// 1. `encode`：帧化原负载，长度达到阈值（或原负载本身就带 `binary/gzip` 标签）时压缩并包装；
/// 2. `decode`：只处理带 `binary/gzip` 标签的负载，解压后解帧还原，其余透传。
///
/// # 契约说明（What）
/// - 原负载的元数据完整保存在压缩帧内，解码后逐字节一致；
/// - 解压结果超过 `max_decoded_size` 视为失败，防止解压炸弹。
#[derive(Clone, Debug)]
pub struct GzipCodec {
    descriptor: CodecDescriptor,
    min_size: usize,
    level: Compression,
    max_decoded_size: usize,
}

impl GzipCodec {
    pub fn new() -> Self {
        Self {
            descriptor: CodecDescriptor::new("gzip").with_output_encoding(Encoding::BINARY_GZIP),
            min_size: 0,
            level: Compression::default(),
            max_decoded_size: DEFAULT_MAX_DECODED_SIZE,
        }
    }

    /// 帧化后小于该字节数的负载不压缩。
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// 压缩级别，0（不压缩）到 9（最高）。
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    pub fn with_max_decoded_size(mut self, max: usize) -> Self {
        self.max_decoded_size = max;
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    fn compress(&self, payload: Payload) -> Result<Payload, CodecError> {
        let framed = wire::encode_payload(&payload)?;
        if framed.len() < self.min_size && !payload.has_encoding(&Encoding::BINARY_GZIP) {
            trace!(size = framed.len(), min_size = self.min_size, "payload below gzip threshold");
            return Ok(payload);
        }

        let mut encoder = GzEncoder::new(Vec::with_capacity(framed.len() / 2), self.level);
        encoder
            .write_all(&framed)
            .map_err(|err| CodecError::new("gzip compression failed").with_source(err))?;
        let compressed = encoder
            .finish()
            .map_err(|err| CodecError::new("gzip compression failed").with_source(err))?;
        Ok(Payload::new(&Encoding::BINARY_GZIP, compressed))
    }

    fn decompress(&self, payload: Payload) -> Result<Payload, CodecError> {
        if !payload.has_encoding(&Encoding::BINARY_GZIP) {
            return Ok(payload);
        }

        let limit = u64::try_from(self.max_decoded_size)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let mut framed = Vec::new();
        GzDecoder::new(&payload.data[..])
            .take(limit)
            .read_to_end(&mut framed)
            .map_err(|err| CodecError::new("gzip decompression failed").with_source(err))?;
        if framed.len() > self.max_decoded_size {
            return Err(CodecError::new(format!(
                "gzip payload expands beyond {} bytes",
                self.max_decoded_size
            )));
        }
        Ok(wire::decode_payload(&framed)?)
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadCodec for GzipCodec {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_payloads(payloads, |payload| self.compress(payload))
    }

    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_payloads(payloads, |payload| self.decompress(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn large_json() -> Payload {
        let body = format!("[{}]", vec!["\"repeat\""; 512].join(","));
        Payload::new(&Encoding::JSON_PLAIN, body).with_metadata("trace", "t-9")
    }

    #[test]
    fn large_payload_is_compressed_and_restored() {
        let codec = GzipCodec::new().with_min_size(64);
        let original = large_json();
        let encoded = codec.encode(vec![original.clone()]).expect("压缩");
        assert!(encoded[0].has_encoding(&Encoding::BINARY_GZIP));
        assert!(encoded[0].data.len() < original.data.len());
        assert_eq!(codec.decode(encoded).expect("解压"), vec![original]);
    }

    #[test]
    fn small_payload_passes_through() {
        let codec = GzipCodec::new().with_min_size(1024);
        let small = Payload::new(&Encoding::JSON_PLAIN, &b"1"[..]);
        let encoded = codec.encode(vec![small.clone()]).expect("透传");
        assert_eq!(encoded, vec![small.clone()]);
        assert_eq!(codec.decode(encoded).expect("透传"), vec![small]);
    }

    #[test]
    fn decoded_size_limit_is_enforced() {
        let encoded = GzipCodec::new()
            .encode(vec![large_json()])
            .expect("压缩");
        let strict = GzipCodec::new().with_max_decoded_size(16);
        assert!(strict.decode(encoded).is_err());
    }

    #[test]
    fn corrupt_stream_is_rejected() {
        let bogus = Payload::new(&Encoding::BINARY_GZIP, &b"not gzip"[..]);
        assert!(GzipCodec::new().decode(vec![bogus]).is_err());
    }
}
