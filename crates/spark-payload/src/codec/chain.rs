use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::codec::PayloadCodec;
use crate::error::{CodecError, PayloadError};
use crate::payload::Payload;

/// `CodecChain` 是有序的负载编解码管线。
///
/// # 设计背景（Why）
/// - 压缩、加密等变换需要按确定顺序叠加：先压缩再加密，解码时先解密再解压；
/// - 管线在失败时补上编解码器名称，把实现方的 [`crate::CodecError`] 提升为带分类的 [`PayloadError`]。
///
/// # 行为逻辑（How）
/// 1. `encode` 按列表顺序调用各编解码器，后者消费前者的输出；
/// 2. `decode` 按相反顺序调用各编解码器的逆变换；
/// 3. 启用往返校验时，`encode` 会立即对自身输出执行 `decode` 并与输入比较。
///
/// # 契约说明（What）
/// - 空管线是恒等变换；
/// - 正向失败或负载数量变化返回 [`PayloadError::CodecEncode`]；逆向失败或负载数量变化返回 [`PayloadError::CodecInverseMismatch`]；
/// - 管线本身不可变，克隆只复制 `Arc`，可在线程间共享。
///
/// # 风险提示（Trade-offs）
/// - 往返校验使编码成本翻倍，适合在接入新编解码器时短期开启。
#[derive(Clone, Default)]
pub struct CodecChain {
    codecs: Vec<Arc<dyn PayloadCodec>>,
    verify_roundtrip: bool,
}

impl CodecChain {
    /// 以有序编解码器列表构造管线。
    pub fn new(codecs: Vec<Arc<dyn PayloadCodec>>) -> Self {
        Self {
            codecs,
            verify_roundtrip: false,
        }
    }

    /// 恒等管线。
    pub fn identity() -> Self {
        Self::default()
    }

    /// 开启或关闭编码后的往返校验。
    pub fn with_roundtrip_verification(mut self, enabled: bool) -> Self {
        self.verify_roundtrip = enabled;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// 按编码顺序列出编解码器名称。
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codecs.iter().map(|codec| codec.descriptor().name())
    }

    /// 正向变换整批负载。
    pub fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, PayloadError> {
        let original = self.verify_roundtrip.then(|| payloads.clone());
        let mut current = payloads;
        for codec in &self.codecs {
            let name = codec.descriptor().name();
            let expected = current.len();
            trace!(codec = name, count = expected, "encoding payloads");
            current = codec
                .encode(current)
                .map_err(|source| PayloadError::CodecEncode {
                    codec: name.to_owned(),
                    source,
                })?;
            if current.len() != expected {
                return Err(PayloadError::CodecEncode {
                    codec: name.to_owned(),
                    source: CodecError::new(format!(
                        "encode returned {} payloads for {} inputs",
                        current.len(),
                        expected
                    )),
                });
            }
        }

        if let Some(original) = original {
            self.verify(&original, &current)?;
        }
        Ok(current)
    }

    /// 逆向变换整批负载。
    pub fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, PayloadError> {
        let mut current = payloads;
        for codec in self.codecs.iter().rev() {
            let name = codec.descriptor().name();
            let expected = current.len();
            trace!(codec = name, count = expected, "decoding payloads");
            current =
                codec
                    .decode(current)
                    .map_err(|err| PayloadError::CodecInverseMismatch {
                        codec: name.to_owned(),
                        reason: err.to_string(),
                    })?;
            if current.len() != expected {
                return Err(PayloadError::CodecInverseMismatch {
                    codec: name.to_owned(),
                    reason: format!(
                        "decode returned {} payloads for {} inputs",
                        current.len(),
                        expected
                    ),
                });
            }
        }
        Ok(current)
    }

    fn verify(&self, original: &[Payload], encoded: &[Payload]) -> Result<(), PayloadError> {
        let decoded = self.decode(encoded.to_vec())?;
        match original
            .iter()
            .zip(decoded.iter())
            .position(|(lhs, rhs)| lhs != rhs)
        {
            None if original.len() == decoded.len() => Ok(()),
            mismatch => Err(PayloadError::CodecInverseMismatch {
                codec: self.names().collect::<Vec<_>>().join(" -> "),
                reason: match mismatch {
                    Some(index) => format!("payload #{index} differs after round trip"),
                    None => "payload count differs after round trip".to_owned(),
                },
            }),
        }
    }
}

impl fmt::Debug for CodecChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecChain")
            .field("codecs", &self.names().collect::<Vec<_>>())
            .field("verify_roundtrip", &self.verify_roundtrip)
            .finish()
    }
}

impl FromIterator<Arc<dyn PayloadCodec>> for CodecChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn PayloadCodec>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::map_payloads;
    use crate::encoding::{CodecDescriptor, Encoding};
    use bytes::Bytes;

    /// 在数据末尾追加固定标记的编解码器，便于观察调用顺序。
    struct Suffix {
        descriptor: CodecDescriptor,
        marker: u8,
    }

    impl Suffix {
        fn new(name: &'static str, marker: u8) -> Arc<dyn PayloadCodec> {
            Arc::new(Self {
                descriptor: CodecDescriptor::new(name),
                marker,
            })
        }
    }

    impl PayloadCodec for Suffix {
        fn descriptor(&self) -> &CodecDescriptor {
            &self.descriptor
        }

        fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
            map_payloads(payloads, |mut payload| {
                let mut data = payload.data.to_vec();
                data.push(self.marker);
                payload.data = Bytes::from(data);
                Ok(payload)
            })
        }

        fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
            map_payloads(payloads, |mut payload| {
                let mut data = payload.data.to_vec();
                match data.pop() {
                    Some(last) if last == self.marker => {
                        payload.data = Bytes::from(data);
                        Ok(payload)
                    }
                    other => Err(CodecError::new(format!(
                        "expected trailing marker {}, found {other:?}",
                        self.marker
                    ))),
                }
            })
        }
    }

    /// 编码时什么都不做、解码时却篡改数据的错误实现。
    struct Lossy {
        descriptor: CodecDescriptor,
    }

    impl PayloadCodec for Lossy {
        fn descriptor(&self) -> &CodecDescriptor {
            &self.descriptor
        }

        fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
            Ok(payloads)
        }

        fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
            map_payloads(payloads, |mut payload| {
                payload.data = Bytes::new();
                Ok(payload)
            })
        }
    }

    fn sample() -> Vec<Payload> {
        vec![
            Payload::new(&Encoding::JSON_PLAIN, &b"1"[..]),
            Payload::new(&Encoding::BINARY_PLAIN, &b"\x00\x01"[..]),
        ]
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain = CodecChain::identity();
        assert!(chain.is_identity());
        assert_eq!(chain.encode(sample()).expect("encode"), sample());
        assert_eq!(chain.decode(sample()).expect("decode"), sample());
    }

    #[test]
    fn encode_runs_in_order_and_decode_in_reverse() {
        let chain = CodecChain::new(vec![Suffix::new("a", b'A'), Suffix::new("b", b'B')]);
        let encoded = chain.encode(sample()).expect("encode");
        assert_eq!(encoded[0].data.as_ref(), b"1AB");
        assert_eq!(chain.decode(encoded).expect("decode"), sample());
    }

    #[test]
    fn failed_inverse_names_the_codec() {
        let chain = CodecChain::new(vec![Suffix::new("a", b'A'), Suffix::new("b", b'B')]);
        let err = chain
            .decode(sample())
            .expect_err("缺少标记的负载无法解码");
        match err {
            PayloadError::CodecInverseMismatch { codec, .. } => assert_eq!(codec, "b"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn roundtrip_verification_catches_lossy_codec() {
        let lossy: Arc<dyn PayloadCodec> = Arc::new(Lossy {
            descriptor: CodecDescriptor::new("lossy"),
        });
        let unchecked = CodecChain::new(vec![lossy.clone()]);
        assert!(unchecked.encode(sample()).is_ok());

        let checked = CodecChain::new(vec![lossy]).with_roundtrip_verification(true);
        let err = checked.encode(sample()).expect_err("往返校验应发现数据被篡改");
        assert!(matches!(err, PayloadError::CodecInverseMismatch { .. }));
    }
}
