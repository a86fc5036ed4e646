use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::codec::{CodecChain, PayloadCodec};
use crate::config::{CodecSource, DataConverterConfig};
use crate::converter::{self, DefaultPayloadConverter, PayloadConverter};
use crate::error::PayloadError;
use crate::loader::{ModuleResolver, resolve_payload_codec, resolve_payload_converter};
use crate::payload::Payload;
use crate::value::Value;
use crate::wire;

/// `LoadedDataConverter` 是装配完成、对调用层可见的数据转换器。
///
/// # 设计背景（Why）
/// - 工作流参数、结果、信号与查询都经由同一组转换器和编解码器，装配一次后在整个进程生命周期内共享；
/// - 调用层只依赖“值 → 负载”“负载 → 值”两个方向，无需知道内部由哪些插件组成。
///
/// # 行为逻辑（How）
/// - 编码：逐值交给转换器，再整体交给编解码管线正向变换；
/// - 解码：先让管线逆向变换，再逐个负载按标签分发给转换器。
///
/// # 契约说明（What）
/// - 构造后不可变，`Send + Sync`，通过 `Arc` 在线程间共享；
/// - 任一值或负载失败，整次调用失败，错误原样返回，不会替换为默认值。
#[derive(Clone)]
pub struct LoadedDataConverter {
    payload_converter: Arc<dyn PayloadConverter>,
    payload_codec: CodecChain,
}

impl LoadedDataConverter {
    pub fn new(payload_converter: Arc<dyn PayloadConverter>, payload_codec: CodecChain) -> Self {
        Self {
            payload_converter,
            payload_codec,
        }
    }

    pub fn payload_converter(&self) -> &Arc<dyn PayloadConverter> {
        &self.payload_converter
    }

    pub fn payload_codec(&self) -> &CodecChain {
        &self.payload_codec
    }

    /// 将一组值编码为负载。
    pub fn encode(&self, values: &[Value]) -> Result<Vec<Payload>, PayloadError> {
        let payloads = converter::to_payloads(self.payload_converter.as_ref(), values)?;
        self.payload_codec.encode(payloads)
    }

    /// 将一组负载解码为值。
    pub fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Value>, PayloadError> {
        let payloads = self.payload_codec.decode(payloads)?;
        converter::from_payloads(self.payload_converter.as_ref(), &payloads)
    }

    pub fn encode_one(&self, value: &Value) -> Result<Payload, PayloadError> {
        self.encode(std::slice::from_ref(value))?
            .pop()
            .ok_or_else(|| PayloadError::serialization(value.kind(), "codec chain produced no payload"))
    }

    pub fn decode_one(&self, payload: Payload) -> Result<Value, PayloadError> {
        self.decode(vec![payload])?
            .pop()
            .ok_or_else(|| PayloadError::CodecInverseMismatch {
                codec: self.chain_label(),
                reason: "codec chain produced no payload".to_owned(),
            })
    }

    /// 解码可能缺席的负载；缺席即 [`Value::Undefined`]。
    pub fn decode_optional(&self, payload: Option<Payload>) -> Result<Value, PayloadError> {
        match payload {
            Some(payload) => self.decode_one(payload),
            None => Ok(Value::Undefined),
        }
    }

    /// 经 serde 编码类型化值。
    pub fn encode_typed<T: Serialize + ?Sized>(&self, value: &T) -> Result<Payload, PayloadError> {
        self.encode_one(&Value::from_serialize(value)?)
    }

    /// 解码负载并还原为类型化值。
    pub fn decode_typed<T: DeserializeOwned>(&self, payload: Payload) -> Result<T, PayloadError> {
        self.decode_one(payload)?.deserialize_into()
    }

    /// 编码键值形式的负载表（备忘录、头部字段等）；整张表作为一个批次经过编解码管线。
    pub fn encode_map(
        &self,
        values: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Payload>, PayloadError> {
        let ordered: Vec<Value> = values.values().cloned().collect();
        let payloads = self.encode(&ordered)?;
        Ok(values.keys().cloned().zip(payloads).collect())
    }

    /// [`Self::encode_map`] 的逆。
    pub fn decode_map(
        &self,
        payloads: BTreeMap<String, Payload>,
    ) -> Result<BTreeMap<String, Value>, PayloadError> {
        let (keys, payloads): (Vec<_>, Vec<_>) = payloads.into_iter().unzip();
        let values = self.decode(payloads)?;
        Ok(keys.into_iter().zip(values).collect())
    }

    /// 编码并帧化为线缆字节。
    pub fn encode_to_wire(&self, values: &[Value]) -> Result<Bytes, PayloadError> {
        wire::encode_payloads(&self.encode(values)?)
    }

    /// 解析线缆字节并解码。
    pub fn decode_from_wire(&self, bytes: &[u8]) -> Result<Vec<Value>, PayloadError> {
        self.decode(wire::decode_payloads(bytes)?)
    }

    fn chain_label(&self) -> String {
        self.payload_codec.names().collect::<Vec<_>>().join(" -> ")
    }
}

impl Default for LoadedDataConverter {
    fn default() -> Self {
        Self::new(Arc::new(DefaultPayloadConverter::new()), CodecChain::identity())
    }
}

impl fmt::Debug for LoadedDataConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedDataConverter")
            .field("payload_codec", &self.payload_codec)
            .finish_non_exhaustive()
    }
}

/// 按配置装配数据转换器。
///
/// # 行为逻辑（How）
/// 1. 选择转换器：直接实例优先；否则解析 `payload_converter_path`；都没有则使用内置转换链；
/// 2. 依序解析编解码器来源，组装为 [`CodecChain`]；
/// 3. 记录装配结果并以 `Arc` 返回。
///
/// # 契约说明（What）
/// - 除解析外没有副作用，对同一配置与解析器重复调用得到等价结果；
/// - 显式路径解析失败时直接返回错误，绝不回退到内置转换链；
/// - 返回的错误均属于 [`crate::ErrorCategory::StartupFatal`]。
pub fn load_data_converter(
    config: &DataConverterConfig,
    resolver: &dyn ModuleResolver,
) -> Result<Arc<LoadedDataConverter>, PayloadError> {
    let (payload_converter, converter_source) = load_payload_converter(config, resolver)?;
    let payload_codec = load_payload_codec(config, resolver)?;

    info!(
        converter = %converter_source,
        codecs = ?payload_codec.names().collect::<Vec<_>>(),
        verify_roundtrip = config.verify_codec_roundtrip,
        "data converter loaded"
    );
    Ok(Arc::new(LoadedDataConverter::new(
        payload_converter,
        payload_codec,
    )))
}

fn load_payload_converter<'a>(
    config: &'a DataConverterConfig,
    resolver: &dyn ModuleResolver,
) -> Result<(Arc<dyn PayloadConverter>, Cow<'a, str>), PayloadError> {
    match (&config.payload_converter, &config.payload_converter_path) {
        (Some(instance), path) => {
            if let Some(path) = path {
                warn!(
                    reference = %path,
                    "payload converter instance takes precedence; payload converter path ignored"
                );
            }
            Ok((Arc::clone(instance), Cow::Borrowed("instance")))
        }
        (None, Some(path)) => {
            debug!(reference = %path, "resolving payload converter");
            let converter = resolve_payload_converter(resolver, path)?;
            Ok((converter, Cow::Borrowed(path.as_str())))
        }
        (None, None) => Ok((
            Arc::new(DefaultPayloadConverter::new()),
            Cow::Borrowed("default"),
        )),
    }
}

fn load_payload_codec(
    config: &DataConverterConfig,
    resolver: &dyn ModuleResolver,
) -> Result<CodecChain, PayloadError> {
    let codecs = config
        .codec_sources()
        .iter()
        .map(|source| -> Result<Arc<dyn PayloadCodec>, PayloadError> {
            match source {
                CodecSource::Instance(codec) => Ok(Arc::clone(codec)),
                CodecSource::Path(reference) => {
                    debug!(reference = %reference, "resolving payload codec");
                    resolve_payload_codec(resolver, reference)
                }
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CodecChain::new(codecs).with_roundtrip_verification(config.verify_codec_roundtrip))
}
