//! 数据转换器的配置面：代码中直接构造的 [`DataConverterConfig`]，
//! 以及可从 TOML/JSON 文件读取的 [`DataConverterSettings`]。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::PayloadCodec;
use crate::converter::PayloadConverter;
use crate::error::PayloadError;

/// 单个编解码器的来源。
#[derive(Clone)]
pub enum CodecSource {
    /// 已构造好的实例，原样使用。
    Instance(Arc<dyn PayloadCodec>),
    /// 模块引用，加载时通过 [`crate::ModuleResolver`] 解析。
    Path(String),
}

impl fmt::Debug for CodecSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(codec) => f
                .debug_tuple("Instance")
                .field(&codec.descriptor().name())
                .finish(),
            Self::Path(reference) => f.debug_tuple("Path").field(reference).finish(),
        }
    }
}

impl From<Arc<dyn PayloadCodec>> for CodecSource {
    fn from(value: Arc<dyn PayloadCodec>) -> Self {
        Self::Instance(value)
    }
}

impl From<String> for CodecSource {
    fn from(value: String) -> Self {
        Self::Path(value)
    }
}

impl From<&str> for CodecSource {
    fn from(value: &str) -> Self {
        Self::Path(value.to_owned())
    }
}

/// 编解码器选择：单个或有序序列。
#[derive(Clone, Debug)]
pub enum PayloadCodecSelection {
    Single(CodecSource),
    Sequence(Vec<CodecSource>),
}

impl PayloadCodecSelection {
    /// 规范化为按编码顺序排列的来源列表。
    pub fn sources(&self) -> &[CodecSource] {
        match self {
            Self::Single(source) => std::slice::from_ref(source),
            Self::Sequence(sources) => sources,
        }
    }
}

/// `DataConverterConfig` 描述如何装配一个 [`crate::LoadedDataConverter`]。
///
/// # 契约说明（What）
/// - 全部字段为空时得到内置转换链与恒等编解码管线；
/// - `payload_converter` 与 `payload_converter_path` 同时给出时实例优先，路径不会被解析；
/// - 配置本身不做任何 I/O，解析推迟到 [`crate::load_data_converter`]。
#[derive(Clone, Default)]
pub struct DataConverterConfig {
    pub payload_converter_path: Option<String>,
    pub payload_converter: Option<Arc<dyn PayloadConverter>>,
    pub payload_codec: Option<PayloadCodecSelection>,
    pub verify_codec_roundtrip: bool,
}

impl DataConverterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload_converter_path(mut self, reference: impl Into<String>) -> Self {
        self.payload_converter_path = Some(reference.into());
        self
    }

    pub fn with_payload_converter(mut self, converter: Arc<dyn PayloadConverter>) -> Self {
        self.payload_converter = Some(converter);
        self
    }

    /// 只使用一个编解码器。
    pub fn with_payload_codec(mut self, source: impl Into<CodecSource>) -> Self {
        self.payload_codec = Some(PayloadCodecSelection::Single(source.into()));
        self
    }

    /// 使用有序编解码器序列，首个元素最先编码、最后解码。
    pub fn with_payload_codecs<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CodecSource>,
    {
        self.payload_codec = Some(PayloadCodecSelection::Sequence(
            sources.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn with_codec_roundtrip_verification(mut self, enabled: bool) -> Self {
        self.verify_codec_roundtrip = enabled;
        self
    }

    /// 规范化后的编解码器来源；未配置时为空。
    pub fn codec_sources(&self) -> &[CodecSource] {
        match &self.payload_codec {
            Some(selection) => selection.sources(),
            None => &[],
        }
    }
}

impl fmt::Debug for DataConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataConverterConfig")
            .field("payload_converter_path", &self.payload_converter_path)
            .field("payload_converter", &self.payload_converter.is_some())
            .field("payload_codec", &self.payload_codec)
            .field("verify_codec_roundtrip", &self.verify_codec_roundtrip)
            .finish()
    }
}

/// 文件形式的数据转换器配置。
///
/// ```toml
/// payload_converter_path = "acme/converters/msgpack"
/// payload_codec_paths = ["acme/codecs/zstd"]
/// verify_codec_roundtrip = false
/// ```
///
/// 未知字段会被拒绝，避免拼写错误被静默忽略。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConverterSettings {
    pub payload_converter_path: Option<String>,
    pub payload_codec_paths: Vec<String>,
    pub verify_codec_roundtrip: bool,
}

impl DataConverterSettings {
    /// 解析 TOML 文本。
    pub fn from_toml_str(source: &str) -> Result<Self, PayloadError> {
        toml::from_str(source).map_err(|err| PayloadError::InvalidSettings {
            reason: err.to_string(),
        })
    }

    /// 解析 JSON 文本。
    pub fn from_json_str(source: &str) -> Result<Self, PayloadError> {
        serde_json::from_str(source).map_err(|err| PayloadError::InvalidSettings {
            reason: err.to_string(),
        })
    }

    /// 转为加载配置，编解码器来源全部为 [`CodecSource::Path`]。
    pub fn into_config(self) -> DataConverterConfig {
        DataConverterConfig {
            payload_converter_path: self.payload_converter_path,
            payload_converter: None,
            payload_codec: (!self.payload_codec_paths.is_empty()).then(|| {
                PayloadCodecSelection::Sequence(
                    self.payload_codec_paths
                        .into_iter()
                        .map(CodecSource::Path)
                        .collect(),
                )
            }),
            verify_codec_roundtrip: self.verify_codec_roundtrip,
        }
    }
}
