//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 负载转换与编解码管线的全部失败路径在此合流，调用方只需匹配一个 [`PayloadError`]；
//! - 区分“启动期致命”“单次调用失败”“生产者/消费者协议不一致”三类处置策略，避免上层解析字符串。
//!
//! ## 设计要求（What）
//! - 每个变体都携带稳定错误码（参见 [`codes`]），命名遵循 `<域>.<语义>`；
//! - 所有错误均不可重试：加载失败需要修正配置，调用期失败需要修正数据或版本。

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// 稳定错误码常量。
///
/// 错误码会进入日志与告警聚合，修改任何常量值都属于破坏性变更。
pub mod codes {
    /// 外部模块引用无法定位。
    pub const MODULE_NOT_FOUND: &str = "payload.module_not_found";
    /// 模块导出缺少必需能力。
    pub const INVALID_SHAPE: &str = "payload.invalid_shape";
    /// 同一引用重复注册。
    pub const DUPLICATE_MODULE: &str = "payload.duplicate_module";
    /// 配置文件无法解析。
    pub const INVALID_SETTINGS: &str = "payload.invalid_settings";
    /// 没有任何转换器认领该值。
    pub const SERIALIZATION: &str = "payload.serialization";
    /// 负载数据无法还原为值。
    pub const DESERIALIZATION: &str = "payload.deserialization";
    /// 负载缺少 `encoding` 元数据。
    pub const MISSING_ENCODING: &str = "payload.missing_encoding";
    /// `encoding` 标签没有注册转换器。
    pub const UNKNOWN_ENCODING: &str = "payload.unknown_encoding";
    /// 编解码器正向变换失败。
    pub const CODEC_ENCODE: &str = "payload.codec_encode";
    /// 编解码器的逆变换未能还原输入。
    pub const CODEC_INVERSE_MISMATCH: &str = "payload.codec_inverse_mismatch";
    /// 线缆字节帧格式损坏。
    pub const MALFORMED_WIRE: &str = "payload.malformed_wire";
}

/// 错误的处置分类。
///
/// - `StartupFatal`：配置或加载阶段失败，宿主必须中止启动；
/// - `Invocation`：仅影响当前一次工作流/活动调用，进程继续运行；
/// - `ProtocolMismatch`：生产者与消费者的编码约定不一致，在调用点视为致命且不得重试。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    StartupFatal,
    Invocation,
    ProtocolMismatch,
}

/// `PayloadError` 是负载层对外暴露的唯一错误类型。
///
/// # 教案式说明
/// - **意图 (Why)**：将模块解析、形状校验、值序列化、标签分发与编解码逆变换的失败统一建模，
///   使调用方可以按 [`ErrorCategory`] 决定中止启动或仅失败当前调用；
/// - **契约 (What)**：
///   - 变体均为 `Send + Sync + 'static`，可跨线程传递；
///   - [`PayloadError::code`] 返回 [`codes`] 中的稳定错误码；
///   - 调用期错误绝不会被替换为默认值或被静默丢弃；
/// - **设计权衡 (Trade-offs)**：上下文使用 `String` 保存，牺牲少量分配换取排障时的可读性。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PayloadError {
    /// 外部转换器/编解码器引用无法被解析器定位。
    #[error("cannot resolve payload module `{reference}`")]
    ModuleResolution { reference: String },

    /// 模块已解析，但导出对象缺少必需的可调用成员。
    #[error(
        "module `{reference}` export `{export}` is missing required capability `{capability}`"
    )]
    InvalidShape {
        reference: String,
        export: String,
        capability: String,
    },

    /// 同一引用在注册表中出现两次。
    #[error("payload module `{reference}` is already registered")]
    DuplicateModule { reference: String },

    /// 配置文件（TOML/JSON）无法解析。
    #[error("invalid data converter settings: {reason}")]
    InvalidSettings { reason: String },

    /// 转换链中没有转换器认领该值，或值本身不可表示。
    #[error("no payload converter claims value of kind `{kind}`: {detail}")]
    Serialization { kind: &'static str, detail: String },

    /// 已找到转换器，但负载数据无法还原。
    #[error("payload with encoding `{encoding}` could not be decoded: {reason}")]
    Deserialization { encoding: String, reason: String },

    /// 负载元数据中没有 `encoding` 键。
    #[error("payload metadata is missing the `encoding` key")]
    MissingEncoding,

    /// `encoding` 标签在本进程中没有注册转换器。
    #[error("payload encoding `{encoding}` has no registered converter")]
    UnknownEncoding { encoding: String },

    /// 编解码器在正向变换时失败。
    #[error("codec `{codec}` failed to encode payloads: {source}")]
    CodecEncode {
        codec: String,
        #[source]
        source: CodecError,
    },

    /// 编解码器的 decode 未能还原其 encode 的输出。
    #[error("codec `{codec}` failed to invert its encoded output: {reason}")]
    CodecInverseMismatch { codec: String, reason: String },

    /// 线缆字节帧损坏或被截断。
    #[error("malformed payload wire bytes: {reason}")]
    MalformedWire { reason: String },
}

impl PayloadError {
    /// 构造“未被认领”的序列化错误。
    pub fn serialization(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::Serialization {
            kind,
            detail: detail.into(),
        }
    }

    /// 构造反序列化错误。
    pub fn deserialization(encoding: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Deserialization {
            encoding: encoding.into(),
            reason: reason.to_string(),
        }
    }

    /// 构造线缆格式错误。
    pub fn malformed_wire(reason: impl Into<String>) -> Self {
        Self::MalformedWire {
            reason: reason.into(),
        }
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModuleResolution { .. } => codes::MODULE_NOT_FOUND,
            Self::InvalidShape { .. } => codes::INVALID_SHAPE,
            Self::DuplicateModule { .. } => codes::DUPLICATE_MODULE,
            Self::InvalidSettings { .. } => codes::INVALID_SETTINGS,
            Self::Serialization { .. } => codes::SERIALIZATION,
            Self::Deserialization { .. } => codes::DESERIALIZATION,
            Self::MissingEncoding => codes::MISSING_ENCODING,
            Self::UnknownEncoding { .. } => codes::UNKNOWN_ENCODING,
            Self::CodecEncode { .. } => codes::CODEC_ENCODE,
            Self::CodecInverseMismatch { .. } => codes::CODEC_INVERSE_MISMATCH,
            Self::MalformedWire { .. } => codes::MALFORMED_WIRE,
        }
    }

    /// 获取处置分类。
    ///
    /// # 契约说明（What）
    /// - 加载期错误统一归为 [`ErrorCategory::StartupFatal`]；
    /// - 标签缺失/未知、逆变换不一致、线缆损坏意味着两端约定不一致，归为 [`ErrorCategory::ProtocolMismatch`]；
    /// - 其余为单次调用失败。
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ModuleResolution { .. }
            | Self::InvalidShape { .. }
            | Self::DuplicateModule { .. }
            | Self::InvalidSettings { .. } => ErrorCategory::StartupFatal,
            Self::MissingEncoding
            | Self::UnknownEncoding { .. }
            | Self::CodecInverseMismatch { .. }
            | Self::MalformedWire { .. } => ErrorCategory::ProtocolMismatch,
            Self::Serialization { .. }
            | Self::Deserialization { .. }
            | Self::CodecEncode { .. } => ErrorCategory::Invocation,
        }
    }

    /// 负载层错误均不可重试。
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// 编解码器实现向管线报告的失败。
///
/// 管线会把它包装为 [`PayloadError::CodecEncode`] 或 [`PayloadError::CodecInverseMismatch`]，
/// 并补上编解码器名称。
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CodecError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl CodecError {
    /// 以描述信息构造错误。
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// 附带底层原因。
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// 获取描述信息。
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<PayloadError> for CodecError {
    fn from(value: PayloadError) -> Self {
        CodecError::new(value.to_string()).with_source(value)
    }
}
