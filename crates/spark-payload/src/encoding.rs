use std::borrow::Cow;
use std::fmt;

/// 负载元数据中标识编码来源的保留键。
pub const METADATA_ENCODING_KEY: &str = "encoding";

/// 加密编解码器记录密钥标识所用的元数据键。
pub const METADATA_ENCRYPTION_KEY_ID: &str = "encryption-key-id";

/// `Encoding` 描述负载 `encoding` 元数据标签，是跨进程、跨语言识别转换器的唯一依据。
///
/// # 设计背景（Why）
/// - 解码端必须在不依赖本地转换器顺序的前提下确定负载由谁产生，因此标签必须随负载一起传输；
/// - 通过 `Cow<'static, str>` 兼容内置常量与插件在运行时声明的扩展标签，避免过度复制。
///
/// # 契约说明（What）
/// - **前置条件**：标签采用 `<格式>/<变体>` 形式（如 `json/plain`），推荐全小写；
/// - **后置条件**：同一实现在所有进程中产生相同标签，不因配置而漂移。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Encoding(Cow<'static, str>);

impl Encoding {
    /// 空值（`undefined`）转换器的标签。
    pub const BINARY_NULL: Encoding = Encoding(Cow::Borrowed("binary/null"));
    /// 原始字节转换器的标签。
    pub const BINARY_PLAIN: Encoding = Encoding(Cow::Borrowed("binary/plain"));
    /// JSON 结构化转换器的标签。
    pub const JSON_PLAIN: Encoding = Encoding(Cow::Borrowed("json/plain"));
    /// 压缩编解码器包装后的标签。
    pub const BINARY_GZIP: Encoding = Encoding(Cow::Borrowed("binary/gzip"));
    /// 加密编解码器包装后的标签。
    pub const BINARY_ENCRYPTED: Encoding = Encoding(Cow::Borrowed("binary/encrypted"));

    /// 创建新的编码标签。
    pub fn new(value: impl Into<Cow<'static, str>>) -> Self {
        Self(value.into())
    }

    /// 以静态字符串创建标签，可用于 `const` 上下文。
    pub const fn from_static(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    /// 返回底层字符串表示。
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 返回写入元数据时使用的字节形式。
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Encoding {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

/// `CodecDescriptor` 描述一个负载编解码器的身份。
///
/// # 设计背景（Why）
/// - 管线在报告 [`crate::PayloadError::CodecEncode`] / [`crate::PayloadError::CodecInverseMismatch`]
///   时需要指明是哪一个编解码器失败；
/// - 描述符同时记录编解码器产出的包装标签（若有），便于日志与排障。
///
/// # 契约说明（What）
/// - `name` 在同一管线内应唯一，推荐小写连字符风格（如 `gzip`、`aes-256-gcm`）；
/// - `output_encoding` 为 `None` 表示编解码器不改写 `encoding` 标签（例如只改写数据字节）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecDescriptor {
    name: Cow<'static, str>,
    output_encoding: Option<Encoding>,
}

impl CodecDescriptor {
    /// 以名称构建描述符。
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            output_encoding: None,
        }
    }

    /// 声明编解码器产出的包装标签。
    pub fn with_output_encoding(mut self, encoding: Encoding) -> Self {
        self.output_encoding = Some(encoding);
        self
    }

    /// 获取名称。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 获取可选的包装标签。
    pub fn output_encoding(&self) -> Option<&Encoding> {
        self.output_encoding.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tags_are_stable() {
        assert_eq!(Encoding::BINARY_NULL.as_str(), "binary/null");
        assert_eq!(Encoding::BINARY_PLAIN.as_str(), "binary/plain");
        assert_eq!(Encoding::JSON_PLAIN.as_str(), "json/plain");
        assert_eq!(Encoding::new("json/plain"), Encoding::JSON_PLAIN);
    }
}
