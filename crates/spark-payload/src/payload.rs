use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::encoding::{Encoding, METADATA_ENCODING_KEY};
use crate::error::PayloadError;

/// `Payload` 是一次编码结果的线缆信封：带标签的元数据与二进制数据。
///
/// # 设计背景（Why）
/// - 负载必须自描述：无论本地配置如何，解码端都能通过 `encoding` 元数据识别生产者；
/// - 元数据使用 `BTreeMap` 保持键序确定，同一负载在任何进程中都帧化为相同字节。
///
/// # 契约说明（What）
/// - 由转换器产出的负载一定携带 [`METADATA_ENCODING_KEY`]；
/// - `data` 的解释权完全属于该标签对应的转换器或编解码器；
/// - 结构体可克隆、可比较，克隆只增加 `Bytes` 的引用计数。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub metadata: BTreeMap<String, Bytes>,
    pub data: Bytes,
}

impl Payload {
    /// 以编码标签与数据构造负载。
    pub fn new(encoding: &Encoding, data: impl Into<Bytes>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            METADATA_ENCODING_KEY.to_owned(),
            Bytes::copy_from_slice(encoding.as_bytes()),
        );
        Self {
            metadata,
            data: data.into(),
        }
    }

    /// 追加一条元数据。
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 读取 `encoding` 标签。
    ///
    /// # 契约说明（What）
    /// - 缺少该键返回 [`PayloadError::MissingEncoding`]；
    /// - 标签不是合法 UTF-8 时返回 [`PayloadError::UnknownEncoding`]，内容按有损方式展示。
    pub fn encoding(&self) -> Result<&str, PayloadError> {
        let raw = self
            .metadata
            .get(METADATA_ENCODING_KEY)
            .ok_or(PayloadError::MissingEncoding)?;
        std::str::from_utf8(raw).map_err(|_| PayloadError::UnknownEncoding {
            encoding: String::from_utf8_lossy(raw).into_owned(),
        })
    }

    /// 判断负载是否带有指定标签。
    pub fn has_encoding(&self, encoding: &Encoding) -> bool {
        self.metadata
            .get(METADATA_ENCODING_KEY)
            .is_some_and(|raw| raw.as_ref() == encoding.as_bytes())
    }

    /// 读取任意元数据。
    pub fn metadata_value(&self, key: &str) -> Option<&Bytes> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_payload_carries_encoding_tag() {
        let payload = Payload::new(&Encoding::JSON_PLAIN, &b"1"[..]);
        assert_eq!(payload.encoding().expect("应包含 encoding"), "json/plain");
        assert!(payload.has_encoding(&Encoding::JSON_PLAIN));
        assert!(!payload.has_encoding(&Encoding::BINARY_PLAIN));
    }

    #[test]
    fn missing_encoding_is_reported() {
        let payload = Payload::default();
        assert!(matches!(
            payload.encoding(),
            Err(PayloadError::MissingEncoding)
        ));
    }

    #[test]
    fn non_utf8_encoding_is_unknown() {
        let payload = Payload::default().with_metadata(
            METADATA_ENCODING_KEY,
            Bytes::from_static(&[0xff, 0xfe]),
        );
        assert!(matches!(
            payload.encoding(),
            Err(PayloadError::UnknownEncoding { .. })
        ));
    }
}
