use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::converter::{
    BinaryPayloadConverter, JsonPayloadConverter, PayloadConverter, PayloadConverterWithEncoding,
    UndefinedPayloadConverter,
};
use crate::error::PayloadError;
use crate::payload::Payload;
use crate::value::Value;

/// `CompositePayloadConverter` 按固定顺序编码、按标签分发解码。
///
/// # 设计背景（Why）
/// - 编码阶段需要“越具体越靠前”：兜底转换器若排在前面，会抢走本应由特定转换器认领的值；
/// - 解码阶段则不能依赖本地顺序：负载携带 `encoding` 标签，必须确定地找到产生它的那个转换器。
///
/// # 行为逻辑（How）
/// 1. 构造时保存有序列表，并一次性建立 `标签 → 转换器` 的哈希表；
/// 2. `to_payload` 依序询问，返回第一个认领者的负载；
/// 3. `from_payload` 读取标签后 O(1) 查表分发。
///
/// # 契约说明（What）
/// - 无人认领时返回 [`PayloadError::Serialization`]；
/// - 标签缺失返回 [`PayloadError::MissingEncoding`]，未注册返回 [`PayloadError::UnknownEncoding`]；
/// - 两个转换器声明相同标签时，排在前面的保留该标签（与编码顺序一致），后者仅记录告警；
/// - 构造完成后不可变，可被任意数量的线程并发调用。
#[derive(Clone)]
pub struct CompositePayloadConverter {
    converters: Vec<Arc<dyn PayloadConverterWithEncoding>>,
    by_encoding: HashMap<String, Arc<dyn PayloadConverterWithEncoding>>,
}

impl CompositePayloadConverter {
    /// 以有序转换器列表构造组合转换器。
    pub fn new(converters: Vec<Arc<dyn PayloadConverterWithEncoding>>) -> Self {
        let mut by_encoding = HashMap::with_capacity(converters.len());
        for converter in &converters {
            let tag = converter.encoding().as_str().to_owned();
            match by_encoding.entry(tag) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(converter));
                }
                Entry::Occupied(slot) => {
                    warn!(
                        encoding = %slot.key(),
                        "payload converter shadowed by an earlier converter with the same encoding"
                    );
                }
            }
        }
        Self {
            converters,
            by_encoding,
        }
    }

    /// 已注册的标签，按编码顺序排列。
    pub fn encodings(&self) -> impl Iterator<Item = &str> {
        self.converters
            .iter()
            .map(|converter| converter.encoding().as_str())
    }
}

impl fmt::Debug for CompositePayloadConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.encodings()).finish()
    }
}

impl PayloadConverter for CompositePayloadConverter {
    fn to_payload(&self, value: &Value) -> Result<Payload, PayloadError> {
        for converter in &self.converters {
            if let Some(payload) = converter.to_payload(value) {
                trace!(encoding = %converter.encoding(), kind = value.kind(), "value claimed");
                return Ok(payload);
            }
        }
        Err(PayloadError::serialization(
            value.kind(),
            format!(
                "none of [{}] can represent this value",
                self.encodings().collect::<Vec<_>>().join(", ")
            ),
        ))
    }

    fn from_payload(&self, payload: &Payload) -> Result<Value, PayloadError> {
        let encoding = payload.encoding()?;
        let converter =
            self.by_encoding
                .get(encoding)
                .ok_or_else(|| PayloadError::UnknownEncoding {
                    encoding: encoding.to_owned(),
                })?;
        trace!(encoding, "payload dispatched");
        converter.from_payload(payload)
    }
}

/// 内置转换链：`binary/null` → `binary/plain` → `json/plain`。
///
/// 每个客户端/Worker 显式构造自己的实例并通过 [`crate::LoadedDataConverter`] 共享，不存在进程级单例。
#[derive(Clone, Debug)]
pub struct DefaultPayloadConverter {
    inner: CompositePayloadConverter,
}

impl DefaultPayloadConverter {
    pub fn new() -> Self {
        Self {
            inner: CompositePayloadConverter::new(Self::builtin_converters()),
        }
    }

    /// 内置转换器的有序列表，供需要在其前后插入自定义转换器的调用方复用。
    pub fn builtin_converters() -> Vec<Arc<dyn PayloadConverterWithEncoding>> {
        vec![
            Arc::new(UndefinedPayloadConverter),
            Arc::new(BinaryPayloadConverter),
            Arc::new(JsonPayloadConverter),
        ]
    }
}

impl Default for DefaultPayloadConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadConverter for DefaultPayloadConverter {
    fn to_payload(&self, value: &Value) -> Result<Payload, PayloadError> {
        self.inner.to_payload(value)
    }

    fn from_payload(&self, payload: &Payload) -> Result<Value, PayloadError> {
        self.inner.from_payload(payload)
    }
}
