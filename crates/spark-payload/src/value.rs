//! 应用值模型。
//!
//! 工作流参数、返回值、信号与查询在进入负载层之前都表示为 [`Value`]。
//! 类型化的 Rust 值通过 serde 进出：[`Value::from_serialize`] / [`Value::deserialize_into`]。

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Number;

use crate::error::PayloadError;

/// JSON 文本允许的最大容器嵌套层数。
///
/// `serde_json` 解析时在第 128 层数组或对象处报告递归超限。
pub const MAX_JSON_DEPTH: usize = 127;

/// `Value` 描述一次跨边界传递的应用值。
///
/// # 设计背景（Why）
/// - 转换器按“值形状”认领：`Undefined` 归空值转换器，`Bytes` 归二进制转换器，其余交由 JSON 兜底；
/// - `Number` 复用 `serde_json::Number`，从类型上排除 `NaN`/`Infinity` 这类无法无损往返的浮点数；
/// - `Opaque` 表示宿主持有、但没有序列化形式的对象（例如回调），任何内置转换器都不会认领它。
///
/// # 契约说明（What）
/// - `Undefined` 与 `Null` 不同：前者编码为 `binary/null`，后者编码为 JSON `null`；
/// - `Object` 的键有序，保证 JSON 输出确定；
/// - 相等性按结构比较，`Opaque` 按引用身份比较。
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Bytes(Bytes),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Opaque(OpaqueValue),
}

impl Value {
    /// 返回值的形状名称，用于错误信息与日志。
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Opaque(_) => "opaque",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// 以 serde 将任意类型化值转为 [`Value`]。
    ///
    /// 无法序列化的输入（如非有限浮点数、非字符串键的映射）返回 [`PayloadError::Serialization`]。
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, PayloadError> {
        let json = serde_json::to_value(value)
            .map_err(|err| PayloadError::serialization("typed", err.to_string()))?;
        Ok(Value::from(json))
    }

    /// 以 serde 将 [`Value`] 还原为类型化值。
    ///
    /// `Undefined` 按 JSON `null` 处理，使 `Option<T>` 可以接收缺省参数；
    /// `Bytes` 还原为字节数组，`Opaque` 无法还原。
    pub fn deserialize_into<T: DeserializeOwned>(self) -> Result<T, PayloadError> {
        let json = self.into_json_lossy()?;
        serde_json::from_value(json)
            .map_err(|err| PayloadError::deserialization(std::any::type_name::<T>(), err))
    }

    /// 尝试无损转换为 JSON。
    ///
    /// 以下情况返回 `None`：树中任一位置出现 `Undefined`、`Bytes` 或 `Opaque`；
    /// 数组与对象的嵌套层数超过 [`MAX_JSON_DEPTH`]，此时产出的文本无法被 `serde_json` 读回。
    pub fn to_json(&self) -> Option<serde_json::Value> {
        self.to_json_within(MAX_JSON_DEPTH)
    }

    fn to_json_within(&self, remaining_depth: usize) -> Option<serde_json::Value> {
        Some(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                let remaining_depth = remaining_depth.checked_sub(1)?;
                serde_json::Value::Array(
                    items
                        .iter()
                        .map(|item| item.to_json_within(remaining_depth))
                        .collect::<Option<Vec<_>>>()?,
                )
            }
            Value::Object(entries) => {
                let remaining_depth = remaining_depth.checked_sub(1)?;
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json_within(remaining_depth)?);
                }
                serde_json::Value::Object(map)
            }
            Value::Undefined | Value::Bytes(_) | Value::Opaque(_) => return None,
        })
    }

    fn into_json_lossy(self) -> Result<serde_json::Value, PayloadError> {
        Ok(match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Bytes(bytes) => serde_json::Value::Array(
                bytes
                    .iter()
                    .map(|byte| serde_json::Value::from(*byte))
                    .collect(),
            ),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(Value::into_json_lossy)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key, value.into_json_lossy()?);
                }
                serde_json::Value::Object(map)
            }
            Value::Opaque(opaque) => {
                return Err(PayloadError::deserialization(
                    "opaque",
                    format!("opaque value `{}` has no serialized form", opaque.label()),
                ));
            }
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value.into())
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}

/// 没有序列化形式的宿主对象。
///
/// 相等性按 `Arc` 指针身份判定；`label` 仅用于日志与错误信息。
#[derive(Clone)]
pub struct OpaqueValue {
    label: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    pub fn new(label: impl Into<Arc<str>>, inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            label: label.into(),
            inner,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 尝试以具体类型借用内部对象。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueValue")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
