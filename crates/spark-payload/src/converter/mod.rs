//! 负载转换器契约的双层抽象：按标签认领的类型化转换器，与面向调用方的组合转换器。
//!
//! - [`PayloadConverterWithEncoding`]：只认领一部分值形状，并声明自己产出的 `encoding` 标签；
//! - [`PayloadConverter`]：对象安全的完整转换能力，组合转换器与外部插件都实现它。

mod binary;
mod composite;
mod json;
mod undefined;

use std::sync::Arc;

use crate::encoding::Encoding;
use crate::error::PayloadError;
use crate::payload::Payload;
use crate::value::Value;

pub use binary::BinaryPayloadConverter;
pub use composite::{CompositePayloadConverter, DefaultPayloadConverter};
pub use json::JsonPayloadConverter;
pub use undefined::UndefinedPayloadConverter;

/// `PayloadConverter` 在应用值与负载之间双向转换。
///
/// # 设计初衷（Why）
/// - 工作流/活动调用层只认识这一个接口，内置组合转换器与用户插件可以互换；
/// - 对象安全，便于以 `Arc<dyn PayloadConverter>` 在进程内共享。
///
/// # 契约说明（What）
/// - `to_payload` 返回 [`PayloadError::Serialization`] 表示“不认领此值”，不得产出损坏的负载；
/// - `from_payload` 必须是 `to_payload` 的逆：对其认领的任何值 `v`，`from_payload(to_payload(v)) == v`；
/// - 两个方法都只接收 `&self`，实现不得保留调用级可变状态，可被并发调用。
pub trait PayloadConverter: Send + Sync + 'static {
    /// 将值编码为负载。
    fn to_payload(&self, value: &Value) -> Result<Payload, PayloadError>;

    /// 将负载解码为值。
    fn from_payload(&self, payload: &Payload) -> Result<Value, PayloadError>;
}

/// `PayloadConverterWithEncoding` 是只认领特定值形状的类型化转换器。
///
/// # 契约说明（What）
/// - `to_payload` 返回 `None` 表示不认领，组合转换器会继续尝试下一个；
/// - 产出的负载必须带有 [`Self::encoding`] 声明的标签；
/// - `from_payload` 只会收到带有该标签的负载。
pub trait PayloadConverterWithEncoding: Send + Sync + 'static {
    /// 本转换器产出的编码标签。
    fn encoding(&self) -> &Encoding;

    /// 尝试认领并编码值。
    fn to_payload(&self, value: &Value) -> Option<Payload>;

    /// 解码带有本转换器标签的负载。
    fn from_payload(&self, payload: &Payload) -> Result<Value, PayloadError>;
}

impl<T: PayloadConverter + ?Sized> PayloadConverter for Arc<T> {
    fn to_payload(&self, value: &Value) -> Result<Payload, PayloadError> {
        (**self).to_payload(value)
    }

    fn from_payload(&self, payload: &Payload) -> Result<Value, PayloadError> {
        (**self).from_payload(payload)
    }
}

/// 依次编码多个值，任一失败即返回错误。
pub fn to_payloads(
    converter: &dyn PayloadConverter,
    values: &[Value],
) -> Result<Vec<Payload>, PayloadError> {
    values.iter().map(|value| converter.to_payload(value)).collect()
}

/// 依次解码多个负载，任一失败即返回错误。
pub fn from_payloads(
    converter: &dyn PayloadConverter,
    payloads: &[Payload],
) -> Result<Vec<Value>, PayloadError> {
    payloads
        .iter()
        .map(|payload| converter.from_payload(payload))
        .collect()
}
