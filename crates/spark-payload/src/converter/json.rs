use crate::converter::PayloadConverterWithEncoding;
use crate::encoding::Encoding;
use crate::error::PayloadError;
use crate::payload::Payload;
use crate::value::Value;

/// 通用结构化转换器，产出 `json/plain` 负载，在组合链中充当兜底。
///
/// # 设计背景（Why）
/// - 绝大多数工作流参数是结构化数据，JSON 是各语言实现都能读写的最小公约数；
/// - 作为兜底必须排在所有特定转换器之后，否则会抢走本应由它们认领的值。
///
/// # 契约说明（What）
/// - 只认领整棵树都能无损表示为 JSON 的值：任意位置出现 `Undefined`、`Bytes`、`Opaque` 均不认领；
/// - 嵌套超过 [`MAX_JSON_DEPTH`](crate::value::MAX_JSON_DEPTH) 层的值同样不认领，避免产出无法解码的负载；
/// - 有限浮点数按最短往返表示输出，解码后逐位一致；
/// - 输出使用 `serde_json` 的紧凑格式，对象键有序，因此同一值总是产出相同字节；
/// - 解码时数据不是合法 JSON 返回 [`PayloadError::Deserialization`]。
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonPayloadConverter;

impl PayloadConverterWithEncoding for JsonPayloadConverter {
    fn encoding(&self) -> &Encoding {
        static ENCODING: Encoding = Encoding::JSON_PLAIN;
        &ENCODING
    }

    fn to_payload(&self, value: &Value) -> Option<Payload> {
        let json = value.to_json()?;
        // `serde_json::Value` 的序列化不会失败。
        let data = serde_json::to_vec(&json).ok()?;
        Some(Payload::new(&Encoding::JSON_PLAIN, data))
    }

    fn from_payload(&self, payload: &Payload) -> Result<Value, PayloadError> {
        let json: serde_json::Value = serde_json::from_slice(&payload.data)
            .map_err(|err| PayloadError::deserialization(Encoding::JSON_PLAIN.as_str(), err))?;
        Ok(Value::from(json))
    }
}
