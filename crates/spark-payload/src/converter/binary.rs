use crate::converter::PayloadConverterWithEncoding;
use crate::encoding::Encoding;
use crate::error::PayloadError;
use crate::payload::Payload;
use crate::value::Value;

/// 认领顶层 [`Value::Bytes`]，数据原样写入 `binary/plain` 负载，不做任何复制以外的变换。
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryPayloadConverter;

impl PayloadConverterWithEncoding for BinaryPayloadConverter {
    fn encoding(&self) -> &Encoding {
        static ENCODING: Encoding = Encoding::BINARY_PLAIN;
        &ENCODING
    }

    fn to_payload(&self, value: &Value) -> Option<Payload> {
        match value {
            Value::Bytes(bytes) => Some(Payload::new(&Encoding::BINARY_PLAIN, bytes.clone())),
            _ => None,
        }
    }

    fn from_payload(&self, payload: &Payload) -> Result<Value, PayloadError> {
        Ok(Value::Bytes(payload.data.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn bytes_round_trip_unchanged() {
        let converter = BinaryPayloadConverter;
        let value = Value::Bytes(Bytes::from_static(&[0, 159, 146, 150]));
        let payload = converter.to_payload(&value).expect("字节应被认领");
        assert_eq!(payload.data.as_ref(), &[0, 159, 146, 150]);
        assert_eq!(converter.from_payload(&payload).expect("解码"), value);
        assert!(converter.to_payload(&Value::from("text")).is_none());
    }
}
