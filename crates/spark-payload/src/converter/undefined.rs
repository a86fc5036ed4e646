use bytes::Bytes;

use crate::converter::PayloadConverterWithEncoding;
use crate::encoding::Encoding;
use crate::error::PayloadError;
use crate::payload::Payload;
use crate::value::Value;

/// 认领 [`Value::Undefined`]，产出数据为空的 `binary/null` 负载。
#[derive(Clone, Copy, Debug, Default)]
pub struct UndefinedPayloadConverter;

impl PayloadConverterWithEncoding for UndefinedPayloadConverter {
    fn encoding(&self) -> &Encoding {
        static ENCODING: Encoding = Encoding::BINARY_NULL;
        &ENCODING
    }

    fn to_payload(&self, value: &Value) -> Option<Payload> {
        value
            .is_undefined()
            .then(|| Payload::new(&Encoding::BINARY_NULL, Bytes::new()))
    }

    fn from_payload(&self, _payload: &Payload) -> Result<Value, PayloadError> {
        Ok(Value::Undefined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_undefined_is_claimed() {
        let converter = UndefinedPayloadConverter;
        let payload = converter
            .to_payload(&Value::Undefined)
            .expect("undefined 应被认领");
        assert!(payload.has_encoding(&Encoding::BINARY_NULL));
        assert!(payload.data.is_empty());
        assert!(converter.to_payload(&Value::Null).is_none());
    }
}
