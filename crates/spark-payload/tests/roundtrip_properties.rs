//! 负载往返性质验证
//!
//! - **核心目标 (Why)**：任何可表示的值经内置转换链编码后都能原样解码；任意负载列表经两段编解码管线
//!   往返后保持不变，并且解码严格按“后编码者先解码”的顺序执行。
//! - **设计手法 (How)**：Proptest 生成 JSON 可表示的值树，外加顶层的 `Undefined` 与原始字节；
//!   管线性质使用两个顺序敏感的测试编解码器（异或 + 整体帧化），顺序一旦颠倒，逆变换就会失败。
//! - **边界 (What)**：数字覆盖全范围整数与任意有限浮点数，浮点数必须逐位还原；非有限浮点数无法构造为 `Value`。

use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;
use spark_payload::{
    CodecChain, CodecDescriptor, CodecError, Encoding, LoadedDataConverter, Payload,
    PayloadCodec, Value, map_payloads, wire,
};

/// 对数据逐字节异或，元数据不变。
struct XorCodec {
    descriptor: CodecDescriptor,
    key: u8,
}

impl PayloadCodec for XorCodec {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_payloads(payloads, |mut payload| {
            payload.data = payload.data.iter().map(|byte| byte ^ self.key).collect();
            Ok(payload)
        })
    }

    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        self.encode(payloads)
    }
}

/// 把整个负载帧化后装进新负载，只解开自己产出的负载。
struct FrameCodec {
    descriptor: CodecDescriptor,
}

const FRAMED: Encoding = Encoding::from_static("binary/test-framed");

impl PayloadCodec for FrameCodec {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_payloads(payloads, |payload| {
            Ok(Payload::new(&FRAMED, wire::encode_payload(&payload)?))
        })
    }

    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_payloads(payloads, |payload| {
            if !payload.has_encoding(&FRAMED) {
                return Err(CodecError::new("payload was not framed by this codec"));
            }
            Ok(wire::decode_payload(&payload.data)?)
        })
    }
}

fn pipeline() -> CodecChain {
    let codecs: Vec<Arc<dyn PayloadCodec>> = vec![
        Arc::new(XorCodec {
            descriptor: CodecDescriptor::new("xor"),
            key: 0x5a,
        }),
        Arc::new(FrameCodec {
            descriptor: CodecDescriptor::new("frame"),
        }),
    ];
    CodecChain::new(codecs)
}

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        any::<f64>().prop_filter_map("JSON 只能表示有限浮点数", |float| {
            serde_json::Number::from_f64(float).map(Value::Number)
        }),
        ".{0,16}".prop_map(Value::String),
    ]
}

fn json_tree() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(".{0,8}", inner, 0..6).prop_map(Value::Object),
        ]
    })
}

fn representable_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Undefined),
        2 => prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::from),
        7 => json_tree(),
    ]
}

fn arbitrary_payload() -> impl Strategy<Value = Payload> {
    (
        prop::sample::select(vec!["binary/null", "binary/plain", "json/plain"]),
        prop::collection::btree_map("[a-d]{1,3}", prop::collection::vec(any::<u8>(), 0..8), 0..4),
        prop::collection::vec(any::<u8>(), 0..128),
    )
        .prop_map(|(encoding, metadata, data)| {
            metadata.into_iter().fold(
                Payload::new(&Encoding::new(encoding), Bytes::from(data)),
                |payload, (key, value)| payload.with_metadata(key, value),
            )
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_representable_values_roundtrip(values in prop::collection::vec(representable_value(), 0..6)) {
        let converter = LoadedDataConverter::default();
        let payloads = converter.encode(&values).expect("可表示的值必须被认领");
        prop_assert_eq!(payloads.len(), values.len());
        prop_assert!(payloads.iter().all(|payload| payload.encoding().is_ok()));
        prop_assert_eq!(converter.decode(payloads).expect("解码"), values);
    }

    #[test]
    fn prop_two_stage_pipeline_roundtrips(payloads in prop::collection::vec(arbitrary_payload(), 0..8)) {
        let chain = pipeline();
        let encoded = chain.encode(payloads.clone()).expect("编码");
        prop_assert_eq!(encoded.len(), payloads.len());
        prop_assert_eq!(chain.decode(encoded).expect("解码"), payloads);
    }

    #[test]
    fn prop_wire_bytes_roundtrip(values in prop::collection::vec(representable_value(), 0..6)) {
        let converter = LoadedDataConverter::new(
            Arc::new(spark_payload::DefaultPayloadConverter::new()),
            pipeline(),
        );
        let bytes = converter.encode_to_wire(&values).expect("帧化");
        prop_assert_eq!(converter.decode_from_wire(&bytes).expect("解析"), values);
    }
}

#[test]
fn decoding_in_forward_order_fails() {
    let chain = pipeline();
    let encoded = chain
        .encode(vec![Payload::new(&Encoding::JSON_PLAIN, &b"1"[..])])
        .expect("编码");

    // 以相反顺序组装同样的编解码器，解码会先对帧化负载做异或，进而解帧失败。
    let codecs: Vec<Arc<dyn PayloadCodec>> = vec![
        Arc::new(FrameCodec {
            descriptor: CodecDescriptor::new("frame"),
        }),
        Arc::new(XorCodec {
            descriptor: CodecDescriptor::new("xor"),
            key: 0x5a,
        }),
    ];
    assert!(CodecChain::new(codecs).decode(encoded).is_err());
}

#[test]
fn undefined_maps_to_binary_null() {
    let converter = LoadedDataConverter::default();
    let payload = converter.encode_one(&Value::Undefined).expect("编码");
    assert!(payload.has_encoding(&Encoding::BINARY_NULL));
    assert!(payload.data.is_empty());
    assert_eq!(converter.decode_one(payload).expect("解码"), Value::Undefined);
}

#[test]
fn overly_nested_value_fails_at_encode_not_decode() {
    let converter = LoadedDataConverter::default();
    let nest = |depth: usize| (0..depth).fold(Value::Null, |inner, _| Value::Array(vec![inner]));

    let deepest = nest(spark_payload::MAX_JSON_DEPTH);
    let payload = converter.encode_one(&deepest).expect("极限深度内可编码");
    assert_eq!(converter.decode_one(payload).expect("解码"), deepest);

    let err = converter.encode_one(&nest(200)).expect_err("超深嵌套不应产出负载");
    assert!(matches!(err, spark_payload::PayloadError::Serialization { .. }));
}
