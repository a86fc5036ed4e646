#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "spark-payload: 工作流客户端的负载转换器与编解码管线。"]
#![doc = ""]
#![doc = "== 数据流 =="]
#![doc = "编码：值 → 组合转换器 → 带 `encoding` 标签的负载 → 编解码管线（正序）→ 可选的线缆帧。"]
#![doc = "解码：线缆帧 → 编解码管线（逆序）→ 按 `encoding` 标签分发 → 值。"]
#![doc = ""]
#![doc = "== 装配 =="]
#![doc = "宿主在启动时以 [`DataConverterConfig`] 与 [`ModuleResolver`] 调用 [`load_data_converter`]，"]
#![doc = "得到不可变的 [`LoadedDataConverter`] 并在整个进程内共享；本库不安装任何 tracing 订阅者。"]

pub mod codec;
pub mod config;
pub mod converter;
pub mod data_converter;
pub mod encoding;
pub mod error;
pub mod loader;
pub mod payload;
pub mod value;
pub mod wire;

pub use codec::{CodecChain, PayloadCodec, map_payloads};
pub use config::{CodecSource, DataConverterConfig, DataConverterSettings, PayloadCodecSelection};
pub use converter::{
    BinaryPayloadConverter, CompositePayloadConverter, DefaultPayloadConverter,
    JsonPayloadConverter, PayloadConverter, PayloadConverterWithEncoding,
    UndefinedPayloadConverter, from_payloads, to_payloads,
};
pub use data_converter::{LoadedDataConverter, load_data_converter};
pub use encoding::{CodecDescriptor, Encoding, METADATA_ENCODING_KEY, METADATA_ENCRYPTION_KEY_ID};
pub use error::{CodecError, ErrorCategory, PayloadError, codes};
pub use loader::{
    Callable, CodecFn, Export, ExportObject, FromPayloadFn, Member, ModuleExports,
    ModuleRegistry, ModuleResolver, PAYLOAD_CODEC_EXPORT, PAYLOAD_CONVERTER_EXPORT, ToPayloadFn,
    resolve_payload_codec, resolve_payload_converter,
};
pub use payload::Payload;
pub use value::{MAX_JSON_DEPTH, OpaqueValue, Value};
