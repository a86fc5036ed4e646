//! # loader 模块说明
//!
//! ## 角色定位（Why）
//! - 用户以字符串引用声明自定义转换器/编解码器，宿主在启动时一次性解析并校验；
//! - 解析交给 [`ModuleResolver`]，本模块只负责“按名称取导出 → 逐个检查成员能力 → 适配为 trait 对象”。
//!
//! ## 设计要求（What）
//! - 转换器模块必须导出 `payload_converter` 对象，且其 `to_payload`、`from_payload` 成员是对应种类的可调用项；
//! - 编解码器模块必须导出 `payload_codec` 对象，且其 `encode`、`decode` 成员是对应种类的可调用项；
//! - 形状校验逐个检查成员，不依赖任何类型标记；缺哪项能力，错误里就写哪项。

use std::collections::{BTreeMap, HashMap};
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::codec::PayloadCodec;
use crate::converter::PayloadConverter;
use crate::encoding::CodecDescriptor;
use crate::error::{CodecError, PayloadError};
use crate::payload::Payload;
use crate::value::Value;

/// 转换器模块必须提供的导出名。
pub const PAYLOAD_CONVERTER_EXPORT: &str = "payload_converter";
/// 编解码器模块必须提供的导出名。
pub const PAYLOAD_CODEC_EXPORT: &str = "payload_codec";

/// 单值编码函数。
pub type ToPayloadFn = Arc<dyn Fn(&Value) -> Result<Payload, PayloadError> + Send + Sync>;
/// 单负载解码函数。
pub type FromPayloadFn = Arc<dyn Fn(&Payload) -> Result<Value, PayloadError> + Send + Sync>;
/// 批量负载变换函数。
pub type CodecFn = Arc<dyn Fn(Vec<Payload>) -> Result<Vec<Payload>, CodecError> + Send + Sync>;

/// 导出对象上的可调用成员，按签名区分种类。
#[derive(Clone)]
pub enum Callable {
    ToPayload(ToPayloadFn),
    FromPayload(FromPayloadFn),
    EncodePayloads(CodecFn),
    DecodePayloads(CodecFn),
}

impl Callable {
    /// 可调用项的签名种类，用于诊断输出。
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToPayload(_) => "to_payload",
            Self::FromPayload(_) => "from_payload",
            Self::EncodePayloads(_) => "encode_payloads",
            Self::DecodePayloads(_) => "decode_payloads",
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.kind())
    }
}

/// 导出对象的成员：可调用项或普通值。
#[derive(Clone, Debug)]
pub enum Member {
    Callable(Callable),
    Value(Value),
}

/// 具名成员构成的导出对象。
#[derive(Clone, Debug, Default)]
pub struct ExportObject {
    members: BTreeMap<String, Member>,
}

impl ExportObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加或替换成员。
    pub fn with_member(mut self, name: impl Into<String>, member: Member) -> Self {
        self.members.insert(name.into(), member);
        self
    }

    /// 添加可调用成员。
    pub fn with_callable(self, name: impl Into<String>, callable: Callable) -> Self {
        self.with_member(name, Member::Callable(callable))
    }

    /// 添加普通值成员。
    pub fn with_value(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_member(name, Member::Value(value.into()))
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// 以现成的转换器构造 `payload_converter` 形状的导出对象。
    pub fn from_converter(converter: Arc<dyn PayloadConverter>) -> Self {
        let encoder = Arc::clone(&converter);
        Self::new()
            .with_callable(
                "to_payload",
                Callable::ToPayload(Arc::new(move |value: &Value| encoder.to_payload(value))),
            )
            .with_callable(
                "from_payload",
                Callable::FromPayload(Arc::new(move |payload: &Payload| {
                    converter.from_payload(payload)
                })),
            )
    }

    /// 以现成的编解码器构造 `payload_codec` 形状的导出对象，`name` 成员取自其描述符。
    pub fn from_codec(codec: Arc<dyn PayloadCodec>) -> Self {
        let name = codec.descriptor().name().to_owned();
        let encoder = Arc::clone(&codec);
        Self::new()
            .with_value("name", name)
            .with_callable(
                "encode",
                Callable::EncodePayloads(Arc::new(move |payloads: Vec<Payload>| {
                    encoder.encode(payloads)
                })),
            )
            .with_callable(
                "decode",
                Callable::DecodePayloads(Arc::new(move |payloads: Vec<Payload>| {
                    codec.decode(payloads)
                })),
            )
    }
}

/// 模块的一个具名导出。
#[derive(Clone, Debug)]
pub enum Export {
    Object(ExportObject),
    Value(Value),
}

/// 已解析模块的全部具名导出。
#[derive(Clone, Debug, Default)]
pub struct ModuleExports {
    exports: BTreeMap<String, Export>,
}

impl ModuleExports {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加或替换导出。
    pub fn with_export(mut self, name: impl Into<String>, export: Export) -> Self {
        self.exports.insert(name.into(), export);
        self
    }

    /// 仅导出 `payload_converter` 的模块。
    pub fn payload_converter(converter: Arc<dyn PayloadConverter>) -> Self {
        Self::new().with_export(
            PAYLOAD_CONVERTER_EXPORT,
            Export::Object(ExportObject::from_converter(converter)),
        )
    }

    /// 仅导出 `payload_codec` 的模块。
    pub fn payload_codec(codec: Arc<dyn PayloadCodec>) -> Self {
        Self::new().with_export(
            PAYLOAD_CODEC_EXPORT,
            Export::Object(ExportObject::from_codec(codec)),
        )
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.get(name)
    }

    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }
}

/// `ModuleResolver` 将引用字符串映射为模块导出。
///
/// # 契约说明（What）
/// - 返回 `None` 表示无法定位，加载器据此报告 [`PayloadError::ModuleResolution`]；
/// - 空引用在到达解析器之前即被加载器拒绝；
/// - 只在启动期调用，可以阻塞，但不得依赖异步运行时；
/// - 解析结果以 `Arc` 共享，解析器不得在返回后修改其内容。
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Option<Arc<ModuleExports>>;
}

impl<R: ModuleResolver + ?Sized> ModuleResolver for Arc<R> {
    fn resolve(&self, reference: &str) -> Option<Arc<ModuleExports>> {
        (**self).resolve(reference)
    }
}

/// 进程内的模块注册表。
///
/// # 设计背景（Why）
/// - 插件在宿主启动时以引用字符串注册，与配置文件中的路径一一对应；
/// - 注册阶段独占可变，解析阶段只读，因此无需任何锁。
///
/// # 契约说明（What）
/// - 重复注册同一引用返回 [`PayloadError::DuplicateModule`]，不会覆盖已有模块；
/// - 空引用由加载器统一拒绝，注册表本身不做特殊处理。
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<ModuleExports>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册模块。
    pub fn register(
        &mut self,
        reference: impl Into<String>,
        exports: ModuleExports,
    ) -> Result<(), PayloadError> {
        match self.modules.entry(reference.into()) {
            Entry::Occupied(slot) => Err(PayloadError::DuplicateModule {
                reference: slot.key().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(exports));
                Ok(())
            }
        }
    }

    /// 链式注册。
    pub fn with_module(
        mut self,
        reference: impl Into<String>,
        exports: ModuleExports,
    ) -> Result<Self, PayloadError> {
        self.register(reference, exports)?;
        Ok(self)
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.modules.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut references: Vec<_> = self.modules.keys().collect();
        references.sort();
        f.debug_struct("ModuleRegistry")
            .field("modules", &references)
            .finish()
    }
}

impl ModuleResolver for ModuleRegistry {
    fn resolve(&self, reference: &str) -> Option<Arc<ModuleExports>> {
        self.modules.get(reference).cloned()
    }
}

/// 解析并校验转换器模块。
///
/// # 行为逻辑（How）
/// 1. 通过解析器定位模块，失败即 [`PayloadError::ModuleResolution`]；
/// 2. 取出 `payload_converter` 导出，要求它是对象；
/// 3. 分别检查 `to_payload`、`from_payload` 成员的种类，缺失或种类不符即 [`PayloadError::InvalidShape`]。
pub fn resolve_payload_converter(
    resolver: &dyn ModuleResolver,
    reference: &str,
) -> Result<Arc<dyn PayloadConverter>, PayloadError> {
    let exports = resolve_module(resolver, reference)?;
    let object = export_object(&exports, reference, PAYLOAD_CONVERTER_EXPORT)?;

    let to_payload = match object.member("to_payload") {
        Some(Member::Callable(Callable::ToPayload(f))) => Arc::clone(f),
        _ => return Err(missing(reference, PAYLOAD_CONVERTER_EXPORT, "to_payload")),
    };
    let from_payload = match object.member("from_payload") {
        Some(Member::Callable(Callable::FromPayload(f))) => Arc::clone(f),
        _ => return Err(missing(reference, PAYLOAD_CONVERTER_EXPORT, "from_payload")),
    };

    debug!(reference, "payload converter module resolved");
    Ok(Arc::new(ModulePayloadConverter {
        reference: reference.to_owned(),
        to_payload,
        from_payload,
    }))
}

/// 解析并校验编解码器模块。
///
/// 描述符名称优先取导出对象的字符串成员 `name`，否则使用引用本身。
pub fn resolve_payload_codec(
    resolver: &dyn ModuleResolver,
    reference: &str,
) -> Result<Arc<dyn PayloadCodec>, PayloadError> {
    let exports = resolve_module(resolver, reference)?;
    let object = export_object(&exports, reference, PAYLOAD_CODEC_EXPORT)?;

    let encode = match object.member("encode") {
        Some(Member::Callable(Callable::EncodePayloads(f))) => Arc::clone(f),
        _ => return Err(missing(reference, PAYLOAD_CODEC_EXPORT, "encode")),
    };
    let decode = match object.member("decode") {
        Some(Member::Callable(Callable::DecodePayloads(f))) => Arc::clone(f),
        _ => return Err(missing(reference, PAYLOAD_CODEC_EXPORT, "decode")),
    };
    let name = match object.member("name") {
        Some(Member::Value(Value::String(name))) if !name.is_empty() => name.clone(),
        _ => reference.to_owned(),
    };

    debug!(reference, codec = %name, "payload codec module resolved");
    Ok(Arc::new(ModulePayloadCodec {
        descriptor: CodecDescriptor::new(name),
        encode,
        decode,
    }))
}

fn resolve_module(
    resolver: &dyn ModuleResolver,
    reference: &str,
) -> Result<Arc<ModuleExports>, PayloadError> {
    if reference.is_empty() {
        return Err(PayloadError::ModuleResolution {
            reference: String::new(),
        });
    }
    resolver
        .resolve(reference)
        .ok_or_else(|| PayloadError::ModuleResolution {
            reference: reference.to_owned(),
        })
}

fn export_object<'a>(
    exports: &'a ModuleExports,
    reference: &str,
    export: &str,
) -> Result<&'a ExportObject, PayloadError> {
    match exports.export(export) {
        Some(Export::Object(object)) => Ok(object),
        _ => Err(missing(reference, export, export)),
    }
}

fn missing(reference: &str, export: &str, capability: &str) -> PayloadError {
    PayloadError::InvalidShape {
        reference: reference.to_owned(),
        export: export.to_owned(),
        capability: capability.to_owned(),
    }
}

/// 由模块成员拼装的转换器。
struct ModulePayloadConverter {
    reference: String,
    to_payload: ToPayloadFn,
    from_payload: FromPayloadFn,
}

impl fmt::Debug for ModulePayloadConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModulePayloadConverter")
            .field("reference", &self.reference)
            .finish()
    }
}

impl PayloadConverter for ModulePayloadConverter {
    fn to_payload(&self, value: &Value) -> Result<Payload, PayloadError> {
        (self.to_payload)(value)
    }

    fn from_payload(&self, payload: &Payload) -> Result<Value, PayloadError> {
        (self.from_payload)(payload)
    }
}

/// 由模块成员拼装的编解码器。
struct ModulePayloadCodec {
    descriptor: CodecDescriptor,
    encode: CodecFn,
    decode: CodecFn,
}

impl PayloadCodec for ModulePayloadCodec {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        (self.encode)(payloads)
    }

    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        (self.decode)(payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::DefaultPayloadConverter;

    fn registry_with(reference: &str, exports: ModuleExports) -> ModuleRegistry {
        ModuleRegistry::new()
            .with_module(reference, exports)
            .expect("首次注册")
    }

    #[test]
    fn converter_module_roundtrips_through_adapter() {
        let registry = registry_with(
            "acme/json",
            ModuleExports::payload_converter(Arc::new(DefaultPayloadConverter::new())),
        );
        let converter = resolve_payload_converter(&registry, "acme/json").expect("解析");
        let payload = converter.to_payload(&Value::from(7u64)).expect("编码");
        assert_eq!(converter.from_payload(&payload).expect("解码"), Value::from(7u64));
    }

    #[test]
    fn unresolved_reference_names_the_reference() {
        let err = resolve_payload_converter(&ModuleRegistry::new(), "./converters/missing")
            .err()
            .expect("未注册的引用");
        assert!(err.to_string().contains("./converters/missing"));
        assert!(matches!(err, PayloadError::ModuleResolution { .. }));
    }

    #[test]
    fn empty_reference_never_resolves() {
        let registry = registry_with("", ModuleExports::new());
        let err = resolve_payload_codec(&registry, "").err().expect("空引用");
        assert!(matches!(err, PayloadError::ModuleResolution { .. }));
    }

    /// 对任意引用都返回同一模块的解析器。
    struct CatchAllResolver(Arc<ModuleExports>);

    impl ModuleResolver for CatchAllResolver {
        fn resolve(&self, _reference: &str) -> Option<Arc<ModuleExports>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn empty_reference_is_rejected_before_custom_resolver() {
        let resolver = CatchAllResolver(Arc::new(ModuleExports::payload_converter(Arc::new(
            DefaultPayloadConverter::new(),
        ))));
        assert!(resolve_payload_converter(&resolver, "acme/anything").is_ok());
        let err = resolve_payload_converter(&resolver, "").err().expect("空引用");
        assert!(matches!(err, PayloadError::ModuleResolution { .. }));
    }

    #[test]
    fn non_callable_member_is_invalid_shape() {
        let full = ExportObject::from_converter(Arc::new(DefaultPayloadConverter::new()));
        let broken = full.with_value("from_payload", "not a function");
        let registry = registry_with(
            "acme/broken",
            ModuleExports::new().with_export(PAYLOAD_CONVERTER_EXPORT, Export::Object(broken)),
        );
        match resolve_payload_converter(&registry, "acme/broken").err() {
            Some(PayloadError::InvalidShape {
                export, capability, ..
            }) => {
                assert_eq!(export, PAYLOAD_CONVERTER_EXPORT);
                assert_eq!(capability, "from_payload");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrongly_typed_callable_is_invalid_shape() {
        let decode: CodecFn = Arc::new(|payloads: Vec<Payload>| Ok::<_, CodecError>(payloads));
        let object = ExportObject::new()
            .with_callable("encode", Callable::DecodePayloads(Arc::clone(&decode)))
            .with_callable("decode", Callable::DecodePayloads(decode));
        let registry = registry_with(
            "acme/codec",
            ModuleExports::new().with_export(PAYLOAD_CODEC_EXPORT, Export::Object(object)),
        );
        match resolve_payload_codec(&registry, "acme/codec").err() {
            Some(PayloadError::InvalidShape { capability, .. }) => assert_eq!(capability, "encode"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_export_is_invalid_shape() {
        let registry = registry_with(
            "acme/empty",
            ModuleExports::new().with_export("payload_converter", Export::Value(Value::Null)),
        );
        let err = resolve_payload_converter(&registry, "acme/empty")
            .err()
            .expect("导出不是对象");
        assert!(matches!(err, PayloadError::InvalidShape { .. }));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry_with("acme/json", ModuleExports::new());
        let err = registry
            .register("acme/json", ModuleExports::new())
            .expect_err("重复注册");
        assert!(matches!(err, PayloadError::DuplicateModule { .. }));
        assert_eq!(registry.len(), 1);
    }
}
