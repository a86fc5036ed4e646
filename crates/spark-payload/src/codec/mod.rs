//! 负载编解码契约与有序管线。
//!
//! 编解码器作用在转换器产出的负载之上（压缩、加密等），与值类型无关。

mod chain;

use std::sync::Arc;

use crate::encoding::CodecDescriptor;
use crate::error::CodecError;
use crate::payload::Payload;

pub use chain::CodecChain;

/// `PayloadCodec` 是一对对称的字节级变换。
///
/// # 设计初衷（Why）
/// - 压缩与加密不关心值的形状，只改写负载；抽象为批量接口以覆盖多参数调用；
/// - 对象安全，使管线可以持有 `Arc<dyn PayloadCodec>` 列表并在运行时组合。
///
/// # 契约说明（What）
/// - 对同一实例与配置，`decode(encode(ps)) == ps` 必须成立；
/// - 输出负载数量须与输入一致；
/// - 密钥与参数在构造时固定，方法只接收 `&self`，不得保留调用级可变状态；
/// - 接口同步：需要异步获取的资源（如远端密钥）必须在构造前准备好。
pub trait PayloadCodec: Send + Sync + 'static {
    /// 返回编解码器描述符。
    fn descriptor(&self) -> &CodecDescriptor;

    /// 正向变换。
    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError>;

    /// 逆向变换。
    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError>;
}

impl<T: PayloadCodec + ?Sized> PayloadCodec for Arc<T> {
    fn descriptor(&self) -> &CodecDescriptor {
        (**self).descriptor()
    }

    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        (**self).encode(payloads)
    }

    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        (**self).decode(payloads)
    }
}

/// 逐个负载变换的辅助函数：任一负载失败即整体失败。
///
/// 多数编解码器对每个负载独立处理，可在 `encode`/`decode` 中直接复用。
pub fn map_payloads<F>(payloads: Vec<Payload>, f: F) -> Result<Vec<Payload>, CodecError>
where
    F: Fn(Payload) -> Result<Payload, CodecError>,
{
    payloads.into_iter().map(f).collect()
}
