#![deny(unsafe_code)]
#![doc = "spark-payload-codecs: 可插入 `spark-payload` 编解码管线的压缩与加密实现。"]
#![doc = ""]
#![doc = "两者都把原负载整体帧化后再变换，原有元数据（含 `encoding` 标签）在解码后逐字节还原。"]
#![doc = "推荐顺序为先压缩再加密：`[GzipCodec, AeadCodec]`，解码时自动逆序执行。"]
#![doc = ""]
#![doc = "- `gzip` 特性：[`GzipCodec`]，基于 `flate2`；"]
#![doc = "- `aead` 特性：[`AeadCodec`]，基于 `ring` 的 AES-256-GCM。"]

#[cfg(feature = "aead")]
mod aead;
#[cfg(feature = "gzip")]
mod gzip;

#[cfg(feature = "aead")]
pub use aead::{AeadCodec, KEY_LEN};
#[cfg(feature = "gzip")]
pub use gzip::{DEFAULT_MAX_DECODED_SIZE, GzipCodec};
