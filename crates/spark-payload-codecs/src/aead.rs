use std::collections::BTreeMap;
use std::fmt;

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use spark_payload::{
    CodecDescriptor, CodecError, Encoding, METADATA_ENCRYPTION_KEY_ID, Payload, PayloadCodec,
    map_payloads, wire,
};
use tracing::{debug, warn};

/// AES-256-GCM 密钥长度。
pub const KEY_LEN: usize = 32;

const TAG_LEN: usize = 16;

/// `AeadCodec` 以 AES-256-GCM 加密整条负载，产出 `binary/encrypted` 负载。
///
/// # 设计背景（Why）
/// - 工作流参数经由编排服务持久化，敏感数据必须在客户端加密，服务端只见密文；
/// - 密钥轮换期间，旧密文仍需可读，因此允许登记只用于解密的历史密钥。
///
/// # 行为逻辑（How）
/// 1. `encode`：帧化原负载，以当前密钥和随机 96 位 nonce 加密，输出 `nonce || 密文 || tag`，
///    并在元数据中写入 `encryption-key-id`；密钥标识同时作为附加认证数据；
/// 2. `decode`：只处理 `binary/encrypted` 负载，按 `encryption-key-id` 选择密钥，认证解密后解帧还原。
///
/// # 契约说明（What）
/// - 密钥在构造时固定，调用期间不获取任何外部资源；
/// - 未登记的密钥标识、密文过短或认证失败均返回 [`CodecError`]；
/// - 默认情况下非加密负载原样透传并记录 `warn` 事件；
/// - 开启 [`AeadCodec::with_require_encrypted`] 后，非加密负载直接解码失败。
///
/// # 风险提示（Trade-offs）
/// - 随机 nonce 在单密钥加密约 2^32 条消息后碰撞概率不可忽略，需要在此之前轮换密钥。
pub struct AeadCodec {
    descriptor: CodecDescriptor,
    key_id: String,
    keys: BTreeMap<String, LessSafeKey>,
    require_encrypted: bool,
    rng: SystemRandom,
}

impl AeadCodec {
    /// 以当前密钥构造编解码器；密钥必须为 32 字节。
    pub fn new(key_id: impl Into<String>, key: &[u8]) -> Result<Self, CodecError> {
        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(CodecError::new("encryption key id must not be empty"));
        }
        let mut keys = BTreeMap::new();
        keys.insert(key_id.clone(), unbound(&key_id, key)?);
        Ok(Self {
            descriptor: CodecDescriptor::new("aes-256-gcm")
                .with_output_encoding(Encoding::BINARY_ENCRYPTED),
            key_id,
            keys,
            require_encrypted: false,
            rng: SystemRandom::new(),
        })
    }

    /// 登记只用于解密的历史密钥。
    pub fn with_decryption_key(
        mut self,
        key_id: impl Into<String>,
        key: &[u8],
    ) -> Result<Self, CodecError> {
        let key_id = key_id.into();
        if key_id == self.key_id {
            return Err(CodecError::new(format!(
                "key id `{key_id}` is already the active encryption key"
            )));
        }
        let key = unbound(&key_id, key)?;
        self.keys.insert(key_id, key);
        Ok(self)
    }

    /// 要求解码时每条负载都是密文；明文负载返回错误而非透传。
    pub fn with_require_encrypted(mut self, require: bool) -> Self {
        self.require_encrypted = require;
        self
    }

    /// 当前用于加密的密钥标识。
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn seal(&self, payload: Payload) -> Result<Payload, CodecError> {
        let key = self
            .keys
            .get(&self.key_id)
            .ok_or_else(|| CodecError::new("active encryption key is not registered"))?;

        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| CodecError::new("system random source unavailable"))?;

        let mut sealed = wire::encode_payload(&payload)?.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(self.key_id.as_bytes()),
            &mut sealed,
        )
        .map_err(|_| CodecError::new("AES-256-GCM encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);

        Ok(Payload::new(&Encoding::BINARY_ENCRYPTED, out)
            .with_metadata(METADATA_ENCRYPTION_KEY_ID, self.key_id.clone()))
    }

    fn open(&self, payload: Payload) -> Result<Payload, CodecError> {
        if !payload.has_encoding(&Encoding::BINARY_ENCRYPTED) {
            let encoding = payload.encoding().unwrap_or("<missing>");
            if self.require_encrypted {
                return Err(CodecError::new(format!(
                    "payload with encoding `{encoding}` is not encrypted"
                )));
            }
            warn!(
                encoding,
                key_id = %self.key_id,
                "unencrypted payload passed through AEAD codec"
            );
            return Ok(payload);
        }

        let key_id = payload
            .metadata_value(METADATA_ENCRYPTION_KEY_ID)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .ok_or_else(|| CodecError::new("encrypted payload carries no key id"))?;
        let key = self
            .keys
            .get(key_id)
            .ok_or_else(|| CodecError::new(format!("unknown encryption key id `{key_id}`")))?;

        if payload.data.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::new(format!(
                "ciphertext of {} bytes is too short",
                payload.data.len()
            )));
        }
        let (nonce, sealed) = payload.data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| CodecError::new("malformed nonce"))?;
        let mut buf = sealed.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::from(key_id.as_bytes()), &mut buf)
            .map_err(|_| {
                CodecError::new(format!("authentication failed for key id `{key_id}`"))
            })?;
        debug!(key_id, "payload decrypted");
        Ok(wire::decode_payload(plaintext)?)
    }
}

fn unbound(key_id: &str, key: &[u8]) -> Result<LessSafeKey, CodecError> {
    if key.len() != KEY_LEN {
        return Err(CodecError::new(format!(
            "key `{key_id}` must be {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| CodecError::new(format!("key `{key_id}` rejected by AES-256-GCM")))
}

impl fmt::Debug for AeadCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadCodec")
            .field("key_id", &self.key_id)
            .field("known_key_ids", &self.keys.keys().collect::<Vec<_>>())
            .field("require_encrypted", &self.require_encrypted)
            .finish_non_exhaustive()
    }
}

impl PayloadCodec for AeadCodec {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_payloads(payloads, |payload| self.seal(payload))
    }

    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_payloads(payloads, |payload| self.open(payload))
    }
}
