//! 时间窗口 XOR 混淆直链还原。
//!
//! 站点侧把真实 CDN 直链用 `SECRET_KEY_<floor(ts/3600)>` 循环 XOR
//! 后 base64 编码下发，密钥每小时轮换一次。这里只做纯解码：
//! 时间戳由信封显式携带，不读墙钟，保证可确定性测试。
//! 调用方每次运行都要重新抓取信封，不能跨运行缓存。

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use thiserror::Error;

const KEY_PREFIX: &str = "SECRET_KEY_";

/// 加密端点下发的信封：base64 载荷 + 秒级时间戳。
/// 用完即弃，从不持久化。
#[derive(Debug, Clone, Deserialize)]
pub struct ObfuscationEnvelope {
    pub url: String,
    pub timestamp: i64,
}

#[derive(Debug, Error)]
pub enum ObfuscationError {
    #[error("encrypted envelope has an empty payload")]
    EmptyPayload,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decrypted url is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// 还原直链。对同一密钥 XOR 是自逆的，所以加解密共用一条路径。
pub fn decrypt_url(envelope: &ObfuscationEnvelope) -> Result<String, ObfuscationError> {
    let payload = envelope.url.trim();
    if payload.is_empty() {
        return Err(ObfuscationError::EmptyPayload);
    }

    let key = time_window_key(envelope.timestamp);
    let mut bytes = BASE64.decode(payload)?;
    xor_with_key(&mut bytes, key.as_bytes());
    Ok(String::from_utf8(bytes)?)
}

fn time_window_key(timestamp: i64) -> String {
    format!("{}{}", KEY_PREFIX, timestamp.div_euclid(3600))
}

fn xor_with_key(data: &mut [u8], key: &[u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % key.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt(plain: &str, timestamp: i64) -> String {
        let key = time_window_key(timestamp);
        let mut bytes = plain.as_bytes().to_vec();
        xor_with_key(&mut bytes, key.as_bytes());
        BASE64.encode(bytes)
    }

    #[test]
    fn known_vector_round_trips() {
        // timestamp = 3600*5 → 密钥 SECRET_KEY_5
        let envelope = ObfuscationEnvelope {
            url: encrypt("http://x/a.mp4", 3600 * 5),
            timestamp: 3600 * 5,
        };
        assert_eq!(decrypt_url(&envelope).unwrap(), "http://x/a.mp4");
    }

    #[test]
    fn xor_is_self_inverse_across_windows() {
        for (plain, ts) in [
            ("https://media-files.bunkr.ru/v/clip.mp4", 0),
            ("https://cdn4.bunkr.ru/photo.jpg", 3600 * 123 + 59),
            ("short", 3600 * 999_999),
        ] {
            let envelope = ObfuscationEnvelope {
                url: encrypt(plain, ts),
                timestamp: ts,
            };
            assert_eq!(decrypt_url(&envelope).unwrap(), plain);
        }
    }

    #[test]
    fn wrong_window_does_not_round_trip() {
        let envelope = ObfuscationEnvelope {
            url: encrypt("http://x/a.mp4", 3600 * 5),
            timestamp: 3600 * 6,
        };
        assert_ne!(decrypt_url(&envelope).ok(), Some("http://x/a.mp4".into()));
    }

    #[test]
    fn malformed_base64_is_an_error() {
        let envelope = ObfuscationEnvelope {
            url: "not//base64!!".into(),
            timestamp: 0,
        };
        assert!(matches!(
            decrypt_url(&envelope),
            Err(ObfuscationError::Base64(_))
        ));
    }

    #[test]
    fn empty_payload_is_an_error() {
        let envelope = ObfuscationEnvelope {
            url: "  ".into(),
            timestamp: 0,
        };
        assert!(matches!(
            decrypt_url(&envelope),
            Err(ObfuscationError::EmptyPayload)
        ));
    }
}
