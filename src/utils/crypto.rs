// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("加密密钥未配置")]
    MissingKey,
    #[error("密文格式错误")]
    Malformed,
    #[error("解密失败")]
    DecryptFailed,
    #[error("加密失败")]
    EncryptFailed,
}

/// LLM API Key 加解密
///
/// AES-256-GCM，密钥为配置口令的 SHA-256；密文格式为 base64(nonce || ciphertext)。
#[derive(Clone)]
pub struct ApiKeyCipher {
    cipher: Aes256Gcm,
}

impl ApiKeyCipher {
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::MissingKey);
        }
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::MissingKey)?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::Malformed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptFailed)
    }
}

/// 脱敏显示：保留前后各 4 位
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = ApiKeyCipher::new("process-secret").unwrap();
        let sealed = cipher.encrypt("sk-test-1234567890").unwrap();
        assert_ne!(sealed, "sk-test-1234567890");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "sk-test-1234567890");
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sealed = ApiKeyCipher::new("a").unwrap().encrypt("secret").unwrap();
        let other = ApiKeyCipher::new("b").unwrap();
        assert_eq!(other.decrypt(&sealed), Err(CryptoError::DecryptFailed));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(ApiKeyCipher::new(""), Err(CryptoError::MissingKey)));
    }

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-abcdefghijkl"), "sk-a****ijkl");
        assert_eq!(mask_api_key("short"), "****");
    }
}
