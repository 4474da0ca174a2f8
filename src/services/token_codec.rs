//! Stateless signed session tokens.
//!
//! Token = base64url(json `{exp, iat, data}`) + "." + hex(HMAC-SHA256(key, json)).
//! `exp` is unix seconds, `iat` unix milliseconds. Nothing is stored server-side;
//! a token is valid while its signature matches and `exp` has not passed.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SecurityConfig;
use crate::config::defaults::{MIN_SECRET_KEY_LEN, SECRET_KEY_ENV};
use crate::errors::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

const GENERATED_KEY_LEN: usize = 32;

/// URL-safe alphabet, unpadded on encode, padding optional on decode.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Serialize)]
struct Envelope<'a, T> {
    exp: i64,
    iat: i64,
    data: &'a T,
}

#[derive(Deserialize)]
struct OpenedEnvelope<T> {
    exp: i64,
    #[allow(dead_code)]
    iat: i64,
    data: T,
}

/// Issues and verifies tokens under one process-wide key.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from raw key bytes.
    pub fn new(key: &[u8]) -> AppResult<Self> {
        if key.len() < MIN_SECRET_KEY_LEN {
            return Err(AppError::configuration(format!(
                "secret key must be at least {MIN_SECRET_KEY_LEN} bytes"
            )));
        }

        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| AppError::configuration(format!("invalid secret key: {e}")))?;
        Ok(Self { mac })
    }

    /// Build a codec from `security.secret_key`, then the
    /// `CONVERT_GATEWAY_SECRET` environment variable, then a random key.
    pub fn from_config(security: &SecurityConfig) -> AppResult<Self> {
        Self::from_sources(
            security.secret_key.as_deref(),
            std::env::var(SECRET_KEY_ENV).ok(),
        )
    }

    fn from_sources(configured: Option<&str>, environment: Option<String>) -> AppResult<Self> {
        if let Some(key) = configured {
            debug!("Using token signing key from configuration");
            return Self::new(key.as_bytes());
        }

        if let Some(key) = environment.filter(|key| !key.is_empty()) {
            debug!("Using token signing key from {}", SECRET_KEY_ENV);
            return Self::new(key.as_bytes());
        }

        warn!(
            "No secret key configured (security.secret_key or {}); generated a random key, \
             outstanding tokens will not survive a restart",
            SECRET_KEY_ENV
        );
        let key: [u8; GENERATED_KEY_LEN] = rand::random();
        Self::new(&key)
    }

    /// Sign `data` so it stays valid for `ttl` from now.
    pub fn issue<T: Serialize>(&self, data: &T, ttl: Duration) -> AppResult<String> {
        self.issue_at(data, ttl, Utc::now())
    }

    pub fn issue_at<T: Serialize>(
        &self,
        data: &T,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            exp: now.timestamp().saturating_add(ttl_secs),
            iat: now.timestamp_millis(),
            data,
        };

        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| AppError::internal(format!("token payload serialization failed: {e}")))?;
        let signature = self.mac.clone().chain_update(&payload).finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            TOKEN_ENGINE.encode(&payload),
            hex::encode(signature)
        ))
    }

    /// Verify `token` and return its data, or `None` if it is forged, expired
    /// or malformed.
    pub fn resolve<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        self.resolve_at(token, Utc::now())
    }

    pub fn resolve_at<T: DeserializeOwned>(&self, token: &str, now: DateTime<Utc>) -> Option<T> {
        let (encoded, signature) = token.rsplit_once('.')?;
        let payload = TOKEN_ENGINE.decode(encoded).ok()?;
        let signature = hex::decode(signature).ok()?;

        if self
            .mac
            .clone()
            .chain_update(&payload)
            .verify_slice(&signature)
            .is_err()
        {
            debug!("Rejected token with invalid signature");
            return None;
        }

        let envelope: OpenedEnvelope<T> = match serde_json::from_slice(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Rejected token with unexpected payload: {}", e);
                return None;
            }
        };

        if envelope.exp < now.timestamp() {
            debug!("Rejected expired token");
            return None;
        }

        Some(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownloadDescriptor, UploadSession};
    use std::path::PathBuf;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const TTL: Duration = Duration::from_secs(30 * 60);

    fn codec() -> TokenCodec {
        TokenCodec::new(KEY).unwrap()
    }

    fn session() -> UploadSession {
        UploadSession {
            files: vec![PathBuf::from("/srv/uploads/abc.docx")],
            original_names: vec!["report.docx".to_string()],
        }
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let token = codec.issue(&session(), TTL).unwrap();
        let decoded: UploadSession = codec.resolve(&token).unwrap();
        assert_eq!(decoded, session());
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = codec().issue(&session(), TTL).unwrap();
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
        assert!(!token.contains('='));
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let codec = codec();
        let token = codec.issue(&session(), TTL).unwrap();
        let (payload, signature) = token.rsplit_once('.').unwrap();
        let padding = "=".repeat((4 - payload.len() % 4) % 4);
        let padded = format!("{payload}{padding}.{signature}");
        assert!(codec.resolve::<UploadSession>(&padded).is_some());
    }

    #[test]
    fn test_zero_ttl_expires_once_clock_moves() {
        let codec = codec();
        let now = Utc::now();
        let token = codec.issue_at(&session(), Duration::ZERO, now).unwrap();

        assert!(codec.resolve_at::<UploadSession>(&token, now).is_some());
        let later = now + chrono::Duration::seconds(1);
        assert!(codec.resolve_at::<UploadSession>(&token, later).is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let now = Utc::now();
        let token = codec.issue_at(&session(), TTL, now).unwrap();

        let at_expiry = now + chrono::Duration::seconds(30 * 60);
        assert!(codec.resolve_at::<UploadSession>(&token, at_expiry).is_some());
        let past_expiry = at_expiry + chrono::Duration::seconds(1);
        assert!(codec.resolve_at::<UploadSession>(&token, past_expiry).is_none());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let codec = codec();
        let token = codec.issue(&session(), TTL).unwrap();
        let (_, signature) = token.rsplit_once('.').unwrap();

        let forged = UploadSession {
            files: vec![PathBuf::from("/etc/passwd")],
            original_names: vec!["passwd.txt".to_string()],
        };
        let forged_payload = serde_json::to_vec(&Envelope {
            exp: Utc::now().timestamp() + 3600,
            iat: 0,
            data: &forged,
        })
        .unwrap();
        let forged_token = format!("{}.{}", TOKEN_ENGINE.encode(forged_payload), signature);

        assert!(codec.resolve::<UploadSession>(&forged_token).is_none());
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let codec = codec();
        let token = codec.issue(&session(), TTL).unwrap();
        let (payload, signature) = token.rsplit_once('.').unwrap();

        let mut flipped = signature.to_string().into_bytes();
        flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
        let tampered = format!("{payload}.{}", String::from_utf8(flipped).unwrap());

        assert!(codec.resolve::<UploadSession>(&tampered).is_none());
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let token = codec().issue(&session(), TTL).unwrap();
        let other = TokenCodec::new(b"another-secret-key-entirely!").unwrap();
        assert!(other.resolve::<UploadSession>(&token).is_none());
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let codec = codec();
        for token in ["", ".", "no-dot-here", "!!!.abcd", "e30.zz", "e30.", ".00"] {
            assert!(
                codec.resolve::<UploadSession>(token).is_none(),
                "accepted {token:?}"
            );
        }
    }

    #[test]
    fn test_payload_of_other_shape_is_rejected() {
        let codec = codec();
        let download = DownloadDescriptor {
            file: PathBuf::from("/srv/converted/x_report.pdf"),
            name: "report.pdf".to_string(),
        };
        let token = codec.issue(&download, TTL).unwrap();
        assert!(codec.resolve::<UploadSession>(&token).is_none());
        assert_eq!(codec.resolve::<DownloadDescriptor>(&token), Some(download));
    }

    #[test]
    fn test_equal_payloads_differ_by_issue_time() {
        let codec = codec();
        let now = Utc::now();
        let first = codec.issue_at(&session(), TTL, now).unwrap();
        let second = codec
            .issue_at(&session(), TTL, now + chrono::Duration::milliseconds(1))
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_key_sources() {
        assert!(TokenCodec::from_sources(Some("short"), None).is_err());

        let configured = TokenCodec::from_sources(Some("configured-secret-key"), None).unwrap();
        let from_env =
            TokenCodec::from_sources(None, Some("configured-secret-key".to_string())).unwrap();
        let token = configured.issue(&session(), TTL).unwrap();
        assert!(from_env.resolve::<UploadSession>(&token).is_some());

        let generated = TokenCodec::from_sources(None, None).unwrap();
        assert!(generated.resolve::<UploadSession>(&token).is_none());
    }
}
