//! Identity tokens and password handling.
//!
//! Tokens are HS256 JWTs carrying the user id and username, valid for
//! [`crate::DEFAULT_TOKEN_TTL_SECS`] by default. Passwords arrive from
//! clients wrapped in a symmetric transport envelope (ChaCha20-Poly1305,
//! base64 of nonce || ciphertext) and are stored as bcrypt hashes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::AuthConfig;

/// Authentication error type.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    Expired,

    #[error("password decryption failed")]
    DecryptionFailed,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Claims embedded in an identity token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    /// Username at issue time.
    pub username: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Issues and verifies identity tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl TokenService {
    /// Build a token service from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.token_secret.as_bytes()),
            ttl_secs: config.token_ttl_secs,
        }
    }

    /// Issue a token for a user.
    pub fn issue(&self, user_id: Uuid, username: &str) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            iat: now,
            exp: now + self.ttl_secs as i64,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Verify a token and return its claims.
    ///
    /// Expired tokens are a distinct error so the HTTP layer can tell
    /// the client to re-authenticate rather than reject outright.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

/// Decrypts password transport envelopes and manages stored hashes.
#[derive(Clone)]
pub struct PasswordCipher {
    key: [u8; 32],
}

impl PasswordCipher {
    /// Build a cipher from auth configuration.
    ///
    /// When `transport_key` is set it must decode to exactly 32 bytes;
    /// otherwise the key is derived from the token secret.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let key = match &config.transport_key {
            Some(encoded) => {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|_| AuthError::DecryptionFailed)?;
                bytes
                    .try_into()
                    .map_err(|_| AuthError::DecryptionFailed)?
            }
            None => derive_key(config.token_secret.as_bytes()),
        };
        Ok(Self { key })
    }

    /// Decrypt a transport envelope into the plaintext password.
    ///
    /// Envelope format: base64 of 12-byte nonce followed by ciphertext.
    pub fn decrypt(&self, envelope: &str) -> Result<String, AuthError> {
        let bytes = BASE64
            .decode(envelope)
            .map_err(|_| AuthError::DecryptionFailed)?;
        if bytes.len() <= 12 {
            return Err(AuthError::DecryptionFailed);
        }
        let (nonce, ciphertext) = bytes.split_at(12);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AuthError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| AuthError::DecryptionFailed)
    }

    /// Encrypt a plaintext password into a transport envelope.
    ///
    /// The server only decrypts; this is the client-side half, kept here
    /// so tests and tooling can produce valid envelopes.
    pub fn encrypt(&self, password: &str) -> Result<String, AuthError> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), password.as_bytes())
            .map_err(|_| AuthError::DecryptionFailed)?;
        let mut envelope = nonce_bytes.to_vec();
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    /// Hash a password for storage.
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Check a password against a stored hash.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        bcrypt::verify(password, hash).map_err(|e| AuthError::Hashing(e.to_string()))
    }
}

// Key schedule when no explicit transport key is configured: cycle the
// token secret over 32 bytes. Not a KDF; set transport_key in production.
fn derive_key(secret: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    for (i, slot) in key.iter_mut().enumerate() {
        *slot = secret[i % secret.len()];
    }
    key
}
