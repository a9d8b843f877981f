use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Validity window applied to SAS tokens unless overridden.
pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(3600);

pub const SAS_KEY_NAME_ENV: &str = "SABLE_SAS_KEY_NAME";
pub const SAS_KEY_ENV: &str = "SABLE_SAS_KEY";

/// Kind of bearer token, as named on the CBS `put-token` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Sas,
    Jwt,
}

impl TokenType {
    pub fn as_cbs_str(&self) -> &'static str {
        match self {
            TokenType::Sas => "servicebus.windows.net:sastoken",
            TokenType::Jwt => "jwt",
        }
    }
}

/// A signed token for one audience.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    /// Expiry as seconds since the Unix epoch.
    pub expiry: u64,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("value", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Produces tokens on demand for a given audience.
///
/// Implementations are shared across connections and entities, so they must be
/// safe to call concurrently.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, audience: &str) -> AuthResult<Token>;
}

/// Shared-access-signature provider backed by a named symmetric key.
///
/// ```
/// use sable_auth::SasTokenProvider;
/// use std::time::Duration;
///
/// let provider = SasTokenProvider::new("send", "c2VjcmV0")
///     .expect("provider")
///     .with_validity(Duration::from_secs(600));
/// assert_eq!(provider.key_name(), "send");
/// ```
#[derive(Clone)]
pub struct SasTokenProvider {
    key_name: String,
    key: String,
    validity: Duration,
}

impl SasTokenProvider {
    pub fn new(key_name: impl Into<String>, key: impl Into<String>) -> AuthResult<Self> {
        let key_name = key_name.into();
        let key = key.into();
        if key_name.is_empty() {
            return Err(AuthError::EmptyKeyName);
        }
        if key.is_empty() {
            return Err(AuthError::EmptyKey);
        }
        Ok(Self {
            key_name,
            key,
            validity: DEFAULT_TOKEN_VALIDITY,
        })
    }

    /// Build a provider from `SABLE_SAS_KEY_NAME` and `SABLE_SAS_KEY`.
    pub fn from_env() -> AuthResult<Self> {
        let key_name =
            std::env::var(SAS_KEY_NAME_ENV).map_err(|_| AuthError::MissingEnv(SAS_KEY_NAME_ENV))?;
        let key = std::env::var(SAS_KEY_ENV).map_err(|_| AuthError::MissingEnv(SAS_KEY_ENV))?;
        Self::new(key_name, key)
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Sign `audience` with an absolute expiry in epoch seconds.
    pub fn sign(&self, audience: &str, expiry: u64) -> AuthResult<String> {
        let resource = urlencoding::encode(audience).to_lowercase();
        let string_to_sign = format!("{resource}\n{expiry}");
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|err| AuthError::Signing(err.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!(
            "SharedAccessSignature sr={resource}&sig={}&se={expiry}&skn={}",
            urlencoding::encode(&signature),
            self.key_name
        ))
    }
}

impl std::fmt::Debug for SasTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasTokenProvider")
            .field("key_name", &self.key_name)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for SasTokenProvider {
    async fn get_token(&self, audience: &str) -> AuthResult<Token> {
        let expiry = now_epoch_seconds() + self.validity.as_secs();
        let value = self.sign(audience, expiry)?;
        tracing::debug!(audience, expiry, "minted sas token");
        Ok(Token {
            token_type: TokenType::Sas,
            value,
            expiry,
        })
    }
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
