//! Signed session cookie
//!
//! The cookie value is `{token}.{signature}`, where the signature is the
//! unpadded base64url HMAC-SHA256 of the token under the session secret.
//! Unsigned or tampered cookies read as no cookie at all.

use anyhow::{Context, Result};
use axum::http::{header, HeaderMap, HeaderValue};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer keyed by the session secret
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let mac = <HmacSha256 as Mac>::new_from_slice(secret.as_ref())
            .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;
        Ok(Self { mac })
    }

    /// `token.signature`
    pub fn sign(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        let signature = BASE64URL_NOPAD.encode(&mac.finalize().into_bytes());
        format!("{}.{}", token, signature)
    }

    /// Token inside a signed value, if the signature checks out
    pub fn verify<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (token, signature) = value.rsplit_once('.')?;
        if token.is_empty() {
            return None;
        }
        let signature = BASE64URL_NOPAD.decode(signature.as_bytes()).ok()?;

        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(token)
    }
}

/// Reads and writes the session cookie
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    signer: CookieSigner,
    max_age_secs: i64,
    secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, signer: CookieSigner, max_age_secs: i64, secure: bool) -> Self {
        Self {
            name: name.into(),
            signer,
            max_age_secs,
            secure,
        }
    }

    /// Verified session token from the request's `Cookie` headers
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == self.name)
            .find_map(|(_, value)| self.signer.verify(value.trim_matches('"')))
            .map(str::to_string)
    }

    /// `Set-Cookie` value carrying `token`
    pub fn issue(&self, token: &str) -> Result<HeaderValue> {
        self.render(&self.signer.sign(token), self.max_age_secs)
    }

    /// `Set-Cookie` value that removes the cookie
    pub fn clear(&self) -> Result<HeaderValue> {
        self.render("", 0)
    }

    fn render(&self, value: &str, max_age: i64) -> Result<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).context("Session cookie is not a valid header value")
    }
}
