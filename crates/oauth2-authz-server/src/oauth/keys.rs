//! Signing key management.
//!
//! The [`KeyManager`] publishes an immutable [`KeySet`] behind an `Arc`. Signing
//! and verification take a snapshot of the current set and never hold the lock
//! while doing crypto; rotation builds a new set and swaps it in, so tokens
//! signed by a staged or retiring key keep verifying while issuance continues.
//!
//! Private key material stays inside [`SigningKey`]; only the public JWK leaves.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// RSA modulus size for generated keys.
const RSA_KEY_BITS: usize = 2048;

/// JWS algorithm used for all signatures.
const ALGORITHM: Algorithm = Algorithm::RS256;

/// Public key descriptor published in the JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

/// JSON Web Key Set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// An RSA signing key with its derived JWT keys.
pub struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwk: Jwk,
}

impl SigningKey {
    /// Generate a fresh 2048-bit RSA key.
    pub fn generate(kid: impl Into<String>) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)?;
        Self::from_rsa(kid, &private)
    }

    /// Load a key from PEM text (PKCS#8 `PRIVATE KEY` or PKCS#1 `RSA PRIVATE KEY`).
    pub fn from_pem(kid: impl Into<String>, pem: &str) -> Result<Self, KeyError> {
        let private = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(_) => RsaPrivateKey::from_pkcs1_pem(pem)?,
        };
        Self::from_rsa(kid, &private)
    }

    /// Load a key from a PEM file.
    pub fn from_pem_file(kid: impl Into<String>, path: &Path) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path)
            .map_err(|source| KeyError::Io { path: path.display().to_string(), source })?;
        Self::from_pem(kid, &pem)
    }

    fn from_rsa(kid: impl Into<String>, private: &RsaPrivateKey) -> Result<Self, KeyError> {
        let kid = kid.into();
        let der = private.to_pkcs1_der()?;
        let encoding = EncodingKey::from_rsa_der(der.as_bytes());

        let n = URL_SAFE_NO_PAD.encode(private.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(private.e().to_bytes_be());
        let decoding = DecodingKey::from_rsa_components(&n, &e)?;

        let jwk = Jwk {
            kty: "RSA".into(),
            kid: kid.clone(),
            use_: "sig".into(),
            alg: "RS256".into(),
            n,
            e,
        };
        Ok(Self { kid, encoding, decoding, jwk })
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn public_jwk(&self) -> &Jwk {
        &self.jwk
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}

/// An immutable snapshot of the keys accepted for verification.
#[derive(Debug)]
pub struct KeySet {
    current: String,
    keys: Vec<Arc<SigningKey>>,
}

impl KeySet {
    fn get(&self, kid: &str) -> Option<&Arc<SigningKey>> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    fn current(&self) -> &Arc<SigningKey> {
        // `current` always names a member; enforced by every KeyManager mutation.
        self.get(&self.current).unwrap_or(&self.keys[0])
    }

    #[must_use]
    pub fn kids(&self) -> Vec<&str> {
        self.keys.iter().map(|key| key.kid.as_str()).collect()
    }
}

/// Holds the active signing key set.
#[derive(Debug)]
pub struct KeyManager {
    active: RwLock<Arc<KeySet>>,
}

impl KeyManager {
    /// Create a manager whose only key is also the current signing key.
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        let set = KeySet { current: key.kid.clone(), keys: vec![Arc::new(key)] };
        Self { active: RwLock::new(Arc::new(set)) }
    }

    /// Create a manager with a freshly generated key.
    pub fn generate(kid: impl Into<String>) -> Result<Self, KeyError> {
        Ok(Self::new(SigningKey::generate(kid)?))
    }

    /// Snapshot of the published key set.
    #[must_use]
    pub fn snapshot(&self) -> Arc<KeySet> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(
        &self,
        update: impl FnOnce(&KeySet) -> Result<KeySet, KeyError>,
    ) -> Result<(), KeyError> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let next = update(&active)?;
        *active = Arc::new(next);
        Ok(())
    }

    #[must_use]
    pub fn current_kid(&self) -> String {
        self.snapshot().current.clone()
    }

    /// Sign claims with the current key.
    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, KeyError> {
        let set = self.snapshot();
        let key = set.current();
        let mut header = Header::new(ALGORITHM);
        header.kid = Some(key.kid.clone());
        header.typ = Some("at+jwt".into());
        Ok(jsonwebtoken::encode(&header, claims, &key.encoding)?)
    }

    /// Verify signature and expiry against any key in the active set.
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, KeyError> {
        self.decode(token, true)
    }

    /// Verify the signature only; expired tokens still decode.
    pub fn verify_ignoring_expiry<C: DeserializeOwned>(&self, token: &str) -> Result<C, KeyError> {
        self.decode(token, false)
    }

    fn decode<C: DeserializeOwned>(&self, token: &str, validate_exp: bool) -> Result<C, KeyError> {
        let header = jsonwebtoken::decode_header(token)?;
        let kid = header.kid.unwrap_or_default();
        let set = self.snapshot();
        let key = set.get(&kid).ok_or(KeyError::UnknownKey(kid))?;

        let mut validation = Validation::new(ALGORITHM);
        validation.validate_aud = false;
        validation.validate_exp = validate_exp;
        validation.leeway = 0;
        if !validate_exp {
            validation.required_spec_claims.remove("exp");
        }
        Ok(jsonwebtoken::decode::<C>(token, &key.decoding, &validation)?.claims)
    }

    /// Public keys of the active set, current key first.
    #[must_use]
    pub fn export_public_jwks(&self) -> Jwks {
        let set = self.snapshot();
        let mut keys = vec![set.current().jwk.clone()];
        keys.extend(
            set.keys.iter().filter(|key| key.kid != set.current).map(|key| key.jwk.clone()),
        );
        Jwks { keys }
    }

    /// Add a key for verification and publication without signing with it yet.
    pub fn stage(&self, key: SigningKey) -> Result<(), KeyError> {
        let kid = key.kid.clone();
        let key = Arc::new(key);
        self.publish(|set| {
            if set.get(&key.kid).is_some() {
                return Err(KeyError::DuplicateKey(key.kid.clone()));
            }
            let mut keys = set.keys.clone();
            keys.push(Arc::clone(&key));
            Ok(KeySet { current: set.current.clone(), keys })
        })?;
        tracing::info!(kid = %kid, "Staged signing key");
        Ok(())
    }

    /// Make a staged key the signing key. The previous key keeps verifying.
    pub fn promote(&self, kid: &str) -> Result<(), KeyError> {
        self.publish(|set| {
            if set.get(kid).is_none() {
                return Err(KeyError::UnknownKey(kid.to_string()));
            }
            Ok(KeySet { current: kid.to_string(), keys: set.keys.clone() })
        })?;
        tracing::info!(kid = %kid, "Promoted signing key");
        Ok(())
    }

    /// Stage and promote in one step. Returns the previous current key id.
    pub fn rotate(&self, key: SigningKey) -> Result<String, KeyError> {
        let previous = self.current_kid();
        let kid = key.kid.clone();
        self.stage(key)?;
        self.promote(&kid)?;
        Ok(previous)
    }

    /// Stop accepting a non-current key.
    pub fn retire(&self, kid: &str) -> Result<(), KeyError> {
        self.publish(|set| {
            if set.current == kid {
                return Err(KeyError::RetireCurrent(kid.to_string()));
            }
            if set.get(kid).is_none() {
                return Err(KeyError::UnknownKey(kid.to_string()));
            }
            let keys = set.keys.iter().filter(|key| key.kid != kid).cloned().collect();
            Ok(KeySet { current: set.current.clone(), keys })
        })?;
        tracing::info!(kid = %kid, "Retired signing key");
        Ok(())
    }
}
