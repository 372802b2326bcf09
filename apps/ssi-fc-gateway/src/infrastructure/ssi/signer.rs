//! Request Signing
//!
//! Order mutations carry an `X-Signature` header: an RSA PKCS#1 v1.5
//! signature over SHA-256 of the exact request body bytes, hex encoded.
//!
//! # Key Formats
//!
//! Private keys are accepted as:
//!
//! - PKCS#1 (`BEGIN RSA PRIVATE KEY`) or PKCS#8 (`BEGIN PRIVATE KEY`) PEM
//! - base64 of either PEM, or of raw PKCS#1/PKCS#8 DER
//! - base64 of the venue's `<RSAKeyValue>` XML export, which is what the
//!   FastConnect portal hands out

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{BigUint, RsaPrivateKey};
use sha2::Sha256;
use thiserror::Error;

use crate::error::GatewayError;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while loading a private key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Input is neither PEM nor valid base64.
    #[error("key is not PEM and not valid base64: {0}")]
    Decode(String),

    /// Key material was recognised but could not be parsed.
    #[error("failed to parse key: {0}")]
    Parse(String),

    /// Decoded bytes match no supported key format.
    #[error("unsupported key format")]
    UnsupportedFormat,
}

// =============================================================================
// Request Signer
// =============================================================================

/// Signs request bodies with the session's RSA private key.
///
/// Signing is deterministic: the same bytes always produce the same
/// signature.
#[derive(Clone)]
pub struct RequestSigner {
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
}

impl RequestSigner {
    /// Create a signer from a parsed key.
    #[must_use]
    pub fn new(private_key: RsaPrivateKey) -> Self {
        let verifying_key = VerifyingKey::<Sha256>::new(private_key.to_public_key());
        Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            verifying_key,
        }
    }

    /// Create a signer from key material in any supported format.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be decoded or parsed.
    pub fn from_key_material(raw: &str) -> Result<Self, KeyError> {
        parse_private_key(raw).map(Self::new)
    }

    /// Sign payload bytes, returning the lowercase hex signature.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Signing`] if the RSA operation fails.
    pub fn sign(&self, payload: &[u8]) -> Result<String, GatewayError> {
        let signature = self
            .signing_key
            .try_sign(payload)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        Ok(hex::encode(signature.to_bytes()))
    }

    /// Check a hex signature against payload bytes.
    #[must_use]
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> bool {
        let Ok(bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
            return false;
        };
        self.verifying_key.verify(payload, &signature).is_ok()
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Key Parsing
// =============================================================================

fn parse_private_key(raw: &str) -> Result<RsaPrivateKey, KeyError> {
    let raw = raw.trim();
    if raw.contains("BEGIN") {
        return parse_pem(raw);
    }

    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if let Ok(text) = std::str::from_utf8(&decoded) {
        if text.contains("BEGIN") {
            return parse_pem(text);
        }
        if text.contains("<RSAKeyValue>") {
            return parse_xml(text);
        }
    }

    if let Ok(key) = RsaPrivateKey::from_pkcs8_der(&decoded) {
        return Ok(key);
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs1_der(&decoded) {
        return Ok(key);
    }
    Err(KeyError::UnsupportedFormat)
}

fn parse_pem(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    if pem.contains("BEGIN RSA PRIVATE KEY") {
        return RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| KeyError::Parse(e.to_string()));
    }
    if pem.contains("BEGIN PRIVATE KEY") {
        return RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| KeyError::Parse(e.to_string()));
    }
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| KeyError::Parse("unsupported PEM label".to_string()))
}

fn parse_xml(xml: &str) -> Result<RsaPrivateKey, KeyError> {
    let n = xml_component(xml, "Modulus")?;
    let e = xml_component(xml, "Exponent")?;
    let d = xml_component(xml, "D")?;
    let p = xml_component(xml, "P")?;
    let q = xml_component(xml, "Q")?;

    let key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|e| KeyError::Parse(e.to_string()))?;
    key.validate().map_err(|e| KeyError::Parse(e.to_string()))?;
    Ok(key)
}

fn xml_component(xml: &str, tag: &str) -> Result<BigUint, KeyError> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml
        .find(&open)
        .map(|i| i + open.len())
        .ok_or_else(|| KeyError::Parse(format!("missing <{tag}> element")))?;
    let len = xml[start..]
        .find(&close)
        .ok_or_else(|| KeyError::Parse(format!("unterminated <{tag}> element")))?;

    let bytes = general_purpose::STANDARD
        .decode(xml[start..start + len].trim())
        .map_err(|e| KeyError::Parse(format!("<{tag}>: {e}")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::traits::{PrivateKeyParts, PublicKeyParts};

    const TEST_KEY_PEM: &str = include_str!("../../../tests/fixtures/test_signing_key.pem");

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(TEST_KEY_PEM).unwrap()
    }

    fn xml_export(key: &RsaPrivateKey) -> String {
        let b64 = |n: &BigUint| general_purpose::STANDARD.encode(n.to_bytes_be());
        let primes = key.primes();
        format!(
            "<RSAKeyValue><Modulus>{}</Modulus><Exponent>{}</Exponent><P>{}</P><Q>{}</Q><D>{}</D></RSAKeyValue>",
            b64(key.n()),
            b64(key.e()),
            b64(&primes[0]),
            b64(&primes[1]),
            b64(key.d()),
        )
    }

    #[test]
    fn signature_verifies_against_signed_bytes() {
        let signer = RequestSigner::from_key_material(TEST_KEY_PEM).unwrap();
        let body = br#"{"account":"0001","price":25000.0}"#;

        let signature = signer.sign(body).unwrap();
        assert!(signer.verify(body, &signature));
        assert!(!signer.verify(br#"{"account":"0002","price":25000.0}"#, &signature));
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = RequestSigner::from_key_material(TEST_KEY_PEM).unwrap();
        assert_eq!(signer.sign(b"payload").unwrap(), signer.sign(b"payload").unwrap());
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let signer = RequestSigner::from_key_material(TEST_KEY_PEM).unwrap();
        let signature = signer.sign(b"payload").unwrap();
        // 2048-bit key
        assert_eq!(signature.len(), 512);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn base64_pem_and_der_load_the_same_key() {
        let from_pem = RequestSigner::from_key_material(TEST_KEY_PEM).unwrap();
        let expected = from_pem.sign(b"payload").unwrap();

        let b64_pem = general_purpose::STANDARD.encode(TEST_KEY_PEM);
        let signer = RequestSigner::from_key_material(&b64_pem).unwrap();
        assert_eq!(signer.sign(b"payload").unwrap(), expected);

        let der = test_key().to_pkcs8_der().unwrap();
        let b64_der = general_purpose::STANDARD.encode(der.as_bytes());
        let signer = RequestSigner::from_key_material(&b64_der).unwrap();
        assert_eq!(signer.sign(b"payload").unwrap(), expected);
    }

    #[test]
    fn xml_export_loads_the_same_key() {
        let key = test_key();
        let expected = RequestSigner::new(key.clone()).sign(b"payload").unwrap();

        let encoded = general_purpose::STANDARD.encode(xml_export(&key));
        let signer = RequestSigner::from_key_material(&encoded).unwrap();
        assert_eq!(signer.sign(b"payload").unwrap(), expected);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            RequestSigner::from_key_material("not a key!"),
            Err(KeyError::Decode(_))
        ));
        let b64 = general_purpose::STANDARD.encode("hello world");
        assert_eq!(
            RequestSigner::from_key_material(&b64).unwrap_err(),
            KeyError::UnsupportedFormat
        );
    }

    #[test]
    fn malformed_signature_does_not_verify() {
        let signer = RequestSigner::from_key_material(TEST_KEY_PEM).unwrap();
        assert!(!signer.verify(b"payload", "zz"));
        assert!(!signer.verify(b"payload", "abcd"));
    }

    #[test]
    fn debug_is_redacted() {
        let signer = RequestSigner::from_key_material(TEST_KEY_PEM).unwrap();
        assert!(format!("{signer:?}").contains("REDACTED"));
    }
}
