//! Challenge-response authentication for Coinfloor.
//!
//! # Authentication Flow
//!
//! 1. The server's welcome message carries a 16-byte nonce
//! 2. The client draws its own 16-byte nonce
//! 3. The private key is derived from the user ID and passphrase
//! 4. SHA-224 over (user ID, server nonce, client nonce) is signed with ECDSA on secp224k1
//! 5. The DER signature is split into two 28-byte big-endian integers
//! 6. `Authenticate` is sent with the client nonce and both integers, base64-encoded

use std::sync::Arc;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::pkey::Private;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha224};
use thiserror::Error;

/// Length in bytes of each signature component.
pub const SIGNATURE_COMPONENT_LEN: usize = 28;

/// Length in bytes of the server and client nonces.
pub const NONCE_LEN: usize = 16;

const DER_SEQUENCE: u8 = 0x30;
const DER_INTEGER: u8 = 0x02;

/// Authentication-specific errors
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The crypto backend failed or lacks the curve
    #[error("Signing failed: {0}")]
    Crypto(String),

    /// The DER signature could not be decomposed
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// A signature integer does not fit in 28 bytes
    #[error("Signature integer is too large")]
    IntegerTooLarge,

    /// A nonce of the wrong length
    #[error("Invalid nonce: {0}")]
    InvalidNonce(String),
}

impl From<ErrorStack> for AuthError {
    fn from(err: ErrorStack) -> Self {
        AuthError::Crypto(err.to_string())
    }
}

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Curve parameters for secp224k1
///
/// Build one and share it; nothing in the crate initializes crypto state globally.
pub struct SigningContext {
    group: EcGroup,
    order: BigNum,
}

impl SigningContext {
    /// Load secp224k1 from the crypto backend.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Crypto`] if the backend does not provide the curve.
    pub fn secp224k1() -> AuthResult<Self> {
        let group = EcGroup::from_curve_name(Nid::SECP224K1)?;
        let mut ctx = BigNumContext::new()?;
        let mut order = BigNum::new()?;
        group.order(&mut order, &mut ctx)?;
        Ok(Self { group, order })
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("curve", &"secp224k1")
            .finish()
    }
}

/// The two nonces a signature commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthChallenge {
    pub server_nonce: [u8; NONCE_LEN],
    pub client_nonce: [u8; NONCE_LEN],
}

impl AuthChallenge {
    /// Pair the server nonce with a fresh client nonce drawn from `rng`.
    pub fn generate<R: RngCore + CryptoRng>(server_nonce: [u8; NONCE_LEN], rng: &mut R) -> Self {
        let mut client_nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut client_nonce);
        Self {
            server_nonce,
            client_nonce,
        }
    }

    /// Base64 client nonce as sent in the `Authenticate` request.
    pub fn encoded_client_nonce(&self) -> String {
        BASE64_STANDARD.encode(self.client_nonce)
    }
}

/// An ECDSA signature as two fixed-width big-endian integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureComponents {
    pub r: [u8; SIGNATURE_COMPONENT_LEN],
    pub s: [u8; SIGNATURE_COMPONENT_LEN],
}

impl SignatureComponents {
    /// Base64 `[r, s]` as sent in the `Authenticate` request.
    pub fn encoded(&self) -> [String; 2] {
        [BASE64_STANDARD.encode(self.r), BASE64_STANDARD.encode(self.s)]
    }
}

/// Signs authentication challenges
#[derive(Debug, Clone)]
pub struct AuthSigner {
    context: Arc<SigningContext>,
}

impl AuthSigner {
    /// Create a signer over a shared curve context.
    pub fn new(context: Arc<SigningContext>) -> Self {
        Self { context }
    }

    /// Derive the private key for a user.
    ///
    /// The scalar is SHA-224(user ID as 8 big-endian bytes ‖ UTF-8 passphrase)
    /// reduced modulo the curve order.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Crypto`] on backend failure or a zero scalar.
    pub fn private_key(&self, user_id: u64, passphrase: &str) -> AuthResult<EcKey<Private>> {
        let seed = Sha224::new()
            .chain_update(user_id.to_be_bytes())
            .chain_update(passphrase.as_bytes())
            .finalize();

        let mut ctx = BigNumContext::new()?;
        let raw = BigNum::from_slice(&seed)?;
        let mut scalar = BigNum::new()?;
        scalar.nnmod(&raw, &self.context.order, &mut ctx)?;
        if scalar.num_bits() == 0 {
            return Err(AuthError::Crypto("derived private key is zero".to_string()));
        }

        let mut public = EcPoint::new(&self.context.group)?;
        public.mul_generator(&self.context.group, &scalar, &ctx)?;
        Ok(EcKey::from_private_components(
            &self.context.group,
            &scalar,
            &public,
        )?)
    }

    /// Sign a challenge.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Numeric user ID
    /// * `passphrase` - The user's passphrase
    /// * `challenge` - Server and client nonces
    ///
    /// # Returns
    ///
    /// The signature as two 28-byte components.
    pub fn sign(
        &self,
        user_id: u64,
        passphrase: &str,
        challenge: &AuthChallenge,
    ) -> AuthResult<SignatureComponents> {
        let key = self.private_key(user_id, passphrase)?;
        let digest = challenge_digest(user_id, challenge);
        let der = EcdsaSig::sign(&digest, &key)?.to_der()?;
        split_der_signature(&der)
    }

    /// Check components against the public key derived from the credentials.
    pub fn verify(
        &self,
        user_id: u64,
        passphrase: &str,
        challenge: &AuthChallenge,
        signature: &SignatureComponents,
    ) -> AuthResult<bool> {
        let private = self.private_key(user_id, passphrase)?;
        let public = EcKey::from_public_key(&self.context.group, private.public_key())?;
        let sig = EcdsaSig::from_private_components(
            BigNum::from_slice(&signature.r)?,
            BigNum::from_slice(&signature.s)?,
        )?;
        Ok(sig.verify(&challenge_digest(user_id, challenge), &public)?)
    }
}

fn challenge_digest(user_id: u64, challenge: &AuthChallenge) -> [u8; 28] {
    let hash = Sha224::new()
        .chain_update(user_id.to_be_bytes())
        .chain_update(challenge.server_nonce)
        .chain_update(challenge.client_nonce)
        .finalize();
    let mut digest = [0u8; 28];
    digest.copy_from_slice(&hash);
    digest
}

/// Decompose a DER `SEQUENCE { INTEGER r, INTEGER s }` into fixed-width components.
///
/// Leading zero bytes beyond 28 (ASN.1 sign padding) are dropped and shorter
/// integers are left-padded.
///
/// # Errors
///
/// - [`AuthError::MalformedSignature`] for wrong tags, long-form or indefinite
///   lengths, truncation, or a length mismatch
/// - [`AuthError::IntegerTooLarge`] if a non-zero byte lies beyond the 28-byte width
pub fn split_der_signature(der: &[u8]) -> AuthResult<SignatureComponents> {
    let mut cursor = DerCursor { bytes: der, pos: 0 };

    if cursor.byte()? != DER_SEQUENCE {
        return Err(malformed("expected SEQUENCE"));
    }
    let mut sequence_len = cursor.short_length()?;

    let mut components = SignatureComponents {
        r: [0u8; SIGNATURE_COMPONENT_LEN],
        s: [0u8; SIGNATURE_COMPONENT_LEN],
    };
    for out in [&mut components.r, &mut components.s] {
        if cursor.byte()? != DER_INTEGER {
            return Err(malformed("expected INTEGER"));
        }
        let mut len = cursor.short_length()?;
        sequence_len = sequence_len
            .checked_sub(2 + len)
            .ok_or_else(|| malformed("INTEGER overruns SEQUENCE"))?;

        while len > SIGNATURE_COMPONENT_LEN {
            if cursor.byte()? != 0 {
                return Err(AuthError::IntegerTooLarge);
            }
            len -= 1;
        }
        let value = cursor.take(len)?;
        out[SIGNATURE_COMPONENT_LEN - len..].copy_from_slice(value);
    }

    if sequence_len != 0 {
        return Err(malformed("SEQUENCE length mismatch"));
    }
    if cursor.pos != der.len() {
        return Err(malformed("trailing bytes after SEQUENCE"));
    }
    Ok(components)
}

fn malformed(reason: &str) -> AuthError {
    AuthError::MalformedSignature(reason.to_string())
}

struct DerCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DerCursor<'a> {
    fn byte(&mut self) -> AuthResult<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| malformed("truncated"))?;
        self.pos += 1;
        Ok(b)
    }

    fn short_length(&mut self) -> AuthResult<usize> {
        let len = self.byte()?;
        if len & 0x80 != 0 {
            return Err(malformed("only short-form lengths are supported"));
        }
        Ok(len as usize)
    }

    fn take(&mut self, len: usize) -> AuthResult<&'a [u8]> {
        let end = self.pos + len;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| malformed("truncated"))?;
        self.pos = end;
        Ok(slice)
    }
}
