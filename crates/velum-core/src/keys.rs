//! Cryptographic primitives for velum
//!
//! Ed25519 key pairs author and seal events. For encryption, each envelope
//! layer derives a symmetric conversation key from a Diffie-Hellman exchange
//! between the layer's signing key and the recipient's key, then seals the
//! payload with ChaCha20-Poly1305.

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use crate::errors::{CryptoError, Result, VelumError};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Domain separator for conversation key derivation
const CONVERSATION_KEY_DOMAIN: &[u8] = b"velum_conversation_key:";

/// ChaCha20-Poly1305 nonce length in bytes
const CIPHER_NONCE_LEN: usize = 12;

// ----------------------------------------------------------------------------
// Event Key Pair (Ed25519)
// ----------------------------------------------------------------------------

/// Ed25519 key pair used to author, seal, and wrap events
#[derive(Debug, Clone)]
pub struct EventKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl EventKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self::generate_with_rng(&mut rng)
    }

    /// Generate a new key pair with a custom RNG
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);

        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create a key pair from raw private key bytes
    pub fn from_bytes(private_key: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(private_key);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the public key as lowercase hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Get the private key bytes
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign data with flexible input types
    pub fn sign<T: AsRef<[u8]>>(&self, data: T) -> [u8; 64] {
        self.signing_key.sign(data.as_ref()).to_bytes()
    }

    /// Verify a signature made by the holder of `public_key`
    pub fn verify<D: AsRef<[u8]>>(
        public_key: &[u8; 32],
        data: D,
        signature: &[u8; 64],
    ) -> Result<()> {
        let verifying_key =
            VerifyingKey::from_bytes(public_key).map_err(|_| VelumError::invalid_key())?;
        let signature = Signature::from_bytes(signature);

        verifying_key
            .verify(data.as_ref(), &signature)
            .map_err(|_| VelumError::signature_error())
    }
}

// ----------------------------------------------------------------------------
// Hex Decoding Helpers
// ----------------------------------------------------------------------------

/// Decode a 64-character hex public key into raw bytes
pub fn decode_public_key(text: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(text).map_err(|_| CryptoError::InvalidKeyFormat)?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyFormat)?;
    Ok(key)
}

/// Decode a 128-character hex signature into raw bytes
pub fn decode_signature(text: &str) -> Result<[u8; 64]> {
    let bytes = hex::decode(text).map_err(|_| CryptoError::SignatureVerificationFailed)?;
    let signature: [u8; 64] = bytes
        .try_into()
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;
    Ok(signature)
}

// ----------------------------------------------------------------------------
// Conversation Key Derivation
// ----------------------------------------------------------------------------

/// Derive the symmetric key for one encryption layer.
///
/// Both signing keys are converted to their X25519 form, run through a
/// Diffie-Hellman exchange, and the shared point is hashed under a domain
/// separator. The derivation is symmetric: the recipient recovers the same
/// key from its own private key and the author's public key.
pub fn conversation_key(own: &EventKeyPair, their_public: &[u8; 32]) -> Result<[u8; 32]> {
    let their_key =
        VerifyingKey::from_bytes(their_public).map_err(|_| CryptoError::KeyDerivationFailed)?;

    let secret = x25519_dalek::StaticSecret::from(own.signing_key.to_scalar_bytes());
    let public = x25519_dalek::PublicKey::from(their_key.to_montgomery().to_bytes());
    let shared = secret.diffie_hellman(&public);

    let mut hasher = Sha256::new();
    hasher.update(CONVERSATION_KEY_DOMAIN);
    hasher.update(shared.as_bytes());
    let digest = hasher.finalize();

    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    Ok(key)
}

// ----------------------------------------------------------------------------
// Layer Cipher
// ----------------------------------------------------------------------------

/// Encrypt one envelope layer under a conversation key.
///
/// Output is `base64(nonce || ciphertext)` with a fresh random 96-bit nonce
/// per call.
pub fn encrypt_with_key(key: &[u8; 32], plaintext: &[u8]) -> Result<String> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; CIPHER_NONCE_LEN];
    rand_core::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut framed = Vec::with_capacity(CIPHER_NONCE_LEN + ciphertext.len());
    framed.extend_from_slice(&nonce_bytes);
    framed.extend_from_slice(&ciphertext);
    Ok(general_purpose::STANDARD.encode(framed))
}

/// Decrypt one envelope layer under a conversation key
pub fn decrypt_with_key(key: &[u8; 32], content: &str) -> Result<Vec<u8>> {
    let framed = general_purpose::STANDARD
        .decode(content)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    if framed.len() < CIPHER_NONCE_LEN {
        return Err(CryptoError::DecryptionFailed.into());
    }

    let (nonce_bytes, ciphertext) = framed.split_at(CIPHER_NONCE_LEN);
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(plaintext)
}
