//! Layered gift-wrap envelope construction
//!
//! A message travels as three nested layers: an unsigned rumor, a seal
//! signed by the sender, and an outer gift wrap authored by a single-use
//! ephemeral key. Each layer is encrypted under its own conversation key,
//! so only the recipient can connect the visible wrapper to the sender.
//!
//! The wrap comes back as an unsigned skeleton: the nonce search finalizes
//! it once a qualifying identifier is found.

use rand_core::RngCore;

use crate::errors::{EventError, Result, VelumError};
use crate::event::{unix_time, Event, EventKind, Tag, UnsignedEvent};
use crate::keys::{
    conversation_key, decode_public_key, decrypt_with_key, encrypt_with_key, EventKeyPair,
};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Span of the wrapper's randomized timestamp window (two days into the past)
const WRAP_TIMESTAMP_WINDOW: u64 = 2 * 24 * 60 * 60;

// ----------------------------------------------------------------------------
// Wrap Draft
// ----------------------------------------------------------------------------

/// A gift wrap ready for mining: the unsigned outer skeleton plus the
/// ephemeral key pair that signs it once the nonce search succeeds.
#[derive(Debug, Clone)]
pub struct WrapDraft {
    pub skeleton: UnsignedEvent,
    pub ephemeral: EventKeyPair,
}

// ----------------------------------------------------------------------------
// Layer Builders
// ----------------------------------------------------------------------------

/// Build the innermost layer: an unsigned rumor addressed to `recipient`
pub fn build_rumor(
    sender: &EventKeyPair,
    recipient: &[u8; 32],
    message: &str,
    extra_tags: &[Tag],
    created_at: u64,
) -> UnsignedEvent {
    let mut tags = Vec::with_capacity(extra_tags.len() + 1);
    tags.push(Tag::recipient(&hex::encode(recipient)));
    tags.extend_from_slice(extra_tags);

    UnsignedEvent::new(
        sender.public_key_hex(),
        created_at,
        EventKind::RUMOR,
        tags,
        message.to_string(),
    )
}

/// Encrypt a rumor under the sender/recipient conversation key and sign the
/// resulting seal with the sender's key. Seals carry no tags.
pub fn seal_rumor(
    rumor: &UnsignedEvent,
    sender: &EventKeyPair,
    recipient: &[u8; 32],
    created_at: u64,
) -> Result<Event> {
    if rumor.kind != EventKind::RUMOR {
        return Err(EventError::UnexpectedKind {
            expected: EventKind::RUMOR.as_u16(),
            actual: rumor.kind.as_u16(),
        }
        .into());
    }

    let key = conversation_key(sender, recipient)?;
    let plaintext = serde_json::to_string(rumor)
        .map_err(|e| VelumError::serialization(e.to_string()))?;
    let content = encrypt_with_key(&key, plaintext.as_bytes())?;

    let seal = UnsignedEvent::new(
        sender.public_key_hex(),
        created_at,
        EventKind::SEAL,
        Vec::new(),
        content,
    );
    seal.sign(sender)
}

/// Encrypt a seal under the ephemeral/recipient conversation key, producing
/// the unsigned outer skeleton. `wrap_tags` land only on this layer.
pub fn wrap_seal(
    seal: &Event,
    ephemeral: &EventKeyPair,
    recipient: &[u8; 32],
    wrap_tags: &[Tag],
    created_at: u64,
) -> Result<UnsignedEvent> {
    if seal.kind != EventKind::SEAL {
        return Err(EventError::UnexpectedKind {
            expected: EventKind::SEAL.as_u16(),
            actual: seal.kind.as_u16(),
        }
        .into());
    }

    let key = conversation_key(ephemeral, recipient)?;
    let content = encrypt_with_key(&key, seal.to_json()?.as_bytes())?;

    let mut tags = Vec::with_capacity(wrap_tags.len() + 1);
    tags.push(Tag::recipient(&hex::encode(recipient)));
    tags.extend_from_slice(wrap_tags);

    Ok(UnsignedEvent::new(
        ephemeral.public_key_hex(),
        created_at,
        EventKind::GIFT_WRAP,
        tags,
        content,
    ))
}

/// Build the full envelope for `message`: rumor sealed under the sender's
/// key, wrapped under a fresh ephemeral key.
///
/// The wrapper's timestamp is randomized up to two days into the past so it
/// cannot be correlated with the sealed message inside.
pub fn build_envelope(
    sender: &EventKeyPair,
    recipient: &[u8; 32],
    message: &str,
    extra_tags: &[Tag],
    wrap_tags: &[Tag],
) -> Result<WrapDraft> {
    let now = unix_time();
    let rumor = build_rumor(sender, recipient, message, extra_tags, now);
    let seal = seal_rumor(&rumor, sender, recipient, now)?;

    let ephemeral = fresh_ephemeral(sender, recipient);
    let skeleton = wrap_seal(
        &seal,
        &ephemeral,
        recipient,
        wrap_tags,
        obfuscated_timestamp(now),
    )?;

    Ok(WrapDraft {
        skeleton,
        ephemeral,
    })
}

/// Generate an ephemeral key for one wrap. The key must never collide with
/// either party's key.
fn fresh_ephemeral(sender: &EventKeyPair, recipient: &[u8; 32]) -> EventKeyPair {
    loop {
        let candidate = EventKeyPair::generate();
        let public = candidate.public_key_bytes();
        if public != sender.public_key_bytes() && &public != recipient {
            return candidate;
        }
    }
}

fn obfuscated_timestamp(now: u64) -> u64 {
    let mut bytes = [0u8; 8];
    rand_core::OsRng.fill_bytes(&mut bytes);
    now.saturating_sub(u64::from_le_bytes(bytes) % WRAP_TIMESTAMP_WINDOW)
}

// ----------------------------------------------------------------------------
// Unwrap Path
// ----------------------------------------------------------------------------

/// Verify a gift wrap and decrypt it with the recipient's key, recovering
/// the seal. The seal's own signature is checked before it is returned.
pub fn open_gift_wrap(wrap: &Event, recipient: &EventKeyPair) -> Result<Event> {
    if wrap.kind != EventKind::GIFT_WRAP {
        return Err(EventError::UnexpectedKind {
            expected: EventKind::GIFT_WRAP.as_u16(),
            actual: wrap.kind.as_u16(),
        }
        .into());
    }
    wrap.verify()?;

    let ephemeral_public = decode_public_key(&wrap.pubkey)?;
    let key = conversation_key(recipient, &ephemeral_public)?;
    let plaintext = decrypt_with_key(&key, &wrap.content)?;

    let seal: Event = serde_json::from_slice(&plaintext)
        .map_err(|e| VelumError::serialization(e.to_string()))?;
    if seal.kind != EventKind::SEAL {
        return Err(EventError::UnexpectedKind {
            expected: EventKind::SEAL.as_u16(),
            actual: seal.kind.as_u16(),
        }
        .into());
    }
    seal.verify()?;

    Ok(seal)
}

/// Decrypt a seal with the recipient's key, recovering the rumor.
///
/// The rumor's declared author must match the seal's signer, otherwise a
/// compromised relay could splice someone else's message under its own seal.
pub fn open_seal(seal: &Event, recipient: &EventKeyPair) -> Result<UnsignedEvent> {
    if seal.kind != EventKind::SEAL {
        return Err(EventError::UnexpectedKind {
            expected: EventKind::SEAL.as_u16(),
            actual: seal.kind.as_u16(),
        }
        .into());
    }

    let sender_public = decode_public_key(&seal.pubkey)?;
    let key = conversation_key(recipient, &sender_public)?;
    let plaintext = decrypt_with_key(&key, &seal.content)?;

    let rumor: UnsignedEvent = serde_json::from_slice(&plaintext)
        .map_err(|e| VelumError::serialization(e.to_string()))?;
    if rumor.kind != EventKind::RUMOR {
        return Err(EventError::UnexpectedKind {
            expected: EventKind::RUMOR.as_u16(),
            actual: rumor.kind.as_u16(),
        }
        .into());
    }
    if rumor.pubkey != seal.pubkey {
        return Err(EventError::AuthorMismatch.into());
    }

    Ok(rumor)
}
