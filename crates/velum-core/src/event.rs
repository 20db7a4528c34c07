//! Event model and canonical serialization
//!
//! Events are identified by the SHA-256 of their canonical JSON form,
//! `[0, pubkey, created_at, kind, tags, content]`. The identifier is the
//! quantity the proof-of-work search operates on: difficulty is the number
//! of leading zero hex characters in the identifier.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::errors::{EventError, Result, VelumError};
use crate::keys::{self, EventKeyPair};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Tag name carrying a recipient public key
pub const RECIPIENT_TAG: &str = "p";

/// Tag name carrying the proof-of-work nonce and target difficulty
pub const NONCE_TAG: &str = "nonce";

// ----------------------------------------------------------------------------
// Event Kind
// ----------------------------------------------------------------------------

/// Numeric event kind.
///
/// Kinds form an open registry; only the three envelope layers are defined
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKind(pub u16);

impl EventKind {
    /// Unsigned inner message
    pub const RUMOR: EventKind = EventKind(14);

    /// Signed event carrying an encrypted rumor
    pub const SEAL: EventKind = EventKind(13);

    /// Ephemeral-keyed outer event carrying an encrypted seal
    pub const GIFT_WRAP: EventKind = EventKind(1059);

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Tags
// ----------------------------------------------------------------------------

/// A single event tag: a name followed by its values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Vec<String>);

impl Tag {
    /// Create a tag from its raw parts
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(parts.into_iter().map(Into::into).collect())
    }

    /// Recipient tag: `["p", <pubkey hex>]`
    pub fn recipient(pubkey_hex: &str) -> Self {
        Tag::new([RECIPIENT_TAG, pubkey_hex])
    }

    /// Nonce tag: `["nonce", <counter>, <target difficulty>]`
    pub fn nonce(counter: u64, difficulty: u8) -> Self {
        Tag::new([
            NONCE_TAG.to_string(),
            counter.to_string(),
            difficulty.to_string(),
        ])
    }

    /// The tag name, if the tag is non-empty
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// A positional element of the tag
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

fn find_tag<'a>(tags: &'a [Tag], name: &str) -> Option<&'a Tag> {
    tags.iter().find(|tag| tag.name() == Some(name))
}

/// Parse a nonce tag out of a tag set: `(counter, target difficulty)`
fn parse_nonce_tag(tags: &[Tag]) -> Result<Option<(u64, u8)>> {
    let tag = match find_tag(tags, NONCE_TAG) {
        Some(tag) => tag,
        None => return Ok(None),
    };

    let counter = tag
        .get(1)
        .and_then(|value| value.parse::<u64>().ok())
        .ok_or(EventError::MalformedNonceTag)?;
    let difficulty = tag
        .get(2)
        .and_then(|value| value.parse::<u8>().ok())
        .ok_or(EventError::MalformedNonceTag)?;

    Ok(Some((counter, difficulty)))
}

// ----------------------------------------------------------------------------
// Event Identifier
// ----------------------------------------------------------------------------

/// Content-addressed event identifier: SHA-256 of the canonical form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId([u8; 32]);

impl EventId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        EventId(bytes)
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text).map_err(|_| EventError::MalformedId)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| EventError::MalformedId)?;
        Ok(EventId(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Count of leading zero hex characters in the identifier.
    ///
    /// Each hex character covers four bits, so a difficulty of `n` means the
    /// top `4 * n` bits of the identifier are zero.
    pub fn pow_difficulty(&self) -> u8 {
        let mut count = 0u8;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> core::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        EventId::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

// ----------------------------------------------------------------------------
// Unsigned Event
// ----------------------------------------------------------------------------

/// An event skeleton: everything but the identifier and signature.
///
/// Rumors stay in this form forever. Gift wraps pass through it while the
/// nonce search mutates their nonce tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: EventKind,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    pub fn new(
        pubkey: String,
        created_at: u64,
        kind: EventKind,
        tags: Vec<Tag>,
        content: String,
    ) -> Self {
        Self {
            pubkey,
            created_at,
            kind,
            tags,
            content,
        }
    }

    /// Canonical serialization: `[0, pubkey, created_at, kind, tags, content]`
    pub fn canonical(&self) -> Result<String> {
        serde_json::to_string(&(
            0,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
        .map_err(|e| VelumError::serialization(e.to_string()))
    }

    /// Compute the content-addressed identifier over the canonical form
    pub fn id(&self) -> Result<EventId> {
        let canonical = self.canonical()?;
        let digest = Sha256::digest(canonical.as_bytes());

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Ok(EventId(bytes))
    }

    /// Replace the nonce tag, or append one if none exists.
    ///
    /// Only the nonce tag may change between search iterations; everything
    /// else in the skeleton stays fixed.
    pub fn set_nonce(&mut self, counter: u64, difficulty: u8) {
        let nonce = Tag::nonce(counter, difficulty);
        match self
            .tags
            .iter_mut()
            .find(|tag| tag.name() == Some(NONCE_TAG))
        {
            Some(slot) => *slot = nonce,
            None => self.tags.push(nonce),
        }
    }

    /// The first recipient tag value, if present
    pub fn recipient(&self) -> Option<&str> {
        find_tag(&self.tags, RECIPIENT_TAG).and_then(|tag| tag.get(1))
    }

    /// Parse the nonce tag, if present
    pub fn nonce_tag(&self) -> Result<Option<(u64, u8)>> {
        parse_nonce_tag(&self.tags)
    }

    /// Sign the skeleton, producing a finalized event.
    ///
    /// The signature covers the identifier bytes, and the signing key must
    /// belong to the declared author.
    pub fn sign(self, keys: &EventKeyPair) -> Result<Event> {
        if self.pubkey != keys.public_key_hex() {
            return Err(EventError::SignerMismatch.into());
        }

        let id = self.id()?;
        let signature = keys.sign(id.as_bytes());

        Ok(Event {
            id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: hex::encode(signature),
        })
    }
}

// ----------------------------------------------------------------------------
// Signed Event
// ----------------------------------------------------------------------------

/// A finalized event: identifier, payload, and author signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: EventKind,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Count of leading zero hex characters in the identifier
    pub fn pow_difficulty(&self) -> u8 {
        self.id.pow_difficulty()
    }

    /// The first recipient tag value, if present
    pub fn recipient(&self) -> Option<&str> {
        find_tag(&self.tags, RECIPIENT_TAG).and_then(|tag| tag.get(1))
    }

    /// Parse the nonce tag, if present
    pub fn nonce_tag(&self) -> Result<Option<(u64, u8)>> {
        parse_nonce_tag(&self.tags)
    }

    /// Recompute the canonical identifier and check the author signature
    pub fn verify(&self) -> Result<()> {
        let skeleton = UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        };
        if skeleton.id()? != self.id {
            return Err(EventError::IdMismatch.into());
        }

        let public_key = keys::decode_public_key(&self.pubkey)?;
        let signature = keys::decode_signature(&self.sig)?;
        EventKeyPair::verify(&public_key, self.id.as_bytes(), &signature)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VelumError::serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VelumError::serialization(e.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Time Helpers
// ----------------------------------------------------------------------------

/// Seconds since the Unix epoch
pub fn unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_skeleton(keys: &EventKeyPair) -> UnsignedEvent {
        UnsignedEvent::new(
            keys.public_key_hex(),
            1_700_000_000,
            EventKind::SEAL,
            vec![Tag::recipient(&"ab".repeat(32))],
            "payload".to_string(),
        )
    }

    #[test]
    fn test_kind_constants_use_protocol_numbers() {
        assert_eq!(EventKind::RUMOR.as_u16(), 14);
        assert_eq!(EventKind::SEAL.as_u16(), 13);
        assert_eq!(EventKind::GIFT_WRAP.as_u16(), 1059);
    }

    #[test]
    fn test_canonical_serialization_matches_expected_form() {
        let pubkey = "a1".repeat(32);
        let recipient = "b2".repeat(32);
        let skeleton = UnsignedEvent::new(
            pubkey.clone(),
            1_700_000_000,
            EventKind::SEAL,
            vec![Tag::recipient(&recipient)],
            "hello".to_string(),
        );

        let expected = format!(
            r#"[0,"{}",1700000000,13,[["p","{}"]],"hello"]"#,
            pubkey, recipient
        );
        assert_eq!(skeleton.canonical().unwrap(), expected);

        // The identifier is the SHA-256 of exactly that form
        let digest = Sha256::digest(expected.as_bytes());
        assert_eq!(skeleton.id().unwrap().as_bytes(), digest.as_slice());
    }

    #[test]
    fn test_canonical_serialization_escapes_content() {
        let skeleton = UnsignedEvent::new(
            "a1".repeat(32),
            1_700_000_000,
            EventKind::RUMOR,
            Vec::new(),
            "line one\nwith \"quotes\"".to_string(),
        );

        let expected = format!(
            r#"[0,"{}",1700000000,14,[],"line one\nwith \"quotes\""]"#,
            "a1".repeat(32)
        );
        assert_eq!(skeleton.canonical().unwrap(), expected);
    }

    #[test]
    fn test_id_changes_with_content() {
        let keys = EventKeyPair::generate();
        let skeleton = sample_skeleton(&keys);

        let mut changed = skeleton.clone();
        changed.content = "different payload".to_string();
        assert_ne!(skeleton.id().unwrap(), changed.id().unwrap());
    }

    #[test]
    fn test_pow_difficulty_counts_hex_zeros() {
        let mut bytes = [0xffu8; 32];
        assert_eq!(EventId::from_bytes(bytes).pow_difficulty(), 0);

        bytes[0] = 0x0f;
        assert_eq!(EventId::from_bytes(bytes).pow_difficulty(), 1);

        bytes[0] = 0x00;
        assert_eq!(EventId::from_bytes(bytes).pow_difficulty(), 2);

        bytes[1] = 0x0a;
        assert_eq!(EventId::from_bytes(bytes).pow_difficulty(), 3);

        bytes[1] = 0x00;
        assert_eq!(EventId::from_bytes(bytes).pow_difficulty(), 4);

        assert_eq!(EventId::from_bytes([0u8; 32]).pow_difficulty(), 64);
    }

    #[test]
    fn test_event_id_hex_round_trip() {
        let id = EventId::from_bytes([0x1cu8; 32]);
        let restored = EventId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, restored);

        assert!(EventId::from_hex("abcd").is_err());
        assert!(EventId::from_hex("not hex").is_err());
    }

    #[test]
    fn test_set_nonce_replaces_existing_tag() {
        let keys = EventKeyPair::generate();
        let mut skeleton = sample_skeleton(&keys);

        skeleton.set_nonce(1, 8);
        skeleton.set_nonce(2, 8);

        let nonce_tags: Vec<_> = skeleton
            .tags
            .iter()
            .filter(|tag| tag.name() == Some(NONCE_TAG))
            .collect();
        assert_eq!(nonce_tags.len(), 1);
        assert_eq!(skeleton.nonce_tag().unwrap(), Some((2, 8)));

        // The recipient tag is untouched
        assert_eq!(skeleton.recipient(), Some("ab".repeat(32).as_str()));
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let keys = EventKeyPair::generate();
        let event = sample_skeleton(&keys).sign(&keys).unwrap();

        assert!(event.verify().is_ok());
        assert_eq!(event.kind, EventKind::SEAL);
    }

    #[test]
    fn test_sign_rejects_foreign_author() {
        let keys = EventKeyPair::generate();
        let other = EventKeyPair::generate();

        let result = sample_skeleton(&keys).sign(&other);
        assert_eq!(
            result,
            Err(VelumError::Event(EventError::SignerMismatch))
        );
    }

    #[test]
    fn test_verify_rejects_mutated_event() {
        let keys = EventKeyPair::generate();
        let event = sample_skeleton(&keys).sign(&keys).unwrap();

        let mut mutated = event.clone();
        mutated.content = "changed after signing".to_string();
        assert_eq!(
            mutated.verify(),
            Err(VelumError::Event(EventError::IdMismatch))
        );

        let mut resigned = event;
        resigned.sig = "00".repeat(64);
        assert_eq!(resigned.verify(), Err(VelumError::signature_error()));
    }

    #[test]
    fn test_nonce_tag_parsing_rejects_malformed_values() {
        let keys = EventKeyPair::generate();
        let mut skeleton = sample_skeleton(&keys);
        skeleton.tags.push(Tag::new([NONCE_TAG, "not a number", "8"]));

        assert_eq!(
            skeleton.nonce_tag(),
            Err(VelumError::Event(EventError::MalformedNonceTag))
        );
    }

    #[test]
    fn test_event_json_round_trip() {
        let keys = EventKeyPair::generate();
        let mut skeleton = sample_skeleton(&keys);
        skeleton.set_nonce(41, 2);
        let event = skeleton.sign(&keys).unwrap();

        let restored = Event::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(restored, event);
        assert!(restored.verify().is_ok());
        assert_eq!(restored.nonce_tag().unwrap(), Some((41, 2)));
    }
}
