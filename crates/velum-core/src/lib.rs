//! # velum-core
//!
//! Protocol core for velum: the event model, key handling, and the layered
//! gift-wrap envelope used for metadata-private messaging.
//!
//! ## Architecture
//!
//! - **Events** are content-addressed: the identifier is the SHA-256 of a
//!   canonical JSON form, and signatures cover the identifier. Difficulty,
//!   as consumed by the mining layer, is the count of leading zero hex
//!   characters in the identifier.
//! - **Envelopes** nest three layers: an unsigned rumor, a seal signed by
//!   the sender, and an outer gift wrap authored by a single-use ephemeral
//!   key. Each layer is encrypted under its own conversation key so the
//!   visible wrapper reveals nothing about the sender.
//!
//! This crate is synchronous and holds no state between calls. The async
//! mining runtime that finalizes wrappers lives in `velum-miner`.

pub mod envelope;
pub mod errors;
pub mod event;
pub mod keys;

pub use envelope::{
    build_envelope, build_rumor, open_gift_wrap, open_seal, seal_rumor, wrap_seal, WrapDraft,
};
pub use errors::{CryptoError, EventError, Result, VelumError, VelumResult};
pub use event::{
    unix_time, Event, EventId, EventKind, Tag, UnsignedEvent, NONCE_TAG, RECIPIENT_TAG,
};
pub use keys::{
    conversation_key, decode_public_key, decrypt_with_key, encrypt_with_key, EventKeyPair,
};
