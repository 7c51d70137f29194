//! Three-layer private message envelope (rumor → seal → gift wrap).
//!
//! Each layer is its own stage so the pipeline can be audited and tested one
//! step at a time:
//!
//! - [`seal_rumor`]: NIP-44 encrypts the rumor JSON from the real sender to
//!   the receiver and signs the kind 13 seal with the sender's signer.
//! - [`gift_wrap_seal`]: NIP-44 encrypts the seal JSON with a one-time key
//!   and signs the kind 1059 wrap with that key. Only the receiver's `p` tag
//!   is visible.
//! - [`unwrap_gift_wrap`] / [`open_seal`]: the inverse, on the receiving side.
//!
//! The seal and the wrap carry the same `created_at`.

use nostr_sdk::nips::nip44;
use nostr_sdk::prelude::*;

use crate::error::{Error, Rejection, Result};

/// Everything produced when sending one commerce message.
#[derive(Debug, Clone)]
pub struct OrderEnvelope {
    pub order_id: String,
    /// The receiver of `gift_wrap` (the merchant for orders and receipts).
    pub recipient: PublicKey,
    /// Unsigned inner message, id computed.
    pub rumor: UnsignedEvent,
    /// Seal addressed to `recipient`.
    pub seal: Event,
    /// Outer event addressed to `recipient`; the only layer that is published.
    pub gift_wrap: Event,
    /// Copy of the rumor sealed and wrapped to the sender itself.
    pub self_wrap: Option<Event>,
}

fn signer_error(e: impl std::fmt::Display) -> Error {
    Error::Signer(e.to_string())
}

/// Seal `rumor` for `receiver` using the sender's signer.
pub async fn seal_rumor(
    signer: &dyn NostrSigner,
    rumor: &UnsignedEvent,
    receiver: &PublicKey,
    created_at: Timestamp,
) -> Result<Event> {
    let sender = signer.get_public_key().await.map_err(signer_error)?;
    let content = signer
        .nip44_encrypt(receiver, &rumor.as_json())
        .await
        .map_err(signer_error)?;
    let unsigned = EventBuilder::new(Kind::Seal, content)
        .custom_created_at(created_at)
        .build(sender);
    signer.sign_event(unsigned).await.map_err(signer_error)
}

/// Wrap `seal` for `receiver` under a freshly generated key.
///
/// The ephemeral key never leaves this function.
pub fn gift_wrap_seal(seal: &Event, receiver: &PublicKey, created_at: Timestamp) -> Result<Event> {
    let ephemeral = Keys::generate();
    let content = nip44::encrypt(
        ephemeral.secret_key(),
        receiver,
        seal.as_json(),
        nip44::Version::V2,
    )
    .map_err(|e| Error::Builder(format!("failed to encrypt seal: {e}")))?;

    EventBuilder::new(Kind::GiftWrap, content)
        .tag(Tag::public_key(*receiver))
        .custom_created_at(created_at)
        .sign_with_keys(&ephemeral)
        .map_err(|e| Error::Builder(format!("failed to build gift wrap: {e}")))
}

/// Seal and wrap `rumor` for `recipient`, optionally producing a self copy.
pub(crate) async fn seal_and_wrap(
    signer: &dyn NostrSigner,
    order_id: String,
    rumor: UnsignedEvent,
    recipient: PublicKey,
    created_at: Timestamp,
    copy_to_self: bool,
) -> Result<OrderEnvelope> {
    let seal = seal_rumor(signer, &rumor, &recipient, created_at).await?;
    let gift_wrap = gift_wrap_seal(&seal, &recipient, created_at)?;

    let self_wrap = if copy_to_self {
        let sender = signer.get_public_key().await.map_err(signer_error)?;
        let self_seal = seal_rumor(signer, &rumor, &sender, created_at).await?;
        Some(gift_wrap_seal(&self_seal, &sender, created_at)?)
    } else {
        None
    };

    Ok(OrderEnvelope {
        order_id,
        recipient,
        rumor,
        seal,
        gift_wrap,
        self_wrap,
    })
}

/// Decrypt a gift wrap addressed to the signer's key, yielding the seal.
pub async fn unwrap_gift_wrap(
    signer: &dyn NostrSigner,
    gift_wrap: &Event,
) -> std::result::Result<Event, Rejection> {
    if gift_wrap.kind != Kind::GiftWrap {
        return Err(Rejection::NotGiftWrap(gift_wrap.kind.as_u16()));
    }
    let plaintext = signer
        .nip44_decrypt(&gift_wrap.pubkey, &gift_wrap.content)
        .await
        .map_err(|e| Rejection::WrapDecryption(e.to_string()))?;
    let seal = Event::from_json(plaintext).map_err(|e| Rejection::MalformedSeal(e.to_string()))?;
    if seal.kind != Kind::Seal {
        return Err(Rejection::MalformedSeal(format!(
            "unexpected kind {}",
            seal.kind.as_u16()
        )));
    }
    Ok(seal)
}

/// Verify and decrypt a seal, yielding the rumor with its id recomputed.
pub async fn open_seal(
    signer: &dyn NostrSigner,
    seal: &Event,
) -> std::result::Result<UnsignedEvent, Rejection> {
    seal.verify().map_err(|_| Rejection::SealSignature)?;
    let plaintext = signer
        .nip44_decrypt(&seal.pubkey, &seal.content)
        .await
        .map_err(|e| Rejection::SealDecryption(e.to_string()))?;
    let mut rumor =
        UnsignedEvent::from_json(plaintext).map_err(|e| Rejection::MalformedRumor(e.to_string()))?;
    if rumor.pubkey != seal.pubkey {
        return Err(Rejection::SenderMismatch);
    }
    rumor.id = None;
    rumor.ensure_id();
    Ok(rumor)
}

/// Subscription filter for gift wraps addressed to `user`.
pub fn build_gift_wrap_filter(user: &PublicKey) -> Filter {
    Filter::new().kind(Kind::GiftWrap).pubkey(*user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rumor_from(keys: &Keys, content: &str) -> UnsignedEvent {
        let mut rumor = EventBuilder::new(Kind::from(16u16), content)
            .tag(Tag::public_key(Keys::generate().public_key()))
            .build(keys.public_key());
        rumor.ensure_id();
        rumor
    }

    #[tokio::test]
    async fn seal_then_wrap_then_open() {
        let sender = Keys::generate();
        let receiver = Keys::generate();
        let rumor = rumor_from(&sender, "hello merchant");
        let now = Timestamp::now();

        let seal = seal_rumor(&sender, &rumor, &receiver.public_key(), now)
            .await
            .unwrap();
        assert_eq!(seal.kind, Kind::Seal);
        assert_eq!(seal.pubkey, sender.public_key());
        assert!(seal.tags.iter().next().is_none());

        let wrap = gift_wrap_seal(&seal, &receiver.public_key(), now).unwrap();
        assert_eq!(wrap.kind, Kind::GiftWrap);
        assert_eq!(wrap.created_at, seal.created_at);

        let opened_seal = unwrap_gift_wrap(&receiver, &wrap).await.unwrap();
        assert_eq!(opened_seal.id, seal.id);
        let opened = open_seal(&receiver, &opened_seal).await.unwrap();
        assert_eq!(opened.content, "hello merchant");
        assert_eq!(opened.id, rumor.id);
    }

    #[tokio::test]
    async fn wrap_signer_is_not_the_sender() {
        let sender = Keys::generate();
        let receiver = Keys::generate();
        let rumor = rumor_from(&sender, "secret");
        let now = Timestamp::now();
        let seal = seal_rumor(&sender, &rumor, &receiver.public_key(), now)
            .await
            .unwrap();

        let first = gift_wrap_seal(&seal, &receiver.public_key(), now).unwrap();
        let second = gift_wrap_seal(&seal, &receiver.public_key(), now).unwrap();
        assert_ne!(first.pubkey, sender.public_key());
        assert_ne!(first.pubkey, second.pubkey);

        let p_tags: Vec<_> = first
            .tags
            .iter()
            .map(|t| t.as_slice().to_vec())
            .collect();
        assert_eq!(
            p_tags,
            vec![vec!["p".to_string(), receiver.public_key().to_hex()]]
        );
    }

    #[tokio::test]
    async fn wrong_receiver_cannot_unwrap() {
        let sender = Keys::generate();
        let receiver = Keys::generate();
        let stranger = Keys::generate();
        let rumor = rumor_from(&sender, "not for you");
        let now = Timestamp::now();
        let seal = seal_rumor(&sender, &rumor, &receiver.public_key(), now)
            .await
            .unwrap();
        let wrap = gift_wrap_seal(&seal, &receiver.public_key(), now).unwrap();

        let err = unwrap_gift_wrap(&stranger, &wrap).await.unwrap_err();
        assert!(matches!(err, Rejection::WrapDecryption(_)));
    }

    #[tokio::test]
    async fn forged_rumor_author_is_rejected() {
        let sender = Keys::generate();
        let victim = Keys::generate();
        let receiver = Keys::generate();
        // Rumor claims to be authored by `victim`, sealed by `sender`.
        let rumor = rumor_from(&victim, "impersonation");
        let now = Timestamp::now();
        let seal = seal_rumor(&sender, &rumor, &receiver.public_key(), now)
            .await
            .unwrap();

        let err = open_seal(&receiver, &seal).await.unwrap_err();
        assert_eq!(err, Rejection::SenderMismatch);
    }

    #[tokio::test]
    async fn non_wrap_kind_is_rejected() {
        let keys = Keys::generate();
        let note = EventBuilder::text_note("hi").sign_with_keys(&keys).unwrap();
        let err = unwrap_gift_wrap(&keys, &note).await.unwrap_err();
        assert_eq!(err, Rejection::NotGiftWrap(1));
    }

    #[test]
    fn gift_wrap_filter_targets_user() {
        let user = Keys::generate().public_key();
        let json = build_gift_wrap_filter(&user).as_json();
        assert!(json.contains("1059"));
        assert!(json.contains(&user.to_hex()));
    }
}
