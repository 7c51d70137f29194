use nostr_sdk::prelude::*;

use super::envelope::{open_seal, unwrap_gift_wrap};
use super::validation::{CommerceMessage, validate};
use super::{CommerceEventType, ORDER_MESSAGE_KIND, PAYMENT_RECEIPT_KIND, TYPE_TAG, TagView};
use crate::error::Rejection;

/// A decrypted rumor that passed its type's schema check.
#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    pub event_type: CommerceEventType,
    pub order_id: String,
    pub message: CommerceMessage,
    pub rumor: UnsignedEvent,
}

impl ClassifiedEvent {
    /// Hex id of the rumor.
    pub fn id(&self) -> String {
        self.rumor.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn timestamp(&self) -> u64 {
        self.rumor.created_at.as_u64()
    }
}

/// Classify and validate a decrypted rumor.
pub fn classify_rumor(mut rumor: UnsignedEvent) -> Result<ClassifiedEvent, Rejection> {
    let tags = TagView::new(rumor.tags.iter());
    let kind = rumor.kind.as_u16();

    let event_type = match kind {
        ORDER_MESSAGE_KIND => {
            let type_tag = tags.first(TYPE_TAG);
            type_tag
                .and_then(CommerceEventType::from_type_tag)
                .ok_or_else(|| Rejection::Unrecognized {
                    kind,
                    type_tag: type_tag.map(str::to_string),
                })?
        }
        PAYMENT_RECEIPT_KIND => CommerceEventType::PaymentReceipt,
        _ => {
            return Err(Rejection::Unrecognized {
                kind,
                type_tag: tags.first(TYPE_TAG).map(str::to_string),
            });
        }
    };

    let order_id = tags
        .order_id()
        .ok_or(Rejection::MissingOrderTag)?
        .to_string();

    let message = validate(event_type, &order_id, &tags, &rumor.content)
        .map_err(|reason| Rejection::Invalid { event_type, reason })?;

    rumor.ensure_id();
    Ok(ClassifiedEvent {
        event_type,
        order_id,
        message,
        rumor,
    })
}

/// Run the full inbound pipeline on one gift wrap.
pub async fn process_gift_wrap(
    signer: &dyn NostrSigner,
    gift_wrap: &Event,
) -> Result<ClassifiedEvent, Rejection> {
    let seal = unwrap_gift_wrap(signer, gift_wrap).await?;
    let rumor = open_seal(signer, &seal).await?;
    classify_rumor(rumor)
}
