//! Payment request expiry: which deadline applies and how long is left.
//!
//! A Lightning invoice's own expiry (`timestamp + expiry`) takes precedence
//! over the protocol-level `expiration` tag. With neither present the request
//! never expires.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nostr_sdk::prelude::{Tag, UnsignedEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::commerce::EXPIRATION_TAG;
use crate::invoice::{LightningInvoiceInfo, lightning_invoice_of, parse_bolt11};

/// Where the effective deadline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirySource {
    Lightning,
    Nostr,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedExpiration {
    pub source: ExpirySource,
    /// Absolute deadline, seconds since the epoch.
    pub expires_at: Option<u64>,
    /// Seconds left, floored at zero.
    pub remaining: Option<u64>,
    pub is_expired: bool,
}

impl ResolvedExpiration {
    const NEVER: ResolvedExpiration = ResolvedExpiration {
        source: ExpirySource::None,
        expires_at: None,
        remaining: None,
        is_expired: false,
    };

    fn at(source: ExpirySource, expires_at: u64, now: u64) -> Self {
        let remaining = expires_at.saturating_sub(now);
        Self {
            source,
            expires_at: Some(expires_at),
            remaining: Some(remaining),
            is_expired: remaining == 0,
        }
    }

    /// Recompute `remaining` / `is_expired` for a new `now`.
    pub fn refreshed(self, now: u64) -> Self {
        match self.expires_at {
            Some(deadline) => Self::at(self.source, deadline, now),
            None => Self::NEVER,
        }
    }

    /// Human-readable countdown, or `None` when there is no deadline.
    pub fn label(&self) -> Option<String> {
        self.remaining
            .map(|secs| format_time_remaining(i64::try_from(secs).unwrap_or(i64::MAX)))
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Resolve the effective deadline from an event's tags and its invoice.
pub fn resolve_expiration<'a, I>(
    tags: I,
    invoice: Option<&LightningInvoiceInfo>,
    now: u64,
) -> ResolvedExpiration
where
    I: IntoIterator<Item = &'a Tag>,
{
    let lightning_expiry = invoice.map(LightningInvoiceInfo::expires_at);
    let protocol_expiry = tags.into_iter().find_map(|tag| match tag.as_slice() {
        [name, value, ..] if name == EXPIRATION_TAG => value.trim().parse::<u64>().ok(),
        _ => None,
    });

    match (lightning_expiry, protocol_expiry) {
        (Some(deadline), _) => ResolvedExpiration::at(ExpirySource::Lightning, deadline, now),
        (None, Some(deadline)) => ResolvedExpiration::at(ExpirySource::Nostr, deadline, now),
        (None, None) => ResolvedExpiration::NEVER,
    }
}

/// Resolve straight from a rumor, decoding its Lightning invoice if present.
pub fn expiration_of(rumor: &UnsignedEvent, now: u64) -> ResolvedExpiration {
    let invoice = lightning_invoice_of(rumor.tags.iter()).and_then(parse_bolt11);
    resolve_expiration(rumor.tags.iter(), invoice.as_ref(), now)
}

/// `"1h 2m 3s left"`, dropping leading zero units. Zero or less is `"Expired"`.
pub fn format_time_remaining(seconds: i64) -> String {
    if seconds <= 0 {
        return "Expired".to_string();
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s left")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s left")
    } else {
        format!("{secs}s left")
    }
}

/// Live countdown for one payment request.
///
/// A background task recomputes the state once per second and publishes it on
/// a watch channel. The task ends after publishing the expired state, when
/// every receiver is gone, or when the countdown is dropped.
pub struct ExpirationCountdown {
    rx: watch::Receiver<ResolvedExpiration>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirationCountdown {
    /// Start ticking. Requests without a deadline never spawn a task.
    pub fn spawn(initial: ResolvedExpiration) -> Self {
        Self::spawn_with_clock(initial, unix_now)
    }

    pub(crate) fn spawn_with_clock<F>(initial: ResolvedExpiration, clock: F) -> Self
    where
        F: Fn() -> u64 + Send + 'static,
    {
        let current = initial.refreshed(clock());
        let (tx, rx) = watch::channel(current);

        if current.expires_at.is_none() || current.is_expired {
            return Self { rx, handle: None };
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // First tick fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let next = current.refreshed(clock());
                if tx.send(next).is_err() || next.is_expired {
                    break;
                }
            }
        });

        Self {
            rx,
            handle: Some(handle),
        }
    }

    pub fn current(&self) -> ResolvedExpiration {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolvedExpiration> {
        self.rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ExpirationCountdown {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::commerce::{value_tag, values_tag};
    use crate::testing::signed_invoice;

    const NOW: u64 = 1_700_000_100;

    #[test]
    fn countdown_labels() {
        assert_eq!(format_time_remaining(0), "Expired");
        assert_eq!(format_time_remaining(-5), "Expired");
        assert_eq!(format_time_remaining(59), "59s left");
        assert_eq!(format_time_remaining(125), "2m 5s left");
        assert_eq!(format_time_remaining(3600), "1h 0m 0s left");
        assert_eq!(format_time_remaining(3725), "1h 2m 5s left");
    }

    #[test]
    fn lightning_expiry_wins_over_tag() {
        let invoice = parse_bolt11(&signed_invoice(Some(1_000), 600, "x")).unwrap();
        let tags = vec![value_tag(EXPIRATION_TAG, "1700099999")];
        let resolved = resolve_expiration(tags.iter(), Some(&invoice), NOW);
        assert_eq!(resolved.source, ExpirySource::Lightning);
        assert_eq!(resolved.expires_at, Some(1_700_000_600));
        assert_eq!(resolved.remaining, Some(500));
        assert!(!resolved.is_expired);
    }

    #[test]
    fn tag_expiry_used_without_invoice() {
        let tags = vec![value_tag(EXPIRATION_TAG, "1700000050")];
        let resolved = resolve_expiration(tags.iter(), None, NOW);
        assert_eq!(resolved.source, ExpirySource::Nostr);
        assert_eq!(resolved.remaining, Some(0));
        assert!(resolved.is_expired);
        assert_eq!(resolved.label().as_deref(), Some("Expired"));
    }

    #[test]
    fn no_deadline_never_expires() {
        let tags: Vec<Tag> = vec![value_tag(EXPIRATION_TAG, "tomorrow")];
        let resolved = resolve_expiration(tags.iter(), None, u64::MAX);
        assert_eq!(resolved.source, ExpirySource::None);
        assert_eq!(resolved.remaining, None);
        assert!(!resolved.is_expired);
        assert_eq!(resolved.label(), None);
    }

    #[test]
    fn resolves_from_rumor_invoice() {
        use nostr_sdk::prelude::*;

        let bolt11 = signed_invoice(Some(5_000), 600, "x");
        let rumor = EventBuilder::new(Kind::from(16u16), "")
            .tag(values_tag("payment", vec!["lightning".into(), bolt11]))
            .build(Keys::generate().public_key());
        let resolved = expiration_of(&rumor, NOW);
        assert_eq!(resolved.source, ExpirySource::Lightning);
        assert_eq!(resolved.remaining, Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_stops_after_expiry() {
        let clock = Arc::new(AtomicU64::new(NOW));
        let tags = vec![value_tag(EXPIRATION_TAG, "1700000102")];
        let initial = resolve_expiration(tags.iter(), None, NOW);

        let ticking = clock.clone();
        let countdown =
            ExpirationCountdown::spawn_with_clock(initial, move || ticking.load(Ordering::SeqCst));
        let mut rx = countdown.subscribe();
        assert_eq!(countdown.current().remaining, Some(2));

        clock.store(NOW + 1, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().remaining, Some(1));

        clock.store(NOW + 2, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_expired);

        // Sender is dropped once the task exits.
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test]
    async fn no_task_without_deadline() {
        let countdown = ExpirationCountdown::spawn(ResolvedExpiration::NEVER);
        assert!(!countdown.is_running());
        assert_eq!(countdown.current().source, ExpirySource::None);
    }
}
