//! NIP-65 relay list handling for choosing where to publish.

use nostr_sdk::prelude::*;

/// Filter for the newest kind 10002 relay list of `author`.
pub fn build_relay_list_filter(author: &PublicKey) -> Filter {
    Filter::new().kind(Kind::RelayList).author(*author).limit(1)
}

/// Relays `event` marks as read or leaves unmarked.
///
/// Write-only entries are skipped since the owner does not read from them.
pub fn parse_relay_list(event: &Event) -> Vec<String> {
    let mut relays = Vec::new();
    for tag in event.tags.iter() {
        let url = match tag.as_slice() {
            [name, url] if name == "r" => url,
            [name, url, marker, ..] if name == "r" && marker != "write" => url,
            _ => continue,
        };
        match RelayUrl::parse(url) {
            Ok(url) => relays.push(url.to_string()),
            Err(e) => log::warn!("skipping invalid relay url {url}: {e}"),
        }
    }
    dedup(relays)
}

/// Merchant relays first, then the active pool, without duplicates.
pub fn select_publish_relays(merchant_relays: &[String], pool: &[String]) -> Vec<String> {
    dedup(merchant_relays.iter().chain(pool).cloned().collect())
}

fn dedup(relays: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    relays
        .into_iter()
        .filter(|url| seen.insert(url.trim_end_matches('/').to_string()))
        .collect()
}
