//! Session list derivation.
//!
//! The store hands back session summaries in no particular order; this
//! module turns them into the card list the surface renders and picks
//! identifiers for newly created sessions.

use std::cmp::Ordering;

use bazhi_core::session::SessionSummary;
use chrono::DateTime;

use crate::events::SessionCard;

/// Orders summaries by creation time (oldest first) and appends the
/// synthetic new-session card, which always renders last.
pub fn derive_cards(summaries: &[SessionSummary]) -> Vec<SessionCard> {
    let mut sorted: Vec<SessionSummary> = summaries.to_vec();
    sorted.sort_by(|a, b| compare_created_at(&a.created_at, &b.created_at));

    let mut cards: Vec<SessionCard> = sorted.into_iter().map(SessionCard::Existing).collect();
    cards.push(SessionCard::NewSession);
    cards
}

fn compare_created_at(a: &str, b: &str) -> Ordering {
    match (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        // If parsing fails, fall back to string comparison
        _ => a.cmp(b),
    }
}

/// Picks the identifier for the next session: `chat<count + 1>`, probing
/// upward past any identifier a gap-riddled list already holds.
pub fn next_chat_id(summaries: &[SessionSummary]) -> String {
    let mut n = summaries.len() + 1;
    while summaries.iter().any(|s| s.chat_id == format!("chat{n}")) {
        n += 1;
    }
    format!("chat{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(chat_id: &str, created_at: &str) -> SessionSummary {
        SessionSummary {
            chat_id: chat_id.to_string(),
            has_messages: true,
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn first_session_is_chat1() {
        assert_eq!(next_chat_id(&[]), "chat1");
    }

    #[test]
    fn next_id_continues_the_sequence() {
        let existing = vec![
            summary("chat1", "2024-06-01T10:00:00Z"),
            summary("chat2", "2024-06-02T10:00:00Z"),
        ];
        assert_eq!(next_chat_id(&existing), "chat3");
    }

    #[test]
    fn next_id_probes_past_gaps() {
        // Two summaries give candidate chat3, which chat3 already claims.
        let existing = vec![
            summary("chat1", "2024-06-01T10:00:00Z"),
            summary("chat3", "2024-06-03T10:00:00Z"),
        ];
        assert_eq!(next_chat_id(&existing), "chat4");
    }

    #[test]
    fn cards_sort_oldest_first_with_new_session_last() {
        let unordered = vec![
            summary("chat2", "2024-06-02T10:00:00Z"),
            summary("chat1", "2024-06-01T10:00:00Z"),
            summary("chat3", "2024-06-03T10:00:00Z"),
        ];

        let cards = derive_cards(&unordered);
        assert_eq!(cards.len(), 4);
        let ids: Vec<&str> = cards
            .iter()
            .filter_map(|card| match card {
                SessionCard::Existing(s) => Some(s.chat_id.as_str()),
                SessionCard::NewSession => None,
            })
            .collect();
        assert_eq!(ids, vec!["chat1", "chat2", "chat3"]);
        assert_eq!(cards.last(), Some(&SessionCard::NewSession));
    }

    #[test]
    fn empty_list_still_offers_new_session() {
        assert_eq!(derive_cards(&[]), vec![SessionCard::NewSession]);
    }

    #[test]
    fn unparseable_timestamps_fall_back_to_string_order() {
        let unordered = vec![
            summary("chat2", "later"),
            summary("chat1", "earlier"),
        ];

        let cards = derive_cards(&unordered);
        let ids: Vec<&str> = cards
            .iter()
            .filter_map(|card| match card {
                SessionCard::Existing(s) => Some(s.chat_id.as_str()),
                SessionCard::NewSession => None,
            })
            .collect();
        assert_eq!(ids, vec!["chat1", "chat2"]);
    }
}
