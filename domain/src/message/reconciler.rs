//! Message reconciliation
//!
//! Merges locally-originated ("optimistic") and server-confirmed messages
//! into one ordered, deduplicated view. The pass is single and preserves
//! arrival order, except that user messages collapse into one slot per
//! round: the first claimant keeps the position and a later deterministic
//! message replaces the slot's content in place.

use crate::message::entities::{Message, MessageBody};
use crate::message::id::MessageId;
use crate::round::entities::RoundNumber;
use std::collections::{HashMap, HashSet};

/// Result of a reconciliation pass
///
/// `duplicate_deterministic` defends the invariant that only one
/// deterministic id can claim a round's user slot: it should stay empty
/// under correct id assignment, and callers log anything that lands there.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub messages: Vec<Message>,
    pub duplicate_deterministic: Vec<MessageId>,
}

impl ReconcileOutcome {
    pub fn has_anomalies(&self) -> bool {
        !self.duplicate_deterministic.is_empty()
    }
}

/// Reconcile a raw arrival-ordered message list into the visible view.
///
/// Invariants, under every arrival order:
/// - exactly one user message is visible per round, positioned where the
///   first claimant arrived, with deterministic content winning whenever
///   both representations are present;
/// - assistant/pre-search/moderator messages are deduplicated purely by id
///   equality (retries reuse the same deterministic id);
/// - replaying the output through this function is a fixpoint.
pub fn reconcile(input: &[Message]) -> ReconcileOutcome {
    let mut messages: Vec<Message> = Vec::with_capacity(input.len());
    let mut user_slots: HashMap<RoundNumber, usize> = HashMap::new();
    let mut seen_ids: HashSet<MessageId> = HashSet::new();
    let mut duplicate_deterministic: Vec<MessageId> = Vec::new();

    for message in input {
        if matches!(message.body, MessageBody::User { .. }) {
            match user_slots.get(&message.round) {
                None => {
                    user_slots.insert(message.round, messages.len());
                    messages.push(message.clone());
                }
                Some(&slot) => {
                    let current = &messages[slot];
                    match (current.id.is_deterministic(), message.id.is_deterministic()) {
                        // Confirmation arrived: replace in place, keep position.
                        (false, true) => messages[slot] = message.clone(),
                        // Slot already authoritative; a second deterministic
                        // id for the same slot is an anomaly unless it is a
                        // plain retry of the same id.
                        (true, true) => {
                            if current.id != message.id {
                                duplicate_deterministic.push(message.id.clone());
                            }
                        }
                        // Transient arrivals never displace the slot.
                        (_, false) => {}
                    }
                }
            }
            continue;
        }

        if seen_ids.insert(message.id.clone()) {
            messages.push(message.clone());
        }
    }

    ReconcileOutcome {
        messages,
        duplicate_deterministic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::thread::ThreadId;
    use crate::message::entities::FinishReason;

    fn thread() -> ThreadId {
        ThreadId::new("t")
    }

    fn user(round: u64, content: &str) -> Message {
        Message::user(thread(), RoundNumber::new(round), content)
    }

    fn optimistic(round: u64, content: &str) -> Message {
        Message::optimistic_user("1700000000", RoundNumber::new(round), content)
    }

    fn assistant(round: u64, index: usize, content: &str) -> Message {
        Message::assistant(
            thread(),
            RoundNumber::new(round),
            index,
            content,
            Some(FinishReason::Stop),
        )
    }

    fn visible_users(outcome: &ReconcileOutcome, round: u64) -> Vec<&Message> {
        outcome
            .messages
            .iter()
            .filter(|m| {
                matches!(m.body, MessageBody::User { .. }) && m.round == RoundNumber::new(round)
            })
            .collect()
    }

    #[test]
    fn test_transient_then_deterministic_replaces_in_place() {
        let outcome = reconcile(&[
            optimistic(0, "draft"),
            assistant(0, 0, "answer"),
            user(0, "persisted"),
        ]);
        let users = visible_users(&outcome, 0);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].content(), "persisted");
        assert!(users[0].id.is_deterministic());
        // Replacement kept the original slot position
        assert_eq!(outcome.messages[0].content(), "persisted");
    }

    #[test]
    fn test_deterministic_then_transient_drops_transient() {
        let outcome = reconcile(&[user(0, "persisted"), optimistic(0, "stale draft")]);
        let users = visible_users(&outcome, 0);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].content(), "persisted");
    }

    #[test]
    fn test_duplicate_transients_keep_first() {
        let outcome = reconcile(&[optimistic(0, "first"), optimistic(0, "second")]);
        let users = visible_users(&outcome, 0);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].content(), "first");
    }

    #[test]
    fn test_duplicate_deterministic_ids_deduplicated_silently() {
        let outcome = reconcile(&[user(0, "persisted"), user(0, "persisted")]);
        assert_eq!(visible_users(&outcome, 0).len(), 1);
        assert!(!outcome.has_anomalies());
    }

    #[test]
    fn test_conflicting_deterministic_ids_reported() {
        // Should not happen under correct id assignment; defend anyway.
        let mut other = user(0, "other");
        other.id = MessageId::parse("elsewhere_r0_user").unwrap();
        let outcome = reconcile(&[user(0, "persisted"), other]);
        assert_eq!(visible_users(&outcome, 0).len(), 1);
        assert_eq!(visible_users(&outcome, 0)[0].content(), "persisted");
        assert_eq!(outcome.duplicate_deterministic.len(), 1);
    }

    #[test]
    fn test_user_slots_are_per_round() {
        let outcome = reconcile(&[user(0, "round zero"), user(1, "round one")]);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(visible_users(&outcome, 0).len(), 1);
        assert_eq!(visible_users(&outcome, 1).len(), 1);
    }

    #[test]
    fn test_assistants_dedup_by_id_only() {
        let outcome = reconcile(&[
            assistant(0, 0, "first run"),
            assistant(0, 0, "retried with same id"),
            assistant(0, 1, "second participant"),
        ]);
        let assistants: Vec<_> = outcome
            .messages
            .iter()
            .filter(|m| matches!(m.body, MessageBody::Assistant { .. }))
            .collect();
        assert_eq!(assistants.len(), 2);
        // First arrival wins for an id; retries reuse the id
        assert_eq!(assistants[0].content(), "first run");
    }

    #[test]
    fn test_arrival_order_preserved_for_streamed_roles() {
        let pre = Message::pre_search(
            thread(),
            RoundNumber::ZERO,
            "results",
            Some(FinishReason::Stop),
        );
        let moderator = Message::moderator(
            thread(),
            RoundNumber::ZERO,
            "summary",
            Some(FinishReason::Stop),
        );
        let outcome = reconcile(&[
            user(0, "question"),
            pre.clone(),
            assistant(0, 0, "a"),
            moderator.clone(),
        ]);
        let ids: Vec<String> = outcome.messages.iter().map(|m| m.id.to_string()).collect();
        assert_eq!(ids, vec!["t_r0_user", "t_r0_presearch", "t_r0_p0", "t_r0_moderator"]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let raw = vec![
            optimistic(0, "draft"),
            user(0, "persisted"),
            assistant(0, 0, "a"),
            assistant(0, 0, "a-retry"),
            assistant(0, 1, "b"),
            optimistic(1, "next draft"),
        ];
        let once = reconcile(&raw);
        let twice = reconcile(&once.messages);
        assert_eq!(once.messages, twice.messages);

        // And replaying the raw input any number of times converges too
        let again = reconcile(&raw);
        assert_eq!(once.messages, again.messages);
    }
}
