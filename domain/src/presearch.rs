//! Pre-search phase records and the wait predicate

use crate::round::entities::RoundNumber;
use serde::{Deserialize, Serialize};

/// Status of a round's pre-search phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreSearchStatus {
    Pending,
    Streaming,
    Complete,
    Failed,
}

impl PreSearchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PreSearchStatus::Complete | PreSearchStatus::Failed)
    }
}

/// Record of a round's pre-search phase
///
/// Created at most once per round when web search is enabled. Absence of a
/// record for the current round means "not yet visible", never "skipped".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreSearchRecord {
    pub round: RoundNumber,
    pub status: PreSearchStatus,
    pub result: Option<String>,
}

impl PreSearchRecord {
    pub fn pending(round: RoundNumber) -> Self {
        Self {
            round,
            status: PreSearchStatus::Pending,
            result: None,
        }
    }

    pub fn streaming(round: RoundNumber) -> Self {
        Self {
            round,
            status: PreSearchStatus::Streaming,
            result: None,
        }
    }

    pub fn complete(round: RoundNumber, result: impl Into<String>) -> Self {
        Self {
            round,
            status: PreSearchStatus::Complete,
            result: Some(result.into()),
        }
    }

    pub fn failed(round: RoundNumber) -> Self {
        Self {
            round,
            status: PreSearchStatus::Failed,
            result: None,
        }
    }
}

/// Whether participant streaming must keep waiting on the pre-search phase.
///
/// Pure and side-effect-free; identical inputs always produce identical
/// outputs (no hidden memoization that could desync from record state).
/// A missing record blocks optimistically: the record may exist server-side
/// without being visible to the caller yet, so absence is never proof of
/// completion. Terminal records stop the wait; a `Failed` one is surfaced
/// by the lifecycle controller rather than waited on.
pub fn should_wait_for_pre_search(
    web_search_enabled: bool,
    records: &[PreSearchRecord],
    round: RoundNumber,
) -> bool {
    if !web_search_enabled {
        return false;
    }
    match records.iter().find(|record| record.round == round) {
        None => true,
        Some(record) => !record.status.is_terminal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_waits() {
        assert!(!should_wait_for_pre_search(
            false,
            &[],
            RoundNumber::ZERO
        ));
        let records = [PreSearchRecord::streaming(RoundNumber::ZERO)];
        assert!(!should_wait_for_pre_search(false, &records, RoundNumber::ZERO));
    }

    #[test]
    fn test_no_record_blocks_optimistically() {
        assert!(should_wait_for_pre_search(true, &[], RoundNumber::ZERO));
        assert!(should_wait_for_pre_search(true, &[], RoundNumber::new(7)));
    }

    #[test]
    fn test_pending_and_streaming_block() {
        let pending = [PreSearchRecord::pending(RoundNumber::ZERO)];
        assert!(should_wait_for_pre_search(true, &pending, RoundNumber::ZERO));

        let streaming = [PreSearchRecord::streaming(RoundNumber::ZERO)];
        assert!(should_wait_for_pre_search(true, &streaming, RoundNumber::ZERO));
    }

    #[test]
    fn test_complete_for_exact_round_unblocks() {
        let records = [PreSearchRecord::complete(RoundNumber::ZERO, "results")];
        assert!(!should_wait_for_pre_search(true, &records, RoundNumber::ZERO));
    }

    #[test]
    fn test_round_mismatch_still_blocks() {
        // A completed record for round 0 says nothing about round 1.
        let records = [PreSearchRecord::complete(RoundNumber::ZERO, "results")];
        assert!(should_wait_for_pre_search(true, &records, RoundNumber::new(1)));
    }

    #[test]
    fn test_failed_is_terminal() {
        let records = [PreSearchRecord::failed(RoundNumber::ZERO)];
        assert!(!should_wait_for_pre_search(true, &records, RoundNumber::ZERO));
    }
}
