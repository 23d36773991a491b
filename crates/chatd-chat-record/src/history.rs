use chatd_core::Role;
use chrono::{DateTime, Utc};

/// One entry of `chat_history` (spec.md §4.2): either a regular role
/// message or a compressed summary stub (`is_compressed=true`,
/// `role=assistant`).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub is_compressed: bool,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn regular(role: Role, content: String, created_at: DateTime<Utc>) -> Self {
        Self {
            role,
            content,
            is_compressed: false,
            created_at,
        }
    }

    pub fn summary(content: String, created_at: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            is_compressed: true,
            created_at,
        }
    }
}

/// Approximate token estimator: `chars / 4` summed over every entry's
/// content (SPEC_FULL §4.2, grounded on
/// `original_source/chat_record/compression.py`'s
/// `estimate_tokens_from_messages`). Monotonic in character volume, as
/// spec.md §4.2.4 requires of any estimator.
pub fn estimate_tokens(history: &[HistoryEntry]) -> u64 {
    let chars: usize = history.iter().map(|e| e.content.chars().count()).sum();
    (chars / 4) as u64
}

/// Merge adjacent entries sharing the same role (spec.md §4.2.1 step 4),
/// joining contents with `"\n"` and keeping the last entry's timestamp.
/// `is_compressed` entries are never merge candidates — with their
/// neighbors or each other — since a compressed summary stub is always
/// its own entry (SPEC_FULL §4.2: "only adjacent non-`is_compressed`
/// entries of the same role are merge candidates").
pub fn merge_consecutive(history: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut out: Vec<HistoryEntry> = Vec::with_capacity(history.len());
    for entry in history {
        if entry.is_compressed {
            out.push(entry);
            continue;
        }
        if let Some(last) = out.last_mut() {
            if !last.is_compressed && last.role == entry.role {
                last.content.push('\n');
                last.content.push_str(&entry.content);
                last.created_at = entry.created_at;
                continue;
            }
        }
        out.push(entry);
    }
    out
}

/// Index of the first user message in the last `keep_last_rounds`
/// complete rounds (spec.md §4.2.4 step 1), or `None` if the compression
/// predicate can't be satisfied: too few entries, the tail isn't a
/// completed assistant turn, or the trailing `2*keep_last_rounds` entries
/// don't alternate `user, assistant, user, assistant, ...`.
pub fn find_keep_start_index(history: &[HistoryEntry], keep_last_rounds: u64) -> Option<usize> {
    let keep_last_rounds = keep_last_rounds.max(1) as usize;
    let need = 2 * keep_last_rounds;
    let n = history.len();
    if n < need {
        return None;
    }
    if history[n - 1].role != Role::Assistant {
        return None;
    }
    let start = n - need;
    for (i, entry) in history[start..].iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        if entry.role != expected {
            return None;
        }
    }
    Some(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(role: Role, content: &str) -> HistoryEntry {
        HistoryEntry::regular(role, content.to_string(), Utc::now())
    }

    #[test]
    fn merges_adjacent_same_role() {
        let history = vec![
            entry(Role::User, "a"),
            entry(Role::User, "b"),
            entry(Role::Assistant, "c"),
        ];
        let merged = merge_consecutive(history);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "a\nb");
        assert_eq!(merged[1].content, "c");
    }

    #[test]
    fn summary_entries_never_merge() {
        let history = vec![
            HistoryEntry::summary("s1".into(), Utc::now()),
            entry(Role::Assistant, "real reply"),
        ];
        let merged = merge_consecutive(history);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].is_compressed);
        assert!(!merged[1].is_compressed);
    }

    #[test]
    fn keep_start_requires_completed_round() {
        let history = vec![entry(Role::User, "a"), entry(Role::Assistant, "b"), entry(Role::User, "c")];
        assert_eq!(find_keep_start_index(&history, 1), None);
    }

    #[test]
    fn keep_start_finds_last_round() {
        let history = vec![
            entry(Role::User, "a"),
            entry(Role::Assistant, "b"),
            entry(Role::User, "c"),
            entry(Role::Assistant, "d"),
        ];
        assert_eq!(find_keep_start_index(&history, 1), Some(2));
        assert_eq!(find_keep_start_index(&history, 2), Some(0));
    }

    #[test]
    fn keep_start_rejects_non_alternating_tail() {
        let history = vec![
            entry(Role::User, "a"),
            entry(Role::Assistant, "b"),
            entry(Role::Assistant, "c"),
        ];
        assert_eq!(find_keep_start_index(&history, 1), None);
    }
}
