use chatd_core::Role;

use crate::history::HistoryEntry;

/// One entry of the context projection fed to the LLM node (spec.md §4.2.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtxEntry {
    pub role: Role,
    pub content: String,
}

/// Project `chat_history` into the message list an LLM call expects
/// (spec.md §4.2.3). Computed on demand rather than maintained
/// incrementally — SPEC_FULL §4.2 treats this as a cached derived view of
/// `chat_history`, a pure function of it, which is observably identical to
/// a separately-mutated list and avoids the two copies drifting.
///
/// `system_prompt`/`user_prompt` are already-rendered strings (template
/// rendering happens one layer up, against the merged agent config).
pub fn project_context(
    history: &[HistoryEntry],
    system_prompt: Option<&str>,
    user_prompt: Option<&str>,
) -> Vec<CtxEntry> {
    // Step 1: drop a trailing user entry — it is re-appended explicitly
    // as the current turn by the caller via `user_prompt`.
    let mut entries = history;
    if let Some(last) = entries.last() {
        if last.role == Role::User && !last.is_compressed {
            entries = &entries[..entries.len() - 1];
        }
    }

    // Step 2: partition into compressed summary stubs and normal messages.
    let mut compressed_parts = Vec::new();
    let mut normal_messages = Vec::new();
    for entry in entries {
        if entry.is_compressed {
            compressed_parts.push(entry.content.as_str());
        } else {
            normal_messages.push(CtxEntry {
                role: entry.role,
                content: entry.content.clone(),
            });
        }
    }

    let mut result = Vec::with_capacity(normal_messages.len() + 2);

    // Step 3: leading system message, if any.
    if let Some(system_prompt) = system_prompt.filter(|s| !s.is_empty()) {
        let mut content = system_prompt.to_string();
        if !compressed_parts.is_empty() {
            content.push_str("\n\n## Historical summary\n");
            content.push_str(&compressed_parts.join("\n\n"));
        }
        result.push(CtxEntry {
            role: Role::System,
            content,
        });
    }

    // Step 4: normal messages in order.
    result.extend(normal_messages);

    // Step 5: trailing explicit current user turn.
    if let Some(user_prompt) = user_prompt.filter(|s| !s.is_empty()) {
        result.push(CtxEntry {
            role: Role::User,
            content: user_prompt.to_string(),
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(role: Role, content: &str) -> HistoryEntry {
        HistoryEntry::regular(role, content.to_string(), Utc::now())
    }

    #[test]
    fn leading_system_trailing_user() {
        let history = vec![entry(Role::User, "hi"), entry(Role::Assistant, "hello")];
        let ctx = project_context(&history, Some("be nice"), Some("current turn"));
        assert_eq!(ctx.first().unwrap().role, Role::System);
        assert_eq!(ctx.last().unwrap().role, Role::User);
        assert_eq!(ctx.last().unwrap().content, "current turn");
    }

    #[test]
    fn drops_trailing_user_entry() {
        let history = vec![entry(Role::Assistant, "hello"), entry(Role::User, "dangling")];
        let ctx = project_context(&history, None, None);
        assert!(ctx.iter().all(|e| e.content != "dangling"));
    }

    #[test]
    fn summary_section_omitted_when_no_compressed_parts() {
        let history = vec![entry(Role::Assistant, "hello")];
        let ctx = project_context(&history, Some("sys"), None);
        assert_eq!(ctx[0].content, "sys");
    }

    #[test]
    fn summary_section_present_when_compressed_parts_exist() {
        let history = vec![
            HistoryEntry::summary("earlier stuff".into(), Utc::now()),
            entry(Role::User, "hi"),
            entry(Role::Assistant, "hello"),
        ];
        let ctx = project_context(&history, Some("sys"), None);
        assert!(ctx[0].content.contains("## Historical summary"));
        assert!(ctx[0].content.contains("earlier stuff"));
    }
}
