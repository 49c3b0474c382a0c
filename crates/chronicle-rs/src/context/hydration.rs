//! Hydration: turning compact state back into a prompt.
//!
//! Both shapes open with a single system message carrying the memory block:
//!
//! - **Strict**: memory + the new message. Raw history is dropped.
//! - **Hybrid**: memory + the last few raw messages + the new message.
//!
//! The memory block is a fixed template over the summary and a pretty JSON
//! dump of the fact ledger, optionally preceded by custom instructions.

use crate::Message;
use crate::store::FactLedger;

/// Raw messages kept verbatim by hybrid hydration.
pub const DEFAULT_RECENT_WINDOW: usize = 5;

/// Which hydration shape to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationMode {
    /// Memory block plus the new message. Used for bloated histories.
    Strict,
    /// Memory block, recent raw messages, then the new message.
    Hybrid,
}

impl HydrationMode {
    /// Strict for bloated histories, hybrid otherwise.
    pub fn for_bloat(bloat_detected: bool) -> Self {
        if bloat_detected {
            Self::Strict
        } else {
            Self::Hybrid
        }
    }
}

/// Render the memory block for the system message.
pub fn render_memory(
    summary: &str,
    fact_ledger: &FactLedger,
    custom_instructions: Option<&str>,
) -> String {
    let facts = serde_json::to_string_pretty(fact_ledger).unwrap_or_else(|_| "{}".into());
    let memory = format!("[MEMORY RECALL]\nSummary: {summary}\n\n[FACT LEDGER]\n{facts}");
    match custom_instructions {
        Some(custom) if !custom.is_empty() => format!("{custom}\n\n{memory}"),
        _ => memory,
    }
}

/// The last `k` messages of `history`, in order. All of it when shorter.
pub fn recent_window(history: &[Message], k: usize) -> &[Message] {
    &history[history.len().saturating_sub(k)..]
}

/// Build a hydrated prompt.
///
/// `window` only matters in [`HydrationMode::Hybrid`].
pub fn hydrate(
    mode: HydrationMode,
    memory: &str,
    raw_history: &[Message],
    new_message: &Message,
    window: usize,
) -> Vec<Message> {
    let recent = match mode {
        HydrationMode::Strict => &[][..],
        HydrationMode::Hybrid => recent_window(raw_history, window),
    };

    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(Message::system(memory));
    messages.extend_from_slice(recent);
    messages.push(new_message.clone());
    messages
}

/// The do-nothing prompt: full history plus the new message.
pub fn naive(raw_history: &[Message], new_message: &Message) -> Vec<Message> {
    let mut messages = Vec::with_capacity(raw_history.len() + 1);
    messages.extend_from_slice(raw_history);
    messages.push(new_message.clone());
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageRole;

    fn history(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("msg {i}"))).collect()
    }

    #[test]
    fn memory_block_template() {
        let mut ledger = FactLedger::new();
        ledger.insert("name".into(), "Ada".into());
        let memory = render_memory("User is Ada.", &ledger, None);
        assert_eq!(
            memory,
            "[MEMORY RECALL]\nSummary: User is Ada.\n\n[FACT LEDGER]\n{\n  \"name\": \"Ada\"\n}"
        );
    }

    #[test]
    fn custom_instructions_precede_memory() {
        let memory = render_memory("", &FactLedger::new(), Some("Be brief."));
        assert!(memory.starts_with("Be brief.\n\n[MEMORY RECALL]"));
        assert!(memory.ends_with("[FACT LEDGER]\n{}"));
    }

    #[test]
    fn empty_custom_instructions_are_ignored() {
        let memory = render_memory("", &FactLedger::new(), Some(""));
        assert!(memory.starts_with("[MEMORY RECALL]"));
    }

    #[test]
    fn window_keeps_everything_when_short() {
        let h = history(3);
        assert_eq!(recent_window(&h, 5), &h[..]);
        assert_eq!(recent_window(&[], 5).len(), 0);
    }

    #[test]
    fn window_keeps_last_k_in_order() {
        let h = history(8);
        let recent = recent_window(&h, 5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "msg 3");
        assert_eq!(recent[4].content, "msg 7");
    }

    #[test]
    fn strict_drops_history() {
        let h = history(4);
        let new = Message::user("now");
        let out = hydrate(HydrationMode::Strict, "MEM", &h, &new, 5);
        assert_eq!(out, vec![Message::system("MEM"), new]);
    }

    #[test]
    fn hybrid_keeps_recent_window() {
        let h = history(7);
        let new = Message::user("now");
        let out = hydrate(HydrationMode::Hybrid, "MEM", &h, &new, 5);
        assert_eq!(out.len(), 7);
        assert_eq!(out[0].role, MessageRole::System);
        assert_eq!(out[1].content, "msg 2");
        assert_eq!(out[5].content, "msg 6");
        assert_eq!(out[6], new);
    }

    #[test]
    fn naive_is_history_plus_new() {
        let h = history(2);
        let out = naive(&h, &Message::user("now"));
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].content, "now");
    }

    #[test]
    fn mode_follows_bloat() {
        assert_eq!(HydrationMode::for_bloat(true), HydrationMode::Strict);
        assert_eq!(HydrationMode::for_bloat(false), HydrationMode::Hybrid);
    }
}
