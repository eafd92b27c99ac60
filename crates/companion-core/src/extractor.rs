use tracing::debug;

use companion_types::models::MemoryPolicy;

/// Scanned in order; the first hit wins.
pub const MEMORY_KEYWORDS: [&str; 8] = [
    "favorite", "like", "love", "hate", "enjoy", "birthday", "name", "live",
];

pub const DEFAULT_IMPORTANCE: i64 = 3;

/// Messages longer than this many characters always trigger the heuristic rule.
pub const LONG_MESSAGE_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Possessive,
    FirstPerson,
    Length,
    Keyword(&'static str),
}

/// A memory that should be persisted for the message it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDraft {
    pub content: String,
    pub importance: i64,
    pub trigger: Trigger,
}

/// Decide whether `text` yields a memory. At most one draft per message.
pub fn extract(policy: MemoryPolicy, text: &str, importance: i64) -> Option<MemoryDraft> {
    let trigger = match policy {
        MemoryPolicy::Heuristic => heuristic_trigger(text),
        MemoryPolicy::Keywords => keyword_trigger(text),
    }?;

    debug!(?trigger, "memory trigger matched");
    Some(MemoryDraft {
        content: text.to_string(),
        importance,
        trigger,
    })
}

fn heuristic_trigger(text: &str) -> Option<Trigger> {
    // Plain substring checks: "my" matches inside "myth", "I" inside "It".
    if text.contains("my") {
        Some(Trigger::Possessive)
    } else if text.contains('I') {
        Some(Trigger::FirstPerson)
    } else if text.chars().count() > LONG_MESSAGE_CHARS {
        Some(Trigger::Length)
    } else {
        None
    }
}

fn keyword_trigger(text: &str) -> Option<Trigger> {
    let lowered = text.to_lowercase();
    MEMORY_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| lowered.contains(keyword))
        .map(Trigger::Keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_policy_single_match() {
        let draft = extract(MemoryPolicy::Keywords, "My birthday is in May", DEFAULT_IMPORTANCE)
            .unwrap();
        assert_eq!(draft.trigger, Trigger::Keyword("birthday"));
        assert_eq!(draft.content, "My birthday is in May");
        assert_eq!(draft.importance, 3);
    }

    #[test]
    fn keyword_policy_no_match() {
        assert!(extract(MemoryPolicy::Keywords, "good morning", DEFAULT_IMPORTANCE).is_none());
    }

    #[test]
    fn keyword_policy_first_listed_keyword_wins() {
        // "love" appears first in the text but "favorite" comes first in the list.
        let draft =
            extract(MemoryPolicy::Keywords, "I LOVE my favorite band", DEFAULT_IMPORTANCE).unwrap();
        assert_eq!(draft.trigger, Trigger::Keyword("favorite"));
    }

    #[test]
    fn keyword_policy_is_case_insensitive_substring() {
        let draft = extract(MemoryPolicy::Keywords, "Unlikely", 1).unwrap();
        assert_eq!(draft.trigger, Trigger::Keyword("like"));
        assert_eq!(draft.importance, 1);
    }

    #[test]
    fn heuristic_policy_triggers() {
        assert_eq!(
            extract(MemoryPolicy::Heuristic, "this is my dog", 3).unwrap().trigger,
            Trigger::Possessive
        );
        assert_eq!(
            extract(MemoryPolicy::Heuristic, "I ran today", 3).unwrap().trigger,
            Trigger::FirstPerson
        );
        let long = "the weather here has been grey and rainy all week long";
        assert!(long.chars().count() > LONG_MESSAGE_CHARS);
        assert_eq!(extract(MemoryPolicy::Heuristic, long, 3).unwrap().trigger, Trigger::Length);
    }

    #[test]
    fn heuristic_policy_is_case_sensitive() {
        assert!(extract(MemoryPolicy::Heuristic, "hello there", 3).is_none());
        assert!(extract(MemoryPolicy::Heuristic, "MY day, i guess", 3).is_none());
    }

    #[test]
    fn heuristic_length_counts_characters_not_bytes() {
        let fifty = "é".repeat(LONG_MESSAGE_CHARS);
        assert!(extract(MemoryPolicy::Heuristic, &fifty, 3).is_none());
    }
}
