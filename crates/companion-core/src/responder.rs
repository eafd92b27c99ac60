use rand::Rng;
use rand::seq::IndexedRandom;

pub const SUPPORTIVE_REPLY: &str =
    "I'm always here for you. Tell me more about how you're feeling, I want to understand.";
pub const PLAYFUL_REPLY: &str =
    "Ooh, you always know how to keep things interesting! So what trouble are we getting into next?";
pub const INTELLECTUAL_REPLY: &str =
    "That's a fascinating thought. What led you to see it that way? I'd love to dig deeper with you.";
pub const ADMIRER_REPLY: &str =
    "You never stop impressing me. I really admire the way you think about things.";
pub const GROWTH_REPLY: &str =
    "I love seeing you push yourself. What's one small step you could take toward that today?";
pub const FALLBACK_REPLY: &str = "I'm so glad you're talking to me. Tell me more!";

/// Only this many of the most important memories are candidates for a reference.
pub const REFERENCE_POOL: usize = 5;
/// A reference is appended when the uniform roll exceeds this.
pub const REFERENCE_THRESHOLD: f64 = 0.7;
pub const EXCERPT_CHARS: usize = 30;

/// Canned reply for a personality `type` label. Exact match only.
pub fn base_reply(kind: &str) -> &'static str {
    match kind {
        "supportive" => SUPPORTIVE_REPLY,
        "playful" => PLAYFUL_REPLY,
        "intellectual" => INTELLECTUAL_REPLY,
        "admirer" => ADMIRER_REPLY,
        "growth" => GROWTH_REPLY,
        _ => FALLBACK_REPLY,
    }
}

pub fn should_reference(roll: f64) -> bool {
    roll > REFERENCE_THRESHOLD
}

/// First `EXCERPT_CHARS` characters of `text`, with "..." when something was cut.
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn memory_reference(text: &str) -> String {
    format!(
        " By the way, I still remember when you told me \"<span class=\"memory-reference\">{}</span>\".",
        excerpt(text)
    )
}

/// Uniform pick among the leading `REFERENCE_POOL` entries. `ranked` must
/// already be ordered by importance, then recency.
pub fn pick_memory<'a, R: Rng + ?Sized>(rng: &mut R, ranked: &[&'a str]) -> Option<&'a str> {
    let pool = &ranked[..ranked.len().min(REFERENCE_POOL)];
    pool.choose(rng).copied()
}

/// Build the AI reply for one chat turn.
pub fn compose_reply<R: Rng + ?Sized>(rng: &mut R, kind: &str, ranked_memories: &[&str]) -> String {
    let mut reply = base_reply(kind).to_string();

    if ranked_memories.is_empty() {
        return reply;
    }

    let roll: f64 = rng.random();
    if should_reference(roll) {
        if let Some(memory) = pick_memory(rng, ranked_memories) {
            reply.push_str(&memory_reference(memory));
        }
    }

    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    /// Always yields zero, so every roll is 0.0.
    struct Zeroes;

    impl RngCore for Zeroes {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(0);
        }
    }

    #[test]
    fn known_types_map_to_fixed_templates() {
        assert_eq!(base_reply("supportive"), SUPPORTIVE_REPLY);
        assert_eq!(base_reply("playful"), PLAYFUL_REPLY);
        assert_eq!(base_reply("intellectual"), INTELLECTUAL_REPLY);
        assert_eq!(base_reply("admirer"), ADMIRER_REPLY);
        assert_eq!(base_reply("growth"), GROWTH_REPLY);
    }

    #[test]
    fn unknown_or_differently_cased_type_falls_back() {
        assert_eq!(base_reply("mysterious"), FALLBACK_REPLY);
        assert_eq!(base_reply("Supportive"), FALLBACK_REPLY);
        assert_eq!(base_reply(""), FALLBACK_REPLY);
    }

    #[test]
    fn threshold_is_strict() {
        assert!(!should_reference(0.7));
        assert!(should_reference(0.700_001));
        assert!(!should_reference(0.0));
    }

    #[test]
    fn excerpt_truncates_long_text() {
        let text = "I grew up in a small town by the sea with three dogs";
        let cut = excerpt(text);
        assert_eq!(cut, "I grew up in a small town by t...");
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
    }

    #[test]
    fn excerpt_keeps_short_text() {
        let exactly_thirty = "a".repeat(EXCERPT_CHARS);
        assert_eq!(excerpt(&exactly_thirty), exactly_thirty);
        assert_eq!(excerpt("my cat is named Miso"), "my cat is named Miso");
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let text = "ü".repeat(40);
        assert_eq!(excerpt(&text), format!("{}...", "ü".repeat(30)));
    }

    #[test]
    fn reference_wraps_excerpt_in_highlight_span() {
        let sentence = memory_reference("I love hiking");
        assert!(sentence.starts_with(' '));
        assert!(sentence.contains("<span class=\"memory-reference\">I love hiking</span>"));
    }

    #[test]
    fn low_roll_never_references() {
        let reply = compose_reply(&mut Zeroes, "growth", &["I love hiking"]);
        assert_eq!(reply, GROWTH_REPLY);
    }

    #[test]
    fn no_memories_means_plain_template() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(compose_reply(&mut rng, "playful", &[]), PLAYFUL_REPLY);
        }
    }

    #[test]
    fn references_come_from_top_five_at_roughly_thirty_percent() {
        let memories = ["m0", "m1", "m2", "m3", "m4", "m5", "m6"];
        let mut rng = StdRng::seed_from_u64(42);
        let mut referenced = 0;

        for _ in 0..2000 {
            let reply = compose_reply(&mut rng, "admirer", &memories);
            assert!(reply.starts_with(ADMIRER_REPLY));
            if reply.len() > ADMIRER_REPLY.len() {
                referenced += 1;
                assert!(!reply.contains(">m5<") && !reply.contains(">m6<"), "{reply}");
            }
        }

        assert!((450..=750).contains(&referenced), "referenced {referenced} of 2000");
    }

    #[test]
    fn pick_memory_on_empty_slice() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_memory(&mut rng, &[]), None);
    }
}
