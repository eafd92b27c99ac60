//! Greeting rotation for freshly opened conversations.
//!
//! Each session walks the list in order without repeats. Once every greeting
//! has been used the cycle restarts, skipping the one sent last when there is
//! another to choose from.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub const OPENING_MESSAGES: [&str; 6] = [
    "Hello there! It's great to connect with you. How can I help you today?",
    "Hi! I'm here and ready to chat. What's on your mind?",
    "Welcome! I'm looking forward to our conversation. What would you like to talk about?",
    "Hey! So glad to see you. Is there anything specific I can assist you with right now?",
    "Greetings! It's a pleasure to meet you. How can I make your day a little brighter?",
    "Good to see you! Let's explore your thoughts. What shall we begin with?",
];

#[derive(Debug, Default)]
struct SessionHistory {
    used: Vec<usize>,
    last: Option<usize>,
}

/// Per-session greeting picker. State lives in memory only and is lost on restart.
#[derive(Debug)]
pub struct OpeningRotation {
    messages: &'static [&'static str],
    sessions: Mutex<HashMap<String, SessionHistory>>,
}

impl Default for OpeningRotation {
    fn default() -> Self {
        Self::new(&OPENING_MESSAGES)
    }
}

impl OpeningRotation {
    pub fn new(messages: &'static [&'static str]) -> Self {
        Self {
            messages,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Next greeting for `session`. `None` only when the list is empty.
    pub fn next(&self, session: &str) -> Option<&'static str> {
        if self.messages.is_empty() {
            return None;
        }

        // The map holds plain bookkeeping; a panic elsewhere cannot leave it inconsistent.
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let history = sessions.entry(session.to_string()).or_default();

        let unused = (0..self.messages.len()).find(|index| !history.used.contains(index));
        let selected = match unused {
            Some(index) => index,
            None => {
                history.used.clear();
                (0..self.messages.len())
                    .find(|index| self.messages.len() == 1 || Some(*index) != history.last)
                    .unwrap_or(0)
            }
        };

        history.used.push(selected);
        history.last = Some(selected);
        Some(self.messages[selected])
    }

    /// Forget everything sent to `session`.
    pub fn clear(&self, session: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn first_greeting_comes_from_the_list() {
        let rotation = OpeningRotation::default();
        let greeting = rotation.next("s1").unwrap();
        assert_eq!(greeting, OPENING_MESSAGES[0]);
    }

    #[test]
    fn full_cycle_without_repeats() {
        let rotation = OpeningRotation::default();
        let seen: HashSet<&str> = (0..OPENING_MESSAGES.len()).map(|_| rotation.next("s1").unwrap()).collect();
        assert_eq!(seen.len(), OPENING_MESSAGES.len());
    }

    #[test]
    fn new_cycle_does_not_repeat_the_last_greeting() {
        let rotation = OpeningRotation::default();
        let mut last = "";
        for _ in 0..OPENING_MESSAGES.len() {
            last = rotation.next("s1").unwrap();
        }

        let restarted = rotation.next("s1").unwrap();
        assert_ne!(restarted, last);
        assert_eq!(restarted, OPENING_MESSAGES[0]);
        assert_eq!(rotation.next("s1").unwrap(), OPENING_MESSAGES[1]);
    }

    #[test]
    fn sessions_are_tracked_separately() {
        let rotation = OpeningRotation::default();
        assert_eq!(rotation.next("s1").unwrap(), OPENING_MESSAGES[0]);
        assert_eq!(rotation.next("s1").unwrap(), OPENING_MESSAGES[1]);
        assert_eq!(rotation.next("s2").unwrap(), OPENING_MESSAGES[0]);
    }

    #[test]
    fn clear_restarts_the_session() {
        let rotation = OpeningRotation::default();
        rotation.next("s1");
        rotation.next("s1");
        rotation.clear("s1");
        assert_eq!(rotation.next("s1").unwrap(), OPENING_MESSAGES[0]);
    }

    #[test]
    fn single_greeting_repeats() {
        static ONLY: [&str; 1] = ["The only message"];
        let rotation = OpeningRotation::new(&ONLY);
        for _ in 0..3 {
            assert_eq!(rotation.next("s1"), Some("The only message"));
        }
    }

    #[test]
    fn empty_list_yields_nothing() {
        static NONE: [&str; 0] = [];
        let rotation = OpeningRotation::new(&NONE);
        assert_eq!(rotation.next("s1"), None);
    }
}
