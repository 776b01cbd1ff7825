//! Bounded Turn History

use super::turn::{Role, Turn};

/// Ordered, oldest-first turn log for one conversation.
///
/// Holds at most `2 * window_size` turns. When an append overflows that
/// bound the oldest turns are evicted in pairs, and any non-user turn left
/// at the head is dropped as well, so a windowed history always opens on a
/// user turn.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    window_size: usize,
    turns: Vec<Turn>,
}

impl ConversationHistory {
    /// Create an empty history. A window size of zero is raised to one.
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            turns: Vec::new(),
        }
    }

    /// Number of user/assistant exchanges kept
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Maximum number of stored turns
    pub fn capacity(&self) -> usize {
        self.window_size * 2
    }

    /// Append a turn and enforce the window. Returns the number of evicted turns.
    pub fn push(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.enforce_window()
    }

    /// The window that would result from appending `turn`, without mutating
    pub fn window_with(&self, turn: &Turn) -> Vec<Turn> {
        let mut preview = self.clone();
        preview.push(turn.clone());
        preview.turns
    }

    /// Get all stored turns
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn enforce_window(&mut self) -> usize {
        let mut evicted = 0;

        while self.turns.len() > self.capacity() {
            let pair = self.turns.len().min(2);
            self.turns.drain(..pair);
            evicted += pair;
        }

        if evicted > 0 {
            while self
                .turns
                .first()
                .is_some_and(|turn| turn.role() != Role::User)
            {
                self.turns.remove(0);
                evicted += 1;
            }
        }

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(history: &mut ConversationHistory, i: usize) {
        history.push(Turn::user(format!("Message {}", i)).unwrap());
        history.push(Turn::assistant(format!("Response {}", i)).unwrap());
    }

    #[test]
    fn test_history_basic() {
        let mut history = ConversationHistory::new(4);
        exchange(&mut history, 0);

        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].role(), Role::User);
        assert_eq!(history.turns()[1].role(), Role::Assistant);
    }

    #[test]
    fn test_oldest_pairs_evicted_first() {
        let mut history = ConversationHistory::new(3);
        for i in 0..5 {
            exchange(&mut history, i);
        }

        assert_eq!(history.len(), 6);
        assert_eq!(history.turns()[0].content(), "Message 2");
        assert_eq!(history.turns()[5].content(), "Response 4");
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut history = ConversationHistory::new(2);
        for i in 0..20 {
            history.push(Turn::user(format!("u{}", i)).unwrap());
            assert!(history.len() <= history.capacity());
            history.push(Turn::assistant(format!("a{}", i)).unwrap());
            assert!(history.len() <= history.capacity());
            assert_eq!(history.turns()[0].role(), Role::User);
        }
    }

    #[test]
    fn test_leading_assistant_dropped_after_windowing() {
        let mut history = ConversationHistory::new(1);
        history.push(Turn::user("q1").unwrap());
        history.push(Turn::assistant("a1").unwrap());
        history.push(Turn::assistant("a1 again").unwrap());
        history.push(Turn::user("q2").unwrap());

        assert_eq!(history.turns()[0].role(), Role::User);
        assert_eq!(history.turns()[0].content(), "q2");
    }

    #[test]
    fn test_window_with_does_not_mutate() {
        let mut history = ConversationHistory::new(1);
        exchange(&mut history, 0);

        let preview = history.window_with(&Turn::user("next").unwrap());
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].content(), "next");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_zero_window_raised_to_one() {
        let history = ConversationHistory::new(0);
        assert_eq!(history.capacity(), 2);
    }
}
