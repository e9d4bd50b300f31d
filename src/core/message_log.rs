use crate::core::message::Turn;

/// Ordered turns of the active conversation.
///
/// Append-only, with one exception: the trailing provisional turn (the
/// in-flight assistant reply) may be extended, finalized, or discarded. At
/// most one turn is provisional and it is always the last one. Every
/// in-flight operation is a no-op that returns `false`/`None` when nothing is
/// in flight, so a rollback cannot fire twice.
#[derive(Debug, Default)]
pub struct MessageLog {
    turns: Vec<Turn>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn in_flight(&self) -> Option<&Turn> {
        self.turns.last().filter(|turn| turn.is_provisional())
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight().is_some()
    }

    /// Adds a turn at the end. Refused while another turn is in flight, since
    /// the provisional turn must stay last.
    pub fn append(&mut self, turn: Turn) -> bool {
        if self.has_in_flight() {
            return false;
        }
        self.turns.push(turn);
        true
    }

    fn in_flight_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut().filter(|turn| turn.is_provisional())
    }

    pub fn extend_last(&mut self, fragment: &str) -> bool {
        match self.in_flight_mut() {
            Some(turn) => {
                turn.push_fragment(fragment);
                true
            }
            None => false,
        }
    }

    /// Attaches cited source snippets to the in-flight turn.
    pub fn attach_context(&mut self, snippets: Vec<String>) -> bool {
        match self.in_flight_mut() {
            Some(turn) => {
                turn.set_context_snippets(snippets);
                true
            }
            None => false,
        }
    }

    pub fn finalize(&mut self) -> bool {
        match self.in_flight_mut() {
            Some(turn) => {
                turn.mark_final();
                true
            }
            None => false,
        }
    }

    /// Removes the in-flight turn entirely, returning what it held.
    pub fn discard_last(&mut self) -> Option<Turn> {
        if self.has_in_flight() {
            self.turns.pop()
        } else {
            None
        }
    }

    /// Swaps in a freshly loaded history. Loaded turns are always final.
    pub fn replace_all(&mut self, turns: Vec<Turn>) {
        self.turns = turns
            .into_iter()
            .map(|mut turn| {
                turn.mark_final();
                turn
            })
            .collect();
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::TurnState;

    fn log_with_placeholder() -> MessageLog {
        let mut log = MessageLog::new();
        assert!(log.append(Turn::user("question")));
        assert!(log.append(Turn::placeholder()));
        log
    }

    #[test]
    fn extend_last_grows_only_the_placeholder() {
        let mut log = log_with_placeholder();
        assert!(log.extend_last("Hel"));
        assert!(log.extend_last("lo"));
        assert_eq!(log.turns()[0].content(), "question");
        assert_eq!(log.last().unwrap().content(), "Hello");
    }

    #[test]
    fn finalize_keeps_content_and_freezes_turn() {
        let mut log = log_with_placeholder();
        log.extend_last("done");
        assert!(log.finalize());
        let last = log.last().unwrap();
        assert_eq!(last.content(), "done");
        assert_eq!(last.state(), TurnState::Final);

        assert!(!log.extend_last(" more"));
        assert_eq!(log.last().unwrap().content(), "done");
    }

    #[test]
    fn discard_last_removes_partial_reply_once() {
        let mut log = log_with_placeholder();
        log.extend_last("Partial");
        let discarded = log.discard_last().expect("placeholder removed");
        assert_eq!(discarded.content(), "Partial");
        assert_eq!(log.len(), 1);

        assert!(log.discard_last().is_none());
        assert_eq!(log.len(), 1);
        assert!(log.last().unwrap().is_user());
    }

    #[test]
    fn operations_without_in_flight_turn_are_noops() {
        let mut log = MessageLog::new();
        log.append(Turn::user("hi"));
        assert!(!log.extend_last("x"));
        assert!(!log.finalize());
        assert!(!log.attach_context(vec!["s".into()]));
        assert!(log.discard_last().is_none());
        assert_eq!(log.last().unwrap().content(), "hi");
    }

    #[test]
    fn append_is_refused_while_a_turn_is_in_flight() {
        let mut log = log_with_placeholder();
        assert!(!log.append(Turn::user("second")));
        assert_eq!(log.len(), 2);
        assert!(log.last().unwrap().is_provisional());
    }

    #[test]
    fn replace_all_discards_previous_turns() {
        let mut log = log_with_placeholder();
        let mut stray = Turn::placeholder();
        stray.push_fragment("stray");
        log.replace_all(vec![Turn::user("old q"), Turn::assistant("old a"), stray]);
        assert_eq!(log.len(), 3);
        assert!(!log.has_in_flight());
        assert_eq!(log.turns()[0].content(), "old q");
    }

    #[test]
    fn attach_context_sets_snippets_on_placeholder() {
        let mut log = log_with_placeholder();
        assert!(log.attach_context(vec!["snippet one".into()]));
        log.finalize();
        assert_eq!(log.last().unwrap().context_snippets(), ["snippet one"]);
    }
}
