/// Command history: persisted entries plus a recall cursor for up/down navigation.
use crate::storage::{history_key, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Up,
    Down,
}

pub struct CommandHistory {
    entries: Vec<String>,
    // Always within 0..=entries.len(); `entries.len()` means "fresh input".
    cursor: usize,
    key: String,
    store: Box<dyn KeyValueStore>,
}

impl CommandHistory {
    /// Loads the history persisted for `storage_id`. Missing or corrupt data
    /// yields an empty history.
    pub fn load(store: Box<dyn KeyValueStore>, storage_id: &str) -> Self {
        let key = history_key(storage_id);
        let entries = match store.get(&key) {
            Some(raw) => parse_entries(&raw),
            None => Vec::new(),
        };
        Self {
            cursor: entries.len(),
            entries,
            key,
            store,
        }
    }

    /// Writes the history to the store. Failures are logged and otherwise ignored.
    pub fn save(&mut self) {
        let raw = match serde_json::to_string(&self.entries) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = %self.key, %err, "failed to encode command history");
                return;
            }
        };
        if let Err(err) = self.store.set(&self.key, raw) {
            tracing::warn!(key = %self.key, %err, "command history not persisted");
        }
    }

    /// Records a submitted command. Returns `false` for empty input.
    ///
    /// The new entry is compared against the entry just before the cursor, not
    /// against the last entry; the two differ after `delete_current`.
    pub fn append(&mut self, entry: &str) -> bool {
        if entry.is_empty() {
            return false;
        }
        let repeated = self
            .cursor
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .is_some_and(|prev| prev == entry);
        if !repeated {
            self.entries.push(entry.to_string());
            tracing::debug!(entries = self.entries.len(), "history entry added");
        }
        self.cursor = self.entries.len();
        self.save();
        true
    }

    /// Moves the cursor one step and returns the entry under it, or an empty
    /// string when the cursor is past the newest entry.
    pub fn navigate(&mut self, direction: HistoryDirection) -> String {
        self.cursor = match direction {
            HistoryDirection::Up => self.cursor.saturating_sub(1),
            HistoryDirection::Down => (self.cursor + 1).min(self.entries.len()),
        };
        self.current().to_string()
    }

    /// Removes the entry under the cursor if `input` is that entry, and returns
    /// the text to show afterwards. Returns `None` when nothing was removed.
    pub fn delete_current(&mut self, input: &str) -> Option<String> {
        match self.entries.get(self.cursor) {
            Some(entry) if entry == input => {}
            _ => return None,
        }
        self.entries.remove(self.cursor);
        self.cursor = self.cursor.saturating_sub(1);
        self.save();
        Some(self.current().to_string())
    }

    /// Entry under the cursor, empty when viewing fresh input.
    pub fn current(&self) -> &str {
        self.entries.get(self.cursor).map_or("", String::as_str)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.save();
    }
}

fn parse_entries(raw: &str) -> Vec<String> {
    // `null` is what an unset slot in the browser-era format decoded to.
    match serde_json::from_str::<Option<Vec<String>>>(raw) {
        Ok(entries) => entries.unwrap_or_default(),
        Err(err) => {
            tracing::warn!(%err, "ignoring corrupt command history");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Store handle shared between a history and the test that inspects it.
    #[derive(Clone, Default)]
    struct SharedStore(Rc<RefCell<MemoryStore>>);

    impl KeyValueStore for SharedStore {
        fn get(&self, key: &str) -> Option<String> {
            self.0.borrow().get(key)
        }

        fn set(&mut self, key: &str, value: String) -> Result<(), crate::storage::StoreError> {
            self.0.borrow_mut().set(key, value)
        }
    }

    fn empty() -> CommandHistory {
        CommandHistory::load(Box::new(MemoryStore::new()), "test")
    }

    fn with(entries: &[&str]) -> CommandHistory {
        let mut history = empty();
        for entry in entries {
            history.append(entry);
        }
        history
    }

    #[test]
    fn empty_entry_is_not_submitted() {
        let mut history = empty();
        assert!(!history.append(""));
        assert_eq!(history.size(), 0);
    }

    #[test]
    fn immediate_repeat_is_suppressed() {
        assert_eq!(with(&["a", "a"]).entries(), ["a"]);
        assert_eq!(with(&["a", "b", "a"]).entries(), ["a", "b", "a"]);
    }

    #[test]
    fn up_walks_back_and_clamps() {
        let mut history = with(&["a", "b", "c"]);
        assert_eq!(history.navigate(HistoryDirection::Up), "c");
        assert_eq!(history.navigate(HistoryDirection::Up), "b");
        assert_eq!(history.navigate(HistoryDirection::Up), "a");
        assert_eq!(history.navigate(HistoryDirection::Up), "a");
        assert_eq!(history.cursor, 0);
    }

    #[test]
    fn down_past_newest_returns_empty() {
        let mut history = with(&["a", "b"]);
        history.navigate(HistoryDirection::Up);
        assert_eq!(history.navigate(HistoryDirection::Down), "");
        assert_eq!(history.navigate(HistoryDirection::Down), "");
        assert_eq!(history.cursor, 2);
    }

    #[test]
    fn delete_requires_matching_input() {
        let mut history = with(&["a", "b"]);
        history.navigate(HistoryDirection::Up);
        assert_eq!(history.delete_current("a"), None);
        assert_eq!(history.size(), 2);
    }

    #[test]
    fn delete_removes_entry_and_steps_back() {
        let mut history = with(&["a", "b", "c"]);
        history.navigate(HistoryDirection::Up);
        history.navigate(HistoryDirection::Up);
        assert_eq!(history.delete_current("b").as_deref(), Some("a"));
        assert_eq!(history.entries(), ["a", "c"]);
        assert_eq!(history.cursor, 0);
    }

    #[test]
    fn delete_at_fresh_input_is_noop() {
        let mut history = with(&["a"]);
        assert_eq!(history.delete_current(""), None);
        assert_eq!(history.size(), 1);
    }

    #[test]
    fn repeat_check_uses_entry_before_cursor() {
        let mut history = with(&["a", "b", "c"]);
        history.navigate(HistoryDirection::Up);
        history.navigate(HistoryDirection::Up);
        history.delete_current("b");
        // Cursor is 0 now, so nothing precedes it and "c" is appended again.
        history.append("c");
        assert_eq!(history.entries(), ["a", "c", "c"]);
    }

    #[test]
    fn saved_history_reloads_in_order() {
        let store = SharedStore::default();
        let mut history = CommandHistory::load(Box::new(store.clone()), "game");
        for entry in ["help", "spawn slime", "help", "quit \"now\""] {
            history.append(entry);
        }
        let reloaded = CommandHistory::load(Box::new(store), "game");
        assert_eq!(reloaded.entries(), history.entries());
        assert_eq!(reloaded.cursor, reloaded.size());
    }

    #[test]
    fn corrupt_or_null_history_loads_empty() {
        for raw in ["{not json", "null", "42", "[1, 2]"] {
            let store = MemoryStore::new().with_value("x command history", raw);
            let history = CommandHistory::load(Box::new(store), "x");
            assert_eq!(history.size(), 0, "input {raw:?}");
        }
    }

    #[test]
    fn write_failures_are_swallowed() {
        let mut history = CommandHistory::load(Box::new(MemoryStore::read_only()), "x");
        assert!(history.append("help"));
        assert_eq!(history.entries(), ["help"]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Up,
        Down,
        Submit(u8),
        Delete,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Up),
            Just(Op::Down),
            (0u8..4).prop_map(Op::Submit),
            Just(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn cursor_stays_in_range(ops in proptest::collection::vec(op(), 0..64)) {
            let mut history = empty();
            let mut input = String::new();
            for op in ops {
                match op {
                    Op::Up => input = history.navigate(HistoryDirection::Up),
                    Op::Down => input = history.navigate(HistoryDirection::Down),
                    Op::Submit(n) => {
                        history.append(&format!("cmd{n}"));
                        input.clear();
                    }
                    Op::Delete => {
                        if let Some(next) = history.delete_current(&input) {
                            input = next;
                        }
                    }
                }
                prop_assert!(history.cursor <= history.size());
            }
        }
    }
}
