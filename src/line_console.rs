/// LineConsole: engine-independent console core.
///
/// Owns the command history, the scrollback log and the single-line input, and
/// turns intercepted key presses into history navigation, completion and
/// command submission. Rendering and real keyboard events belong to the host.
use thiserror::Error;

use crate::command_history::{CommandHistory, HistoryDirection};
use crate::error_capture::ErrorCapture;
use crate::markup::RichText;
use crate::scrollback::{EntryContent, EntryHandle, EntryStyle, ScrollbackLog};
use crate::storage::KeyValueStore;

pub const DEFAULT_STORAGE_ID: &str = "simple-console";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("a command dispatcher is required unless the console is output-only")]
    MissingDispatcher,
}

/// Executes submitted commands. The log is passed so results can be written back.
pub trait CommandDispatcher {
    fn handle_command(&mut self, command: &str, log: &mut ScrollbackLog);
}

impl<F> CommandDispatcher for F
where
    F: FnMut(&str, &mut ScrollbackLog),
{
    fn handle_command(&mut self, command: &str, log: &mut ScrollbackLog) {
        self(command, log)
    }
}

/// Supplies completion candidates for partial input, best first.
pub trait AutocompleteProvider {
    fn complete(&self, partial: &str) -> Vec<String>;
}

impl<F> AutocompleteProvider for F
where
    F: Fn(&str) -> Vec<String>,
{
    fn complete(&self, partial: &str) -> Vec<String> {
        self(partial)
    }
}

/// Default provider: never suggests anything.
pub struct NoSuggestions;

impl AutocompleteProvider for NoSuggestions {
    fn complete(&self, _partial: &str) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// No input row; the console only shows output.
    pub output_only: bool,
    pub placeholder: String,
    pub storage_id: String,
    pub autofocus: bool,
    /// Log uncaught errors (panics) as error entries.
    pub capture_errors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            output_only: false,
            placeholder: String::new(),
            storage_id: DEFAULT_STORAGE_ID.to_string(),
            autofocus: false,
            capture_errors: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKey {
    Tab,
    Delete,
    Enter,
    ArrowUp,
    ArrowDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: ConsoleKey,
    pub shift: bool,
}

impl KeyPress {
    pub fn new(key: ConsoleKey) -> Self {
        Self { key, shift: false }
    }

    pub fn shifted(key: ConsoleKey) -> Self {
        Self { key, shift: true }
    }
}

/// Whether the host should suppress the key's native behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResponse {
    Handled,
    PassThrough,
}

/// Text of the input field and its caret, as a char index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLine {
    text: String,
    caret: usize,
}

impl InputLine {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    /// Replaces the text and moves the caret to the end.
    pub fn replace(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.caret = self.text.chars().count();
    }

    /// Mirrors an edit made by the host's text field.
    pub fn sync(&mut self, text: &str, caret: usize) {
        self.text = text.to_string();
        self.caret = caret.min(self.text.chars().count());
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub struct LineConsoleBuilder {
    config: ConsoleConfig,
    store: Box<dyn KeyValueStore>,
    dispatcher: Option<Box<dyn CommandDispatcher>>,
    autocomplete: Box<dyn AutocompleteProvider>,
}

impl LineConsoleBuilder {
    pub fn config(mut self, config: ConsoleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dispatcher(mut self, dispatcher: impl CommandDispatcher + 'static) -> Self {
        self.dispatcher = Some(Box::new(dispatcher));
        self
    }

    pub fn autocomplete(mut self, provider: impl AutocompleteProvider + 'static) -> Self {
        self.autocomplete = Box::new(provider);
        self
    }

    pub fn build(self) -> Result<LineConsole, ConfigError> {
        if self.dispatcher.is_none() && !self.config.output_only {
            return Err(ConfigError::MissingDispatcher);
        }
        Ok(self.finish())
    }

    fn finish(self) -> LineConsole {
        let history = CommandHistory::load(self.store, &self.config.storage_id);
        let errors = self.config.capture_errors.then(ErrorCapture::install);
        tracing::debug!(
            storage_id = %self.config.storage_id,
            history = history.size(),
            "line console created"
        );
        LineConsole {
            config: self.config,
            history,
            log: ScrollbackLog::new(),
            input: InputLine::default(),
            dispatcher: self.dispatcher,
            autocomplete: self.autocomplete,
            errors,
            enabled: false,
            is_open: false,
        }
    }
}

pub struct LineConsole {
    config: ConsoleConfig,
    history: CommandHistory,
    log: ScrollbackLog,
    input: InputLine,
    dispatcher: Option<Box<dyn CommandDispatcher>>,
    autocomplete: Box<dyn AutocompleteProvider>,
    errors: Option<ErrorCapture>,
    enabled: bool,
    is_open: bool,
}

impl LineConsole {
    pub fn builder(store: impl KeyValueStore + 'static) -> LineConsoleBuilder {
        LineConsoleBuilder {
            config: ConsoleConfig::default(),
            store: Box::new(store),
            dispatcher: None,
            autocomplete: Box::new(NoSuggestions),
        }
    }

    /// A console that only shows output. Needs no dispatcher.
    pub fn output_only(store: impl KeyValueStore + 'static, config: ConsoleConfig) -> LineConsole {
        Self::builder(store)
            .config(ConsoleConfig {
                output_only: true,
                ..config
            })
            .finish()
    }

    // --- Visibility ---

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn open(&mut self) {
        self.is_open = true;
        self.enabled = true;
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.enabled = false;
    }

    /// Flips visibility and key processing together. Returns the new state.
    pub fn toggle(&mut self) -> bool {
        if self.is_open {
            self.close();
        } else {
            self.open();
        }
        self.is_open
    }

    /// True while the console claims keyboard, mouse and wheel input.
    pub fn owns_input(&self) -> bool {
        self.is_open
    }

    /// Whether the input field must hold focus. Opening always focuses the
    /// input, whatever `autofocus` says.
    pub fn wants_focus(&self) -> bool {
        self.is_open && !self.config.output_only
    }

    /// Whether focus returns to the input after a command ran.
    pub fn refocus_after_command(&self) -> bool {
        self.config.autofocus && self.wants_focus()
    }

    // --- Input ---

    /// Dispatches an intercepted key. Only Tab, Shift+Delete, Enter and the
    /// vertical arrows are handled; everything else passes through.
    pub fn handle_key(&mut self, press: KeyPress) -> KeyResponse {
        if !self.enabled || self.config.output_only {
            return KeyResponse::PassThrough;
        }
        match press.key {
            ConsoleKey::Tab => self.complete(),
            ConsoleKey::Delete if press.shift => self.delete_history_entry(),
            ConsoleKey::Enter => {
                self.submit();
            }
            ConsoleKey::ArrowUp => self.recall(HistoryDirection::Up),
            ConsoleKey::ArrowDown => self.recall(HistoryDirection::Down),
            _ => return KeyResponse::PassThrough,
        }
        KeyResponse::Handled
    }

    /// Replaces the input with the first completion candidate, if any.
    pub fn complete(&mut self) {
        if self.input.is_empty() {
            return;
        }
        let candidates = self.autocomplete.complete(self.input.text());
        if let Some(first) = candidates.into_iter().next() {
            self.input.replace(first);
        }
    }

    /// Removes the recalled history entry if the input still shows it.
    pub fn delete_history_entry(&mut self) {
        if let Some(next) = self.history.delete_current(self.input.text()) {
            self.input.replace(next);
        }
    }

    /// Submits the input line. Returns `false` when there was nothing to submit.
    pub fn submit(&mut self) -> bool {
        if self.input.is_empty() {
            return false;
        }
        let command = std::mem::take(&mut self.input).text;
        self.history.append(&command);
        self.log.append(command.as_str(), Some(EntryStyle::Input));
        self.log.scroll_to_bottom();
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            dispatcher.handle_command(&command, &mut self.log);
        }
        true
    }

    fn recall(&mut self, direction: HistoryDirection) {
        let text = self.history.navigate(direction);
        self.input.replace(text);
    }

    pub fn input(&self) -> &InputLine {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputLine {
        &mut self.input
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn erase_history(&mut self) {
        self.history.clear();
    }

    // --- Output ---

    pub fn log(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.log.log(content)
    }

    pub fn warn(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.log.warn(content)
    }

    pub fn error(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.log.error(content)
    }

    pub fn info(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.log.info(content)
    }

    pub fn success(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.log.success(content)
    }

    pub fn log_rich(&mut self, rich: RichText) -> EntryHandle {
        self.log.append_rich(rich)
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }

    pub fn scrollback(&self) -> &ScrollbackLog {
        &self.log
    }

    pub fn scrollback_mut(&mut self) -> &mut ScrollbackLog {
        &mut self.log
    }

    /// Runs work deferred to the next display tick: captured errors are logged
    /// and a pending re-scroll is performed. Returns `true` if the view must
    /// move to the bottom.
    pub fn tick(&mut self) -> bool {
        if let Some(errors) = &self.errors {
            for message in errors.drain() {
                self.log.error(message);
            }
        }
        self.log.run_deferred_rescroll()
    }

    /// Records an error from outside the panic hook, e.g. an engine script error.
    pub fn report_uncaught(&mut self, message: impl Into<String>) {
        let message = message.into();
        match &self.errors {
            Some(errors) => errors.record(message),
            None => tracing::debug!(%message, "uncaught error not captured"),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording() -> (Rc<RefCell<Vec<String>>>, impl CommandDispatcher) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let dispatcher = move |command: &str, _: &mut ScrollbackLog| {
            sink.borrow_mut().push(command.to_string());
        };
        (seen, dispatcher)
    }

    fn open_console() -> LineConsole {
        let (_, dispatcher) = recording();
        let mut console = LineConsole::builder(MemoryStore::new())
            .dispatcher(dispatcher)
            .build()
            .unwrap();
        console.open();
        console
    }

    fn type_and_enter(console: &mut LineConsole, text: &str) {
        console.input_mut().replace(text);
        console.handle_key(KeyPress::new(ConsoleKey::Enter));
    }

    #[test]
    fn dispatcher_required_unless_output_only() {
        let err = LineConsole::builder(MemoryStore::new()).build().err();
        assert_eq!(err, Some(ConfigError::MissingDispatcher));

        let config = ConsoleConfig {
            output_only: true,
            ..ConsoleConfig::default()
        };
        assert!(LineConsole::builder(MemoryStore::new()).config(config).build().is_ok());
    }

    #[test]
    fn output_only_fallback_keeps_the_rest_of_the_config() {
        let config = ConsoleConfig {
            storage_id: "debug".into(),
            ..ConsoleConfig::default()
        };
        let mut console = LineConsole::output_only(MemoryStore::new(), config);
        assert!(console.config().output_only);
        assert_eq!(console.config().storage_id, "debug");
        console.open();
        console.input_mut().replace("help");
        assert_eq!(console.handle_key(KeyPress::new(ConsoleKey::Enter)), KeyResponse::PassThrough);
    }

    #[test]
    fn disabled_console_ignores_keys() {
        let mut console = open_console();
        console.close();
        console.input_mut().replace("help");
        assert_eq!(console.handle_key(KeyPress::new(ConsoleKey::Enter)), KeyResponse::PassThrough);
        assert_eq!(console.input().text(), "help");
        assert!(console.scrollback().is_empty());
    }

    #[test]
    fn output_only_console_ignores_keys() {
        let config = ConsoleConfig {
            output_only: true,
            ..ConsoleConfig::default()
        };
        let mut console = LineConsole::builder(MemoryStore::new()).config(config).build().unwrap();
        console.open();
        assert_eq!(console.handle_key(KeyPress::new(ConsoleKey::Tab)), KeyResponse::PassThrough);
    }

    #[test]
    fn unlisted_keys_pass_through() {
        let mut console = open_console();
        console.input_mut().replace("a");
        assert_eq!(console.handle_key(KeyPress::new(ConsoleKey::Delete)), KeyResponse::PassThrough);
        assert_eq!(console.input().text(), "a");
    }

    #[test]
    fn enter_submits_logs_and_dispatches() {
        let (seen, dispatcher) = recording();
        let mut console = LineConsole::builder(MemoryStore::new())
            .dispatcher(dispatcher)
            .build()
            .unwrap();
        console.open();

        type_and_enter(&mut console, "spawn slime");

        assert_eq!(*seen.borrow(), ["spawn slime"]);
        assert!(console.input().is_empty());
        assert_eq!(console.history().entries(), ["spawn slime"]);
        let entry = &console.scrollback().entries()[0];
        assert_eq!(entry.content, EntryContent::from("spawn slime"));
        assert_eq!(entry.style, Some(EntryStyle::Input));
        assert!(console.scrollback_mut().take_jump());
    }

    #[test]
    fn enter_on_empty_input_is_noop() {
        let (seen, dispatcher) = recording();
        let mut console = LineConsole::builder(MemoryStore::new())
            .dispatcher(dispatcher)
            .build()
            .unwrap();
        console.open();
        assert_eq!(console.handle_key(KeyPress::new(ConsoleKey::Enter)), KeyResponse::Handled);
        assert!(seen.borrow().is_empty());
        assert!(console.scrollback().is_empty());
    }

    #[test]
    fn dispatcher_can_write_results() {
        let mut console = LineConsole::builder(MemoryStore::new())
            .dispatcher(|command: &str, log: &mut ScrollbackLog| {
                log.success(format!("ran {command}"));
            })
            .build()
            .unwrap();
        console.open();
        type_and_enter(&mut console, "save");
        let last = console.scrollback().entries().last().cloned().unwrap();
        assert_eq!(last.content, EntryContent::from("ran save"));
        assert_eq!(last.style, Some(EntryStyle::Success));
    }

    #[test]
    fn arrows_recall_history_with_caret_at_end() {
        let mut console = open_console();
        for cmd in ["a", "b", "c"] {
            type_and_enter(&mut console, cmd);
        }
        let up = KeyPress::new(ConsoleKey::ArrowUp);
        let mut recalled = Vec::new();
        for _ in 0..4 {
            assert_eq!(console.handle_key(up), KeyResponse::Handled);
            recalled.push(console.input().text().to_string());
        }
        assert_eq!(recalled, ["c", "b", "a", "a"]);
        assert_eq!(console.input().caret(), 1);

        console.handle_key(KeyPress::new(ConsoleKey::ArrowDown));
        assert_eq!(console.input().text(), "b");
    }

    #[test]
    fn repeated_submissions_keep_one_entry() {
        let mut console = open_console();
        type_and_enter(&mut console, "a");
        type_and_enter(&mut console, "a");
        assert_eq!(console.history().entries(), ["a"]);
        type_and_enter(&mut console, "b");
        type_and_enter(&mut console, "a");
        assert_eq!(console.history().entries(), ["a", "b", "a"]);
    }

    #[test]
    fn tab_uses_first_candidate() {
        let mut console = LineConsole::builder(MemoryStore::new())
            .dispatcher(|_: &str, _: &mut ScrollbackLog| {})
            .autocomplete(|partial: &str| {
                ["help", "hello"]
                    .iter()
                    .filter(|c| c.starts_with(partial))
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
            })
            .build()
            .unwrap();
        console.open();

        assert_eq!(console.handle_key(KeyPress::new(ConsoleKey::Tab)), KeyResponse::Handled);
        assert!(console.input().is_empty());

        console.input_mut().replace("he");
        console.handle_key(KeyPress::new(ConsoleKey::Tab));
        assert_eq!(console.input().text(), "help");
        assert_eq!(console.input().caret(), 4);

        console.input_mut().replace("zz");
        console.handle_key(KeyPress::new(ConsoleKey::Tab));
        assert_eq!(console.input().text(), "zz");
    }

    #[test]
    fn shift_delete_removes_recalled_entry() {
        let mut console = open_console();
        for cmd in ["a", "b"] {
            type_and_enter(&mut console, cmd);
        }
        console.handle_key(KeyPress::new(ConsoleKey::ArrowUp));
        assert_eq!(console.handle_key(KeyPress::shifted(ConsoleKey::Delete)), KeyResponse::Handled);
        assert_eq!(console.history().entries(), ["a"]);
        assert_eq!(console.input().text(), "a");
    }

    #[test]
    fn shift_delete_with_edited_input_is_noop() {
        let mut console = open_console();
        type_and_enter(&mut console, "a");
        console.handle_key(KeyPress::new(ConsoleKey::ArrowUp));
        console.input_mut().sync("ab", 2);
        console.handle_key(KeyPress::shifted(ConsoleKey::Delete));
        assert_eq!(console.history().size(), 1);
        assert_eq!(console.input().text(), "ab");
    }

    #[test]
    fn toggle_flips_open_and_enabled_together() {
        let mut console = open_console();
        assert!(console.owns_input());
        assert!(!console.toggle());
        assert!(!console.is_enabled());
        assert!(!console.owns_input());
        assert!(console.toggle());
        assert!(console.is_enabled());
    }

    #[test]
    fn opening_wants_focus_without_autofocus() {
        let mut console = open_console();
        assert!(!console.config().autofocus);
        assert!(console.wants_focus());
        assert!(!console.refocus_after_command());
        console.toggle();
        assert!(!console.wants_focus());

        let config = ConsoleConfig {
            autofocus: true,
            ..ConsoleConfig::default()
        };
        let mut console = LineConsole::builder(MemoryStore::new())
            .config(config.clone())
            .dispatcher(|_: &str, _: &mut ScrollbackLog| {})
            .build()
            .unwrap();
        assert!(!console.refocus_after_command());
        console.toggle();
        assert!(console.refocus_after_command());

        let mut console = LineConsole::output_only(MemoryStore::new(), config);
        console.open();
        assert!(!console.wants_focus());
    }

    #[test]
    fn tick_logs_reported_errors() {
        let config = ConsoleConfig {
            capture_errors: true,
            ..ConsoleConfig::default()
        };
        let mut console = LineConsole::builder(MemoryStore::new())
            .config(config)
            .dispatcher(|_: &str, _: &mut ScrollbackLog| {})
            .build()
            .unwrap();
        console.report_uncaught("script error");
        console.tick();
        let last = console.scrollback().entries().last().cloned().unwrap();
        assert_eq!(last.content, EntryContent::from("script error"));
        assert_eq!(last.style, Some(EntryStyle::Error));
    }

    #[test]
    fn history_survives_a_new_console() {
        use crate::storage::StoreError;

        #[derive(Clone, Default)]
        struct Shared(Rc<RefCell<MemoryStore>>);
        impl KeyValueStore for Shared {
            fn get(&self, key: &str) -> Option<String> {
                self.0.borrow().get(key)
            }
            fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
                self.0.borrow_mut().set(key, value)
            }
        }

        let store = Shared::default();
        let mut first = LineConsole::builder(store.clone())
            .dispatcher(|_: &str, _: &mut ScrollbackLog| {})
            .build()
            .unwrap();
        first.open();
        type_and_enter(&mut first, "god mode");

        let mut second = LineConsole::builder(store)
            .dispatcher(|_: &str, _: &mut ScrollbackLog| {})
            .build()
            .unwrap();
        second.open();
        second.handle_key(KeyPress::new(ConsoleKey::ArrowUp));
        assert_eq!(second.input().text(), "god mode");
    }
}
