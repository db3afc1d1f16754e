/// ConsoleEntry: single-line input of the console.
/// Intercepts the console keys (Tab, Shift+Delete, Enter, Up, Down) before
/// LineEdit processes them and emits signals so DevConsole can respond.
use godot::classes::notify::ControlNotification;
use godot::classes::{ILineEdit, InputEvent, InputEventKey, InputMap, LineEdit};
use godot::global::Key;
use godot::prelude::*;

use crate::line_console::{ConsoleKey, KeyPress};

pub const TOGGLE_ACTION: &str = "line_console_toggle";

#[derive(GodotClass)]
#[class(base=LineEdit)]
pub struct ConsoleEntry {
    base: Base<LineEdit>,

    /// Keys are only intercepted while the console is enabled.
    pub intercepting: bool,
}

#[godot_api]
impl ConsoleEntry {
    #[signal]
    fn submit_requested();

    #[signal]
    fn autocomplete_requested();

    #[signal]
    fn history_delete_requested();

    #[signal]
    fn history_up_requested();

    #[signal]
    fn history_down_requested();

    #[func]
    pub fn set_intercepting(&mut self, intercepting: bool) {
        self.intercepting = intercepting;
    }
}

/// Maps a key event to the console key it stands for, if any.
pub fn console_key(event: &Gd<InputEventKey>) -> Option<KeyPress> {
    let key = match event.get_keycode() {
        Key::TAB => ConsoleKey::Tab,
        Key::DELETE => ConsoleKey::Delete,
        Key::ENTER | Key::KP_ENTER => ConsoleKey::Enter,
        Key::UP => ConsoleKey::ArrowUp,
        Key::DOWN => ConsoleKey::ArrowDown,
        _ => return None,
    };
    Some(KeyPress {
        key,
        shift: event.is_shift_pressed(),
    })
}

fn signal_for(press: KeyPress) -> Option<&'static str> {
    match press.key {
        ConsoleKey::Tab => Some("autocomplete_requested"),
        ConsoleKey::Delete if press.shift => Some("history_delete_requested"),
        ConsoleKey::Enter => Some("submit_requested"),
        ConsoleKey::ArrowUp => Some("history_up_requested"),
        ConsoleKey::ArrowDown => Some("history_down_requested"),
        _ => None,
    }
}

#[godot_api]
impl ILineEdit for ConsoleEntry {
    fn init(base: Base<LineEdit>) -> Self {
        Self {
            base,
            intercepting: false,
        }
    }

    fn input(&mut self, event: Gd<InputEvent>) {
        if !self.base().has_focus() {
            return;
        }

        // Consume the console toggle key so it doesn't get typed into the input
        let input_map = InputMap::singleton();
        if input_map.has_action(TOGGLE_ACTION) && event.is_action(TOGGLE_ACTION) {
            if let Some(mut viewport) = self.base().get_viewport() {
                viewport.set_input_as_handled();
            }
            return;
        }

        if !self.intercepting {
            return;
        }

        let Ok(key_event) = event.try_cast::<InputEventKey>() else {
            return;
        };
        let Some(signal) = console_key(&key_event).and_then(signal_for) else {
            return;
        };
        if key_event.is_pressed() {
            self.base_mut().emit_signal(signal, &[]);
        }
        if let Some(mut viewport) = self.base().get_viewport() {
            viewport.set_input_as_handled();
        }
    }

    fn on_notification(&mut self, what: ControlNotification) {
        match what {
            ControlNotification::FOCUS_ENTER => self.base_mut().set_process_input(true),
            ControlNotification::FOCUS_EXIT => self.base_mut().set_process_input(false),
            _ => {}
        }
    }
}
