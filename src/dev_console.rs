/// DevConsole: in-game developer console singleton (extends Object).
/// Registered as an engine singleton automatically by gdext.
/// Creates an internal CanvasLayer with the log view and the command entry and
/// adds it to the scene tree. Console state lives in `LineConsole`; this type
/// mirrors it into engine nodes and runs registered command Callables.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use godot::classes::control::{FocusMode, LayoutPreset, SizeFlags};
use godot::classes::{
    CanvasLayer, Control, Engine, IObject, Input, InputEventKey, InputMap, PanelContainer, RichTextLabel, SceneTree, VBoxContainer,
};
use godot::builtin::Side;
use godot::global::Key;
use godot::prelude::*;

use crate::command_registry::{finish, CommandRegistry, RegistryCompletion};
use crate::console_entry::{ConsoleEntry, TOGGLE_ACTION};
use crate::console_options::ConsoleOptions;
use crate::line_console::{CommandDispatcher, ConsoleKey, KeyPress, KeyResponse, LineConsole};
use crate::markup::{render_markdown, RichText};
use crate::scrollback::{LogChanges, ScrollView, ScrollbackLog, StylePalette};
use crate::storage::{UserDataStore, USER_DATA_FILE};

type CommandQueue = Rc<RefCell<VecDeque<String>>>;

/// Queues submitted lines. They run on the next frame, once the singleton is
/// no longer borrowed, so command Callables may call back into DevConsole.
struct DeferredDispatch {
    queue: CommandQueue,
}

impl CommandDispatcher for DeferredDispatch {
    fn handle_command(&mut self, command: &str, _log: &mut ScrollbackLog) {
        self.queue.borrow_mut().push_back(command.to_string());
    }
}

#[derive(GodotClass)]
#[class(base=Object, singleton)]
pub struct DevConsole {
    base: Base<Object>,

    // The CanvasLayer node that holds all GUI (added to scene tree root)
    canvas_layer: Option<Gd<CanvasLayer>>,

    // GUI nodes
    control: Option<Gd<PanelContainer>>,
    control_block: Option<Gd<Control>>,
    output: Option<Gd<RichTextLabel>>,
    entry: Option<Gd<ConsoleEntry>>,
    previous_gui_focus: Option<Gd<Control>>,

    // State
    initialized: bool,
    options: ConsoleOptions,
    palette: StylePalette,
    console: LineConsole,
    registry: Rc<RefCell<CommandRegistry<Callable>>>,
    pending: CommandQueue,
}

// === Public API (exposed to GDScript via #[func]) ===

#[godot_api]
impl DevConsole {
    #[signal]
    fn toggled(is_shown: bool);

    // --- Initialization ---

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initialize the console. Takes a Gd<DevConsole> because signal
    /// connections need a handle to the object itself.
    pub fn initialize_impl(this: &mut Gd<DevConsole>) {
        let gd_ref: Gd<DevConsole> = this.clone();
        let mut s = this.bind_mut();
        if s.initialized {
            return;
        }
        s.initialized = true;

        s.register_input_actions();
        s.build_gui();

        if let Some(ref mut cl) = s.canvas_layer {
            cl.set_layer(9999);
            cl.set_process_mode(godot::classes::node::ProcessMode::ALWAYS);
            if let Some(tree) = Self::get_scene_tree() {
                if let Some(mut root) = tree.get_root() {
                    root.add_child(&*cl);
                }
            }
        }

        // Hidden until toggled
        if let Some(ref mut control) = s.control {
            control.set_visible(false);
        }
        if let Some(ref mut block) = s.control_block {
            block.set_visible(false);
        }

        if let Some(ref entry) = s.entry {
            let mut entry_node: Gd<godot::classes::Node> = entry.clone().upcast();
            for (signal, method) in [
                ("submit_requested", "on_submit_requested"),
                ("autocomplete_requested", "on_autocomplete_requested"),
                ("history_delete_requested", "on_history_delete_requested"),
                ("history_up_requested", "on_history_up_requested"),
                ("history_down_requested", "on_history_down_requested"),
            ] {
                entry_node.connect(signal, &Callable::from_object_method(&gd_ref, method));
            }
        }

        if let Some(mut tree) = Self::get_scene_tree() {
            tree.connect("process_frame", &Callable::from_object_method(&gd_ref, "on_process_frame"));
        } else {
            godot_error!("LineConsole: No SceneTree main loop; console will not update.");
        }
    }

    // --- Console visibility ---

    #[func]
    pub fn open_console(&mut self) {
        if !self.console.is_open() {
            self.console.open();
            self.show_console();
        }
    }

    #[func]
    pub fn close_console(&mut self) {
        if self.console.is_open() {
            self.console.close();
            self.hide_console();
        }
    }

    #[func]
    pub fn toggle_console(&mut self) {
        if self.console.toggle() {
            self.show_console();
        } else {
            self.hide_console();
        }
    }

    #[func]
    pub fn is_console_open(&self) -> bool {
        self.console.is_open()
    }

    /// True while the console claims keyboard, mouse and wheel input.
    /// Game input handlers should ignore events while this is set.
    #[func]
    pub fn owns_input(&self) -> bool {
        self.console.owns_input()
    }

    // --- Output methods ---

    #[func]
    pub fn log(&mut self, line: GString) {
        self.sync_view();
        self.console.log(line.to_string());
        self.refresh_output();
    }

    #[func]
    pub fn warn(&mut self, line: GString) {
        self.sync_view();
        self.console.warn(line.to_string());
        self.refresh_output();
    }

    #[func]
    pub fn error(&mut self, line: GString) {
        self.sync_view();
        self.console.error(line.to_string());
        self.refresh_output();
    }

    #[func]
    pub fn info(&mut self, line: GString) {
        self.sync_view();
        self.console.info(line.to_string());
        self.refresh_output();
    }

    #[func]
    pub fn success(&mut self, line: GString) {
        self.sync_view();
        self.console.success(line.to_string());
        self.refresh_output();
    }

    /// Logs lightweight markup (Markdown) rendered as rich text.
    #[func]
    pub fn log_markdown(&mut self, text: GString) {
        self.sync_view();
        self.console.log_rich(render_markdown(&text.to_string()));
        self.refresh_output();
    }

    /// Logs BBCode as-is. Only pass content you trust.
    #[func]
    pub fn log_bbcode(&mut self, bbcode: GString) {
        self.sync_view();
        self.console.log_rich(RichText::from_trusted(bbcode.to_string()));
        self.refresh_output();
    }

    /// Queues an error for the next frame when uncaught error logging is on.
    #[func]
    pub fn report_error(&mut self, message: GString) {
        self.console.report_uncaught(message.to_string());
    }

    #[func]
    pub fn clear_console(&mut self) {
        self.console.clear();
        self.refresh_output();
    }

    #[func]
    pub fn get_history(&self) -> PackedStringArray {
        self.console.history().entries().iter().map(|s| GString::from(s.as_str())).collect()
    }

    #[func]
    pub fn erase_history(&mut self) {
        self.console.erase_history();
    }

    // --- Command registration ---

    /// Registers `callable` under `name`. It is called with one String, the
    /// rest of the line. A returned String is shown as Markdown; returning
    /// `false` marks the command as failed.
    #[func]
    pub fn register_command(&mut self, name: GString, callable: Callable, desc: GString) {
        if !callable.is_valid() {
            godot_error!("LineConsole: Failed to register command {}: callable is not valid", name);
            return;
        }
        let result = self.registry.borrow_mut().register(&name.to_string(), callable, &desc.to_string());
        if let Err(err) = result {
            godot_error!("LineConsole: Failed to register command: {}", err);
        }
    }

    #[func]
    pub fn unregister_command(&mut self, name: GString) {
        if !self.registry.borrow_mut().unregister(&name.to_string()) {
            godot_error!("LineConsole: Unregister failed - command not found: {}", name);
        }
    }

    #[func]
    pub fn has_command(&self, name: GString) -> bool {
        self.registry.borrow().contains(&name.to_string())
    }

    #[func]
    pub fn get_command_names(&self) -> PackedStringArray {
        self.registry.borrow().names().iter().map(|s| GString::from(s.as_str())).collect()
    }

    #[func]
    pub fn get_command_description(&self, name: GString) -> GString {
        let registry = self.registry.borrow();
        GString::from(registry.description(&name.to_string()).unwrap_or(""))
    }

    /// Runs a command line on the next frame, as if it had been submitted.
    #[func]
    pub fn execute_command(&self, command_line: GString) {
        let mut gd = self.to_gd();
        let cmd = command_line.to_string();
        Callable::from_fn("_exec_cmd", move |_args| {
            Self::execute_command_on(&mut gd, &cmd);
            Variant::nil()
        })
        .call_deferred(&[]);
    }

    // --- Signal callbacks ---

    #[func]
    fn on_submit_requested(&mut self) {
        self.handle_key(KeyPress::new(ConsoleKey::Enter));
    }

    #[func]
    fn on_autocomplete_requested(&mut self) {
        self.handle_key(KeyPress::new(ConsoleKey::Tab));
    }

    #[func]
    fn on_history_delete_requested(&mut self) {
        self.handle_key(KeyPress::shifted(ConsoleKey::Delete));
    }

    #[func]
    fn on_history_up_requested(&mut self) {
        self.handle_key(KeyPress::new(ConsoleKey::ArrowUp));
    }

    #[func]
    fn on_history_down_requested(&mut self) {
        self.handle_key(KeyPress::new(ConsoleKey::ArrowDown));
    }

    #[func]
    fn on_process_frame(&mut self) {
        if !self.initialized {
            return;
        }

        // Run lines submitted since the last frame outside of this borrow.
        let commands: Vec<String> = self.pending.borrow_mut().drain(..).collect();
        if !commands.is_empty() {
            let mut gd = self.to_gd();
            Callable::from_fn("_dispatch_cmd", move |_args| {
                for cmd in &commands {
                    Self::execute_command_on(&mut gd, cmd);
                }
                Variant::nil()
            })
            .call_deferred(&[]);
        }

        self.poll_input();

        self.sync_view();
        let rescroll = self.console.tick();
        self.refresh_output();
        if rescroll {
            self.scroll_output_to_bottom();
        }
    }
}

// === Command execution ===

impl DevConsole {
    /// Executes a command line, releasing the borrow on the singleton while the
    /// command's Callable runs (it may call back into DevConsole).
    pub fn execute_command_on(this: &mut Gd<DevConsole>, command_line: &str) {
        let pending = this.bind_mut().prepare_command(command_line);

        if let Some((name, args, callable)) = pending {
            let result = if callable.is_valid() {
                Ok(callable.call(&[args.to_variant()]))
            } else {
                Err("command callable is no longer valid".to_string())
            };
            this.bind_mut().finish_command(name, result);
        }
    }

    /// Resolves the line. Builtins and unknown commands are handled here;
    /// registered commands are returned for the caller to invoke.
    fn prepare_command(&mut self, command_line: &str) -> Option<(String, String, Callable)> {
        self.sync_view();
        let registry = self.registry.clone();
        let invocation = registry
            .borrow()
            .prepare(command_line, self.console.scrollback_mut())
            .map(|call| (call.name, call.args, call.handler.clone()));
        self.refresh_output();
        invocation
    }

    fn finish_command(&mut self, name: String, result: Result<Variant, String>) {
        self.sync_view();
        finish(
            self.console.scrollback_mut(),
            name,
            result.and_then(|value| outcome_from_variant(&value)),
        );
        self.refresh_output();

        // Handlers that open their own UI may take focus from the entry.
        if self.console.refocus_after_command() {
            if let Some(ref mut entry) = self.entry {
                entry.grab_focus();
            }
        }
    }
}

fn outcome_from_variant(value: &Variant) -> Result<Option<String>, String> {
    match value.get_type() {
        VariantType::NIL => Ok(None),
        VariantType::BOOL => {
            if value.try_to::<bool>().unwrap_or(true) {
                Ok(None)
            } else {
                Err("command returned false".to_string())
            }
        }
        _ => Ok(Some(value.to_string())),
    }
}

// === Private implementation ===

impl DevConsole {
    fn get_scene_tree() -> Option<Gd<SceneTree>> {
        Engine::singleton()
            .get_main_loop()
            .and_then(|main_loop| main_loop.try_cast::<SceneTree>().ok())
    }

    fn handle_key(&mut self, press: KeyPress) {
        if !self.console.is_enabled() {
            return;
        }
        self.pull_entry_text();
        self.sync_view();
        if self.console.handle_key(press) == KeyResponse::Handled {
            self.push_entry_text();
        }
        self.refresh_output();
    }

    /// Copies the entry's text and caret into the console's input line.
    fn pull_entry_text(&mut self) {
        if let Some(ref entry) = self.entry {
            let text = entry.get_text().to_string();
            let caret = entry.get_caret_column().max(0) as usize;
            self.console.input_mut().sync(&text, caret);
        }
    }

    fn push_entry_text(&mut self) {
        let input = self.console.input();
        if let Some(ref mut entry) = self.entry {
            entry.set_text(&GString::from(input.text()));
            entry.set_caret_column(input.caret() as i32);
        }
    }

    /// Reads the scroll position of the output view into the log.
    fn sync_view(&mut self) {
        let Some(ref mut output) = self.output else {
            return;
        };
        if let Some(scroll_bar) = output.get_v_scroll_bar() {
            self.console.scrollback_mut().sync_view(ScrollView {
                offset: scroll_bar.get_value(),
                page: scroll_bar.get_page(),
                extent: scroll_bar.get_max(),
            });
        }
    }

    /// Mirrors new or changed log entries into the RichTextLabel.
    fn refresh_output(&mut self) {
        let changes = self.console.scrollback_mut().take_changes();
        let jump = self.console.scrollback_mut().take_jump();
        let Some(ref mut output) = self.output else {
            return;
        };
        let entries = self.console.scrollback().entries();
        let echo = self.options.print_to_stdout && !matches!(changes, LogChanges::Rebuild);
        let start = match changes {
            LogChanges::None => entries.len(),
            LogChanges::Appended(from) => from.min(entries.len()),
            LogChanges::Rebuild => {
                output.clear();
                0
            }
        };
        for entry in &entries[start..] {
            let line = format!("{}\n", entry.to_bbcode(&self.palette));
            output.append_text(&GString::from(line.as_str()));
        }
        if echo {
            for entry in &entries[start..] {
                godot_print!("{}", entry.content.to_plain());
            }
        }
        if jump {
            self.scroll_output_to_bottom();
        }
    }

    fn scroll_output_to_bottom(&mut self) {
        if let Some(ref mut output) = self.output {
            let line_count = output.get_line_count();
            output.scroll_to_line(line_count);
        }
    }

    fn register_input_actions(&self) {
        let mut input_map = InputMap::singleton();

        // line_console_toggle - backtick key
        if !input_map.has_action(TOGGLE_ACTION) {
            input_map.add_action(TOGGLE_ACTION);
            let mut ev = InputEventKey::new_gd();
            ev.set_keycode(Key::QUOTELEFT);
            input_map.action_add_event(TOGGLE_ACTION, &ev);
        }
    }

    fn poll_input(&mut self) {
        if Input::singleton().is_action_just_pressed(TOGGLE_ACTION) {
            self.toggle_console();
        }
    }

    fn build_gui(&mut self) {
        let mut canvas_layer = CanvasLayer::new_alloc();

        // Full-rect control that swallows mouse and wheel input while open
        let mut block = Control::new_alloc();
        block.set_anchors_preset(LayoutPreset::FULL_RECT);
        canvas_layer.add_child(&block);

        let mut panel = PanelContainer::new_alloc();
        panel.set_anchor_ex(Side::BOTTOM, self.options.height_ratio).done();
        panel.set_anchor_ex(Side::RIGHT, 1.0).done();
        panel.set_modulate(Color::from_rgba(1.0, 1.0, 1.0, self.options.opacity));
        canvas_layer.add_child(&panel);

        let mut vbox = VBoxContainer::new_alloc();
        vbox.set_anchors_preset(LayoutPreset::FULL_RECT);
        panel.add_child(&vbox);

        let mut output = RichTextLabel::new_alloc();
        output.set_v_size_flags(SizeFlags::EXPAND_FILL);
        output.set_scroll_active(true);
        output.set_scroll_follow(false);
        output.set_use_bbcode(true);
        output.set_selection_enabled(true);
        output.set_focus_mode(FocusMode::CLICK);
        vbox.add_child(&output);

        let config = self.console.config();
        if !config.output_only {
            let mut entry = ConsoleEntry::new_alloc();
            entry.set_placeholder(&GString::from(config.placeholder.as_str()));
            vbox.add_child(&entry);
            self.entry = Some(entry);
        }

        self.canvas_layer = Some(canvas_layer);
        self.control_block = Some(block);
        self.control = Some(panel);
        self.output = Some(output);
    }

    fn show_console(&mut self) {
        if let Some(ref mut control) = self.control {
            control.set_visible(true);
        }
        if let Some(ref mut block) = self.control_block {
            block.set_visible(true);
        }

        if let Some(tree) = Self::get_scene_tree() {
            if let Some(root) = tree.get_root() {
                self.previous_gui_focus = root.gui_get_focus_owner();
            }
        }

        let focus = self.console.wants_focus();
        if let Some(ref mut entry) = self.entry {
            entry.bind_mut().set_intercepting(true);
            if focus {
                entry.grab_focus();
            }
        }

        self.base_mut().emit_signal("toggled", &[true.to_variant()]);
    }

    fn hide_console(&mut self) {
        if let Some(ref mut control) = self.control {
            control.set_visible(false);
        }
        if let Some(ref mut block) = self.control_block {
            block.set_visible(false);
        }
        if let Some(ref mut entry) = self.entry {
            entry.bind_mut().set_intercepting(false);
            entry.release_focus();
        }

        if let Some(ref prev) = self.previous_gui_focus {
            if prev.is_instance_valid() {
                prev.clone().grab_focus();
            }
        }
        self.previous_gui_focus = None;

        self.base_mut().emit_signal("toggled", &[false.to_variant()]);
    }

    pub fn cleanup(&mut self) {
        self.initialized = false;

        // Disconnect from scene tree
        let this = self.to_gd();
        if let Some(mut tree) = Self::get_scene_tree() {
            let callable = Callable::from_object_method(&this, "on_process_frame");
            if tree.is_connected("process_frame", &callable) {
                tree.disconnect("process_frame", &callable);
            }
        }

        // Clear callables that may reference external objects
        *self.registry.borrow_mut() = CommandRegistry::new();

        // Drop all Gd references to child nodes before freeing the canvas layer
        self.entry = None;
        self.output = None;
        self.control = None;
        self.control_block = None;
        self.previous_gui_focus = None;

        // Free immediately: during engine shutdown the scene tree won't
        // process another frame to handle deferred frees.
        if let Some(cl) = self.canvas_layer.take() {
            if cl.is_inside_tree() {
                if let Some(mut parent) = cl.get_parent() {
                    parent.remove_child(&cl);
                }
            }
            cl.free();
        }
    }
}

// === IObject implementation ===

#[godot_api]
impl IObject for DevConsole {
    fn init(base: Base<Object>) -> Self {
        let mut options = ConsoleOptions::new();
        options.register_project_settings();
        options.load_from_project_settings();

        let pending = CommandQueue::default();
        let registry = Rc::new(RefCell::new(CommandRegistry::new()));
        let config = options.to_config();
        let built = LineConsole::builder(UserDataStore::open(USER_DATA_FILE))
            .config(config.clone())
            .dispatcher(DeferredDispatch { queue: pending.clone() })
            .autocomplete(RegistryCompletion::new(registry.clone()))
            .build();
        let console = match built {
            Ok(console) => console,
            Err(err) => {
                godot_error!("LineConsole: {}; falling back to output only", err);
                LineConsole::output_only(UserDataStore::open(USER_DATA_FILE), config)
            }
        };

        Self {
            base,
            canvas_layer: None,

            control: None,
            control_block: None,
            output: None,
            entry: None,
            previous_gui_focus: None,

            initialized: false,
            options,
            palette: StylePalette::default(),
            console,
            registry,
            pending,
        }
    }
}
