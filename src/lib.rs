mod command_history;
mod command_registry;
mod console_entry;
mod console_options;
mod dev_console;
mod error_capture;
mod line_console;
mod logging;
mod markup;
mod scrollback;
mod storage;

use godot::prelude::*;

use crate::dev_console::DevConsole;

struct LineConsoleExtension;

#[gdextension]
unsafe impl ExtensionLibrary for LineConsoleExtension {
    #[allow(deprecated)]
    fn on_level_init(level: InitLevel) {
        if level == InitLevel::Scene {
            logging::init();

            // Defer initialization until the main loop is ready.
            // Using Callable::from_fn so we get a fresh Gd handle with no active borrows.
            let callable = Callable::from_fn(&DevConsole::class_id().to_gstring(), |_args| {
                let mut singleton = DevConsole::singleton();
                DevConsole::initialize_impl(&mut singleton);
                Variant::nil()
            });
            callable.call_deferred(&[]);
        }
    }

    #[allow(deprecated)]
    fn on_level_deinit(level: InitLevel) {
        if level == InitLevel::Scene {
            let mut singleton = DevConsole::singleton();
            if singleton.bind().is_initialized() {
                singleton.bind_mut().cleanup();
            }
        }
    }
}
