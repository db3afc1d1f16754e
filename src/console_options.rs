/// Console configuration via Godot's ProjectSettings.
/// All settings are registered under "addons/line_console/" and are editable
/// in the Godot editor via Project > Project Settings.
use godot::classes::ProjectSettings;
use godot::global::PropertyHint;
use godot::prelude::*;

use crate::line_console::{ConsoleConfig, DEFAULT_STORAGE_ID};

const S: &str = "addons/line_console";

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleOptions {
    // main
    pub storage_id: String,
    pub placeholder: String,
    pub autofocus: bool,
    pub output_only: bool,
    pub log_uncaught_errors: bool,
    pub print_to_stdout: bool,

    // appearance
    pub height_ratio: f32,
    pub opacity: f32,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            storage_id: DEFAULT_STORAGE_ID.into(),
            placeholder: String::new(),
            autofocus: true,
            output_only: false,
            log_uncaught_errors: false,
            print_to_stdout: false,

            height_ratio: 0.5,
            opacity: 1.0,
        }
    }
}

impl ConsoleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Core console settings. Appearance stays with the engine binding.
    pub fn to_config(&self) -> ConsoleConfig {
        let storage_id = if self.storage_id.trim().is_empty() {
            DEFAULT_STORAGE_ID.to_string()
        } else {
            self.storage_id.clone()
        };
        ConsoleConfig {
            output_only: self.output_only,
            placeholder: self.placeholder.clone(),
            storage_id,
            autofocus: self.autofocus,
            capture_errors: self.log_uncaught_errors,
        }
    }

    /// Registers all console settings in Godot's ProjectSettings.
    /// Settings that already exist (user-configured) are not overwritten.
    pub fn register_project_settings(&self) {
        let mut ps = ProjectSettings::singleton();

        // -- main --
        define_string(&mut ps, &key("storage_id"), &self.storage_id, PropertyHint::NONE, "");
        define_string(&mut ps, &key("placeholder"), &self.placeholder, PropertyHint::PLACEHOLDER_TEXT, "Type a command");
        define_bool(&mut ps, &key("autofocus"), self.autofocus);
        define_bool(&mut ps, &key("output_only"), self.output_only);
        define_bool(&mut ps, &key("log_uncaught_errors"), self.log_uncaught_errors);
        define_bool(&mut ps, &key("print_to_stdout"), self.print_to_stdout);

        // -- appearance --
        define_float(&mut ps, &key("appearance/height_ratio"), self.height_ratio, PropertyHint::RANGE, "0.1,1.0,0.05");
        define_float(&mut ps, &key("appearance/opacity"), self.opacity, PropertyHint::RANGE, "0.0,1.0,0.05");
    }

    /// Reads all settings from ProjectSettings into this struct.
    pub fn load_from_project_settings(&mut self) {
        let ps = ProjectSettings::singleton();

        self.storage_id = get_string(&ps, &key("storage_id"));
        self.placeholder = get_string(&ps, &key("placeholder"));
        self.autofocus = get_bool(&ps, &key("autofocus"));
        self.output_only = get_bool(&ps, &key("output_only"));
        self.log_uncaught_errors = get_bool(&ps, &key("log_uncaught_errors"));
        self.print_to_stdout = get_bool(&ps, &key("print_to_stdout"));

        self.height_ratio = get_float(&ps, &key("appearance/height_ratio"));
        self.opacity = get_float(&ps, &key("appearance/opacity"));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key(suffix: &str) -> GString {
    GString::from(format!("{}/{}", S, suffix).as_str())
}

fn add_property_info(ps: &mut Gd<ProjectSettings>, name: &GString, variant_type: VariantType, hint: PropertyHint, hint_string: &str) {
    let mut info = VarDictionary::new();
    info.set("name", name.to_variant());
    info.set("type", (variant_type.ord() as i32).to_variant());
    info.set("hint", (hint.ord() as i32).to_variant());
    info.set("hint_string", GString::from(hint_string).to_variant());
    ps.add_property_info(&info);
}

fn define_bool(ps: &mut Gd<ProjectSettings>, name: &GString, default: bool) {
    let val = default.to_variant();
    if !ps.has_setting(name) {
        ps.set_setting(name, &val);
    }
    ps.set_initial_value(name, &val);
    add_property_info(ps, name, VariantType::BOOL, PropertyHint::NONE, "");
}

fn define_float(ps: &mut Gd<ProjectSettings>, name: &GString, default: f32, hint: PropertyHint, hint_string: &str) {
    let val = (default as f64).to_variant();
    if !ps.has_setting(name) {
        ps.set_setting(name, &val);
    }
    ps.set_initial_value(name, &val);
    add_property_info(ps, name, VariantType::FLOAT, hint, hint_string);
}

fn define_string(ps: &mut Gd<ProjectSettings>, name: &GString, default: &str, hint: PropertyHint, hint_string: &str) {
    let val = GString::from(default).to_variant();
    if !ps.has_setting(name) {
        ps.set_setting(name, &val);
    }
    ps.set_initial_value(name, &val);
    add_property_info(ps, name, VariantType::STRING, hint, hint_string);
}

fn get_bool(ps: &Gd<ProjectSettings>, name: &GString) -> bool {
    ps.get_setting(name).try_to::<bool>().unwrap_or_default()
}

fn get_float(ps: &Gd<ProjectSettings>, name: &GString) -> f32 {
    ps.get_setting(name).try_to::<f64>().unwrap_or_default() as f32
}

fn get_string(ps: &Gd<ProjectSettings>, name: &GString) -> String {
    ps.get_setting(name).try_to::<GString>().map(|s| s.to_string()).unwrap_or_default()
}
