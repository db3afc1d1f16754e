/// Command registry: named commands, prefix completion and execution with the
/// outcome written back to the scrollback log.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;

use crate::line_console::AutocompleteProvider;
use crate::markup::render_markdown;
use crate::scrollback::ScrollbackLog;

/// Longest command name, in words, tried when resolving a line.
pub const MAX_SUBCOMMANDS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("No such command \"{0}\"")]
    NotFound(String),
    #[error("Command \"{name}\" failed.")]
    Failed { name: String, reason: String },
    #[error("Invalid command name \"{0}\"")]
    InvalidName(String),
    #[error("Command already registered: {0}")]
    AlreadyRegistered(String),
}

/// Commands served by the console itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    List,
    Clear,
}

impl Builtin {
    pub const ALL: [Builtin; 2] = [Builtin::List, Builtin::Clear];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::List => "list",
            Builtin::Clear => "clear",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Builtin::List => "lists registered commands",
            Builtin::Clear => "clears the console output",
        }
    }

    fn lookup(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

/// A registered command ready to run with the rest of the line.
pub struct Invocation<'a, H> {
    pub name: String,
    pub args: String,
    pub handler: &'a H,
}

pub enum Target<'a, H> {
    Builtin(Builtin),
    Handler(&'a H),
}

/// A line split into a registered command and its arguments.
pub struct Resolved<'a, H> {
    pub name: String,
    pub args: String,
    pub target: Target<'a, H>,
}

struct Registered<H> {
    handler: H,
    description: String,
}

pub struct CommandRegistry<H> {
    commands: BTreeMap<String, Registered<H>>,
}

impl<H> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> CommandRegistry<H> {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, handler: H, description: &str) -> Result<(), CommandError> {
        if !is_valid_command_sequence(name) {
            return Err(CommandError::InvalidName(name.to_string()));
        }
        if self.contains(name) {
            return Err(CommandError::AlreadyRegistered(name.to_string()));
        }
        self.commands.insert(
            name.to_string(),
            Registered {
                handler,
                description: description.to_string(),
            },
        );
        tracing::debug!(name, "command registered");
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.commands.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name) || Builtin::lookup(name).is_some()
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        match self.commands.get(name) {
            Some(cmd) => Some(&cmd.description),
            None => Builtin::lookup(name).map(Builtin::description),
        }
    }

    /// All command names, builtins included, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.extend(Builtin::ALL.iter().map(|b| b.name().to_string()));
        names.sort();
        names
    }

    /// Names starting with `partial`, sorted.
    pub fn complete(&self, partial: &str) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|name| name.starts_with(partial))
            .collect()
    }

    /// Finds the longest registered name that prefixes `line`, word-wise.
    pub fn resolve(&self, line: &str) -> Result<Resolved<'_, H>, CommandError> {
        let line = line.trim();
        let words: Vec<&str> = line.split(' ').collect();
        for n in (1..=MAX_SUBCOMMANDS.min(words.len())).rev() {
            let name = words[..n].join(" ");
            let target = match self.commands.get(&name) {
                Some(cmd) => Target::Handler(&cmd.handler),
                None => match Builtin::lookup(&name) {
                    Some(builtin) => Target::Builtin(builtin),
                    None => continue,
                },
            };
            return Ok(Resolved {
                name,
                args: words[n..].join(" "),
                target,
            });
        }
        Err(CommandError::NotFound(words[..words.len().min(2)].join(" ")))
    }

    pub fn run_builtin(&self, builtin: Builtin, log: &mut ScrollbackLog) {
        match builtin {
            Builtin::List => {
                log.log(self.names().join("\n"));
            }
            Builtin::Clear => log.clear(),
        }
    }

    /// Resolves `line`. Builtins run and unknown names are reported into `log`
    /// right away; a registered command is returned for the caller to run,
    /// after which its result goes to [`finish`].
    pub fn prepare(&self, line: &str, log: &mut ScrollbackLog) -> Option<Invocation<'_, H>> {
        match self.resolve(line) {
            Ok(Resolved {
                name,
                args,
                target: Target::Handler(handler),
            }) => Some(Invocation { name, args, handler }),
            Ok(Resolved {
                target: Target::Builtin(builtin),
                ..
            }) => {
                self.run_builtin(builtin, log);
                None
            }
            Err(err) => {
                report(log, Err(err));
                None
            }
        }
    }
}

/// Reports what a registered command returned. `Ok(Some(_))` is lightweight
/// markup to show; `Err(_)` is the failure reason.
pub fn finish(log: &mut ScrollbackLog, name: String, result: Result<Option<String>, String>) {
    report(log, result.map_err(|reason| CommandError::Failed { name, reason }));
}

/// Writes a command outcome to the log: results as rich content, unknown
/// commands as warnings, failures as errors.
pub fn report(log: &mut ScrollbackLog, outcome: Result<Option<String>, CommandError>) {
    match outcome {
        Ok(Some(result)) if !result.trim().is_empty() => {
            log.append_rich(render_markdown(&result));
        }
        Ok(_) => {}
        Err(err @ CommandError::NotFound(_)) => {
            log.warn(err.to_string());
        }
        Err(err) => {
            if let CommandError::Failed { name, reason } = &err {
                tracing::warn!(%name, %reason, "command failed");
            }
            log.error(err.to_string());
        }
    }
}

/// Completes input against the names of a shared registry.
pub struct RegistryCompletion<H> {
    registry: Rc<RefCell<CommandRegistry<H>>>,
}

impl<H> RegistryCompletion<H> {
    pub fn new(registry: Rc<RefCell<CommandRegistry<H>>>) -> Self {
        Self { registry }
    }
}

impl<H> AutocompleteProvider for RegistryCompletion<H> {
    fn complete(&self, partial: &str) -> Vec<String> {
        self.registry.borrow().complete(partial)
    }
}

/// Returns true if the string is a valid command sequence:
/// one or more space-separated identifiers (letters, digits, underscores, dashes;
/// first char not digit).
pub fn is_valid_command_sequence(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let words: Vec<&str> = s.split(' ').collect();
    words.len() <= MAX_SUBCOMMANDS && words.into_iter().all(is_valid_ascii_identifier)
}

fn is_valid_ascii_identifier(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
