/// Scrollback log: append-only entries, retroactive style tags, and the scroll
/// bookkeeping that decides whether new output follows the bottom edge.
///
/// Scroll values use the same units as the view that displays the log. When
/// no view reports its metrics, each line of content counts as
/// `DEFAULT_LINE_HEIGHT` units.
use crate::markup::{bbcode_escape, bbcode_strip, RichText};

pub const DEFAULT_LINE_HEIGHT: f64 = 16.0;
/// Slack for fractional layouts (zoom, HiDPI) when comparing against the bottom.
pub const BOTTOM_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStyle {
    Input,
    Warning,
    Error,
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    Plain(String),
    Rich(RichText),
}

impl EntryContent {
    pub fn to_bbcode(&self) -> String {
        match self {
            EntryContent::Plain(text) => bbcode_escape(text),
            EntryContent::Rich(rich) => rich.as_str().to_string(),
        }
    }

    pub fn to_plain(&self) -> String {
        match self {
            EntryContent::Plain(text) => text.clone(),
            EntryContent::Rich(rich) => bbcode_strip(rich.as_str()),
        }
    }

    fn line_count(&self) -> usize {
        let lines = match self {
            EntryContent::Plain(text) => text.lines().count(),
            EntryContent::Rich(rich) => bbcode_strip(rich.as_str()).lines().count(),
        };
        lines.max(1)
    }
}

impl From<&str> for EntryContent {
    fn from(text: &str) -> Self {
        EntryContent::Plain(text.to_string())
    }
}

impl From<String> for EntryContent {
    fn from(text: String) -> Self {
        EntryContent::Plain(text)
    }
}

impl From<RichText> for EntryContent {
    fn from(rich: RichText) -> Self {
        EntryContent::Rich(rich)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub content: EntryContent,
    pub style: Option<EntryStyle>,
}

impl LogEntry {
    pub fn to_bbcode(&self, palette: &StylePalette) -> String {
        let body = self.content.to_bbcode();
        match self.style {
            None => body,
            Some(EntryStyle::Input) => {
                format!("[color={}][b]>[/b] {}[/color]", palette.input, body)
            }
            Some(style) => format!("[color={}]{}[/color]", palette.color(style), body),
        }
    }
}

/// Identifies an entry for tagging after it was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHandle {
    index: usize,
    generation: u64,
}

/// HTML color codes used when rendering styled entries.
#[derive(Debug, Clone)]
pub struct StylePalette {
    pub input: String,
    pub warning: String,
    pub error: String,
    pub info: String,
    pub success: String,
}

impl Default for StylePalette {
    fn default() -> Self {
        Self {
            input: "#9cdcfe".into(),
            warning: "#e5c07b".into(),
            error: "#ff5f56".into(),
            info: "#61afef".into(),
            success: "#98c379".into(),
        }
    }
}

impl StylePalette {
    pub fn color(&self, style: EntryStyle) -> &str {
        match style {
            EntryStyle::Input => &self.input,
            EntryStyle::Warning => &self.warning,
            EntryStyle::Error => &self.error,
            EntryStyle::Info => &self.info,
            EntryStyle::Success => &self.success,
        }
    }
}

/// Scroll position of the view that shows the log.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollView {
    /// Distance from the top of the content to the top of the visible area.
    pub offset: f64,
    /// Height of the visible area.
    pub page: f64,
    /// Height of the whole content.
    pub extent: f64,
}

impl ScrollView {
    pub fn is_at_bottom(&self) -> bool {
        self.offset + self.page + BOTTOM_TOLERANCE >= self.extent
    }

    fn bottom_offset(&self) -> f64 {
        (self.extent - self.page).max(0.0)
    }
}

/// What a renderer must do to mirror the log since it last synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChanges {
    None,
    /// Entries from this index on are new.
    Appended(usize),
    /// Existing output is stale; render every entry again.
    Rebuild,
}

pub struct ScrollbackLog {
    entries: Vec<LogEntry>,
    view: ScrollView,
    line_height: f64,
    // Bumped by `clear` so stale handles stop resolving.
    generation: u64,
    rescroll_pending: bool,
    jump_requested: bool,
    synced: usize,
    needs_rebuild: bool,
}

impl Default for ScrollbackLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollbackLog {
    pub fn new() -> Self {
        Self::with_line_height(DEFAULT_LINE_HEIGHT)
    }

    pub fn with_line_height(line_height: f64) -> Self {
        Self {
            entries: Vec::new(),
            view: ScrollView::default(),
            line_height,
            generation: 0,
            rescroll_pending: false,
            jump_requested: false,
            synced: 0,
            needs_rebuild: false,
        }
    }

    /// Appends an entry. If the view was at the bottom just before, a re-scroll
    /// to the new bottom is scheduled for the next tick.
    pub fn append(&mut self, content: impl Into<EntryContent>, style: Option<EntryStyle>) -> EntryHandle {
        let was_at_bottom = self.is_scrolled_to_bottom();
        let content = content.into();
        self.view.extent += content.line_count() as f64 * self.line_height;
        self.entries.push(LogEntry { content, style });
        if was_at_bottom {
            self.rescroll_pending = true;
        }
        EntryHandle {
            index: self.entries.len() - 1,
            generation: self.generation,
        }
    }

    /// Appends pre-rendered content. The caller is responsible for trusting it.
    pub fn append_rich(&mut self, rich: RichText) -> EntryHandle {
        self.append(EntryContent::Rich(rich), None)
    }

    pub fn log(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.append(content, None)
    }

    pub fn warn(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.append_then_tag(content, EntryStyle::Warning)
    }

    pub fn error(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.append_then_tag(content, EntryStyle::Error)
    }

    pub fn info(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.append_then_tag(content, EntryStyle::Info)
    }

    pub fn success(&mut self, content: impl Into<EntryContent>) -> EntryHandle {
        self.append_then_tag(content, EntryStyle::Success)
    }

    fn append_then_tag(&mut self, content: impl Into<EntryContent>, style: EntryStyle) -> EntryHandle {
        let handle = self.log(content);
        self.tag(handle, style);
        handle
    }

    /// Sets the style of an existing entry. Returns `false` if the handle no
    /// longer refers to an entry.
    pub fn tag(&mut self, handle: EntryHandle, style: EntryStyle) -> bool {
        if handle.generation != self.generation {
            return false;
        }
        let Some(entry) = self.entries.get_mut(handle.index) else {
            return false;
        };
        entry.style = Some(style);
        if handle.index < self.synced {
            self.needs_rebuild = true;
        }
        true
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
        self.view.extent = 0.0;
        self.view.offset = 0.0;
        self.synced = 0;
        self.needs_rebuild = true;
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_scrolled_to_bottom(&self) -> bool {
        self.view.is_at_bottom()
    }

    /// Replaces the scroll metrics with the ones reported by the actual view.
    pub fn sync_view(&mut self, view: ScrollView) {
        self.view = view;
    }

    /// Scrolls to the bottom now and asks the view to follow.
    pub fn scroll_to_bottom(&mut self) {
        self.view.offset = self.view.bottom_offset();
        self.jump_requested = true;
    }

    /// Returns whether the view must jump to the bottom, resetting the request.
    pub fn take_jump(&mut self) -> bool {
        std::mem::take(&mut self.jump_requested)
    }

    /// Runs the deferred re-scroll scheduled by `append`. Returns `true` when
    /// the view was moved to the bottom.
    pub fn run_deferred_rescroll(&mut self) -> bool {
        if !std::mem::take(&mut self.rescroll_pending) {
            return false;
        }
        self.view.offset = self.view.bottom_offset();
        true
    }

    /// Reports what changed since the previous call.
    pub fn take_changes(&mut self) -> LogChanges {
        let changes = if std::mem::take(&mut self.needs_rebuild) {
            LogChanges::Rebuild
        } else if self.synced < self.entries.len() {
            LogChanges::Appended(self.synced)
        } else {
            LogChanges::None
        };
        self.synced = self.entries.len();
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_page(lines: f64) -> ScrollbackLog {
        let mut log = ScrollbackLog::new();
        log.view.page = lines * DEFAULT_LINE_HEIGHT;
        log
    }

    #[test]
    fn helpers_tag_entries() {
        let mut log = ScrollbackLog::new();
        log.warn("w");
        log.error("e");
        log.info("i");
        log.success("s");
        log.log("plain");
        let styles: Vec<_> = log.entries().iter().map(|e| e.style).collect();
        assert_eq!(
            styles,
            [
                Some(EntryStyle::Warning),
                Some(EntryStyle::Error),
                Some(EntryStyle::Info),
                Some(EntryStyle::Success),
                None,
            ]
        );
    }

    #[test]
    fn handle_tags_entry_after_the_fact() {
        let mut log = ScrollbackLog::new();
        let handle = log.log("ran");
        log.log("later");
        assert!(log.tag(handle, EntryStyle::Success));
        assert_eq!(log.entries()[0].style, Some(EntryStyle::Success));
        assert_eq!(log.entries()[1].style, None);
    }

    #[test]
    fn handles_do_not_survive_clear() {
        let mut log = ScrollbackLog::new();
        let handle = log.log("old");
        log.clear();
        log.log("new");
        assert!(!log.tag(handle, EntryStyle::Error));
        assert_eq!(log.entries()[0].style, None);
    }

    #[test]
    fn reader_scrolled_up_is_not_pulled_down() {
        let mut log = log_with_page(2.0);
        for text in ["A", "B", "C"] {
            log.log(text);
            log.run_deferred_rescroll();
        }
        assert!(log.is_scrolled_to_bottom());

        log.view.offset = 0.0;
        assert!(!log.is_scrolled_to_bottom());
        log.log("D");
        assert!(!log.rescroll_pending);
        assert!(!log.run_deferred_rescroll());
        assert_eq!(log.view.offset, 0.0);

        log.view.offset = log.view.bottom_offset();
        assert!(log.is_scrolled_to_bottom());
        log.log("E");
        assert!(log.rescroll_pending);
        assert!(log.run_deferred_rescroll());
        assert!(log.is_scrolled_to_bottom());
        assert_eq!(log.view.offset, 3.0 * DEFAULT_LINE_HEIGHT);
    }

    #[test]
    fn bottom_check_tolerates_sub_unit_gap() {
        let mut log = ScrollbackLog::new();
        log.sync_view(ScrollView {
            offset: 99.4,
            page: 100.0,
            extent: 200.0,
        });
        assert!(log.is_scrolled_to_bottom());
        log.sync_view(ScrollView {
            offset: 98.0,
            page: 100.0,
            extent: 200.0,
        });
        assert!(!log.is_scrolled_to_bottom());
    }

    #[test]
    fn cleared_log_is_at_bottom() {
        let mut log = log_with_page(1.0);
        for i in 0..10 {
            log.log(format!("line {i}"));
        }
        log.view.offset = 0.0;
        assert!(!log.is_scrolled_to_bottom());
        log.clear();
        assert!(log.is_empty());
        assert!(log.is_scrolled_to_bottom());
    }

    #[test]
    fn multi_line_entries_take_more_room() {
        let mut log = ScrollbackLog::new();
        log.log("a\nb\nc");
        assert_eq!(log.view.extent, 3.0 * DEFAULT_LINE_HEIGHT);
    }

    #[test]
    fn changes_track_appends_and_rebuilds() {
        let mut log = ScrollbackLog::new();
        assert_eq!(log.take_changes(), LogChanges::None);
        let first = log.log("a");
        log.log("b");
        assert_eq!(log.take_changes(), LogChanges::Appended(0));
        log.log("c");
        assert_eq!(log.take_changes(), LogChanges::Appended(2));
        log.tag(first, EntryStyle::Error);
        assert_eq!(log.take_changes(), LogChanges::Rebuild);
        log.clear();
        assert_eq!(log.take_changes(), LogChanges::Rebuild);
        assert_eq!(log.take_changes(), LogChanges::None);
    }

    #[test]
    fn tagging_unsynced_entry_only_appends() {
        let mut log = ScrollbackLog::new();
        log.warn("w");
        assert_eq!(log.take_changes(), LogChanges::Appended(0));
    }

    #[test]
    fn bbcode_rendering() {
        let palette = StylePalette::default();
        let mut log = ScrollbackLog::new();
        log.log("[x]");
        log.append(EntryContent::from("help"), Some(EntryStyle::Input));
        log.append_rich(RichText::from_trusted("[b]ok[/b]"));
        log.error("bad");
        let rendered: Vec<_> = log.entries().iter().map(|e| e.to_bbcode(&palette)).collect();
        assert_eq!(rendered[0], "[lb]x[rb]");
        assert_eq!(rendered[1], format!("[color={}][b]>[/b] help[/color]", palette.input));
        assert_eq!(rendered[2], "[b]ok[/b]");
        assert_eq!(rendered[3], format!("[color={}]bad[/color]", palette.error));
    }
}
