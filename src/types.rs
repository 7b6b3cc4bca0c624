use std::path::PathBuf;

/// Format tag of a book file
///
/// The format tag selects which reader engine implementation the
/// factory constructs. Other formats can be added here as long as an
/// engine implementing [crate::engine::ReaderEngine] exists for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormat {
    /// A zip-based packaged document (container descriptor, package
    /// document, content units, optional navigation document).
    Epub,

    /// A plain-text file paginated by character budget.
    PlainText,
}

/// A book record owned by an external repository
///
/// The engine reads this record once at `initialize` and reports
/// progress back through [crate::engine::ProgressStore]; it never
/// persists anything on its own.
#[derive(Debug, Clone)]
pub struct Book {
    /// Repository identity of the book, opaque to the engine.
    pub id: String,

    /// Location of the book file on disk.
    pub path: PathBuf,

    /// Format tag used by the engine factory.
    pub format: BookFormat,

    /// The display title. May be empty; a packaged book fills it from
    /// its package document metadata during initialization.
    pub title: String,

    /// The display author. May be empty, same rules as `title`.
    pub author: String,

    /// Total page count from the last pagination, 0 if never opened.
    pub total_pages: usize,

    /// The page the reader stopped at.
    pub last_read_page: usize,

    /// Fractional position inside the last read page, in `0.0..=1.0`.
    pub last_read_position: f64,
}

impl Book {
    /// Fraction of the book read so far
    ///
    /// Derived as `last_read_page / total_pages`; a book that has
    /// never been paginated reports 0 rather than dividing by zero.
    pub fn reading_progress(&self) -> f64 {
        if self.total_pages == 0 {
            0.0
        } else {
            self.last_read_page as f64 / self.total_pages as f64
        }
    }
}

/// One spine-addressed piece of packaged book content
///
/// Content units are produced once while parsing the package document
/// and are immutable afterwards. Each unit corresponds to one page of
/// the packaged pagination strategy (offset by the synthetic cover).
#[derive(Debug, Clone)]
pub struct ContentUnit {
    /// Normalized path of the unit inside the container.
    pub path: String,

    /// Title taken from the manifest, when the manifest declares one.
    pub title: Option<String>,

    /// Raw payload bytes as stored in the archive.
    pub data: Vec<u8>,

    /// Declared media type of the unit.
    pub mime: String,
}

/// An entry of the ordered chapter list
///
/// The chapter list is flat; hierarchy from a navigation document is
/// expressed through `depth`, which is capped by the parser's
/// recursion bound. Entries are ordered by `start_position` ascending,
/// an invariant the indexer maintains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterEntry {
    /// Display title of the chapter.
    pub title: String,

    /// Ordinal of this entry within the chapter list.
    pub index: usize,

    /// Index of the first page belonging to this chapter. The chapter
    /// extends to the next entry's start, or the end of the book.
    pub start_position: usize,

    /// Nesting depth within the navigation hierarchy, 0 for top level.
    pub depth: usize,
}

/// Renderable content of a single page
///
/// Constructed lazily and cached by page index; cleared as a whole
/// when the engine is closed or re-initialized.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    /// Plain text of the page, markup stripped.
    pub text: String,

    /// Rendering markup with intra-document references already
    /// substituted, `None` for pages without a markup form.
    pub markup: Option<String>,

    /// Index of this page.
    pub page_index: usize,

    /// Index of the chapter owning this page.
    pub chapter_index: usize,

    pub is_first_page: bool,
    pub is_last_page: bool,
}

/// A single search result
///
/// At most one hit is reported per page: the first occurrence of the
/// query on that page. The snippet is a window around the match and
/// the highlight offsets are character offsets within the snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub page_index: usize,
    pub chapter_index: usize,

    /// Text surrounding the match, clipped at page boundaries.
    pub snippet: String,

    /// Character offset of the match within `snippet`.
    pub highlight_start: usize,

    /// Character offset one past the end of the match within `snippet`.
    pub highlight_end: usize,
}

/// Rendering configuration driving plain-text pagination
///
/// Pagination of plain text is a pure function of the source text and
/// this configuration; packaged books ignore it since their page count
/// is fixed by spine length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReaderConfig {
    /// Font size in logical pixels; also the width budget of one
    /// character cell.
    pub font_size: f32,

    /// Line height as a multiple of the font size.
    pub line_height: f32,

    /// Margin applied on every side of the viewport, logical pixels.
    pub margin: f32,

    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            font_size: 18.0,
            line_height: 1.6,
            margin: 16.0,
            viewport_width: 390.0,
            viewport_height: 740.0,
        }
    }
}

impl ReaderConfig {
    /// Number of character cells that fit on one line, at least 1.
    pub fn chars_per_line(&self) -> usize {
        let usable = (self.viewport_width - 2.0 * self.margin).max(0.0);
        ((usable / self.font_size) as usize).max(1)
    }

    /// Number of lines that fit in the viewport, at least 1.
    pub fn lines_per_page(&self) -> usize {
        let usable = (self.viewport_height - 2.0 * self.margin).max(0.0);
        ((usable / (self.font_size * self.line_height)) as usize).max(1)
    }

    /// Character budget of a full page.
    pub fn chars_per_page(&self) -> usize {
        self.chars_per_line() * self.lines_per_page()
    }
}

/// Direction of a relative page navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    Next,
    Previous,
}

/// Granularity of text handed to a speech collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextScope {
    Page,
    Chapter,
}

/// Lifecycle phase of a reader engine
///
/// `Error` is terminal until the engine is initialized again; every
/// other phase is left through the documented transitions only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Uninitialized,
    Loading,
    Ready,
    Error,
}

/// Snapshot of the observable engine state
///
/// This is the only state consumers see. It is replaced wholesale on
/// every transition, successful or failed, and never mutated
/// field-by-field from outside, so an observer can never read a
/// half-updated view.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub phase: EnginePhase,
    pub is_loading: bool,
    pub current_page: usize,
    pub total_pages: usize,
    pub current_chapter: usize,
    pub total_chapters: usize,
    pub reading_progress: f64,

    /// Message of the last unrecoverable or per-page failure.
    pub error: Option<String>,

    /// The book this engine was constructed for.
    pub book: Book,
}

impl EngineState {
    /// The state every engine starts in before `initialize`.
    pub fn uninitialized(book: Book) -> Self {
        Self {
            phase: EnginePhase::Uninitialized,
            is_loading: false,
            current_page: 0,
            total_pages: 0,
            current_chapter: 0,
            total_chapters: 0,
            reading_progress: 0.0,
            error: None,
            book,
        }
    }
}
