//! The reader engine and its state machine
//!
//! One engine instance owns one reading session over one book. The
//! capability contract is the [ReaderEngine] trait; each supported
//! format has its own implementation and [open_book] selects one from
//! the book's format tag, so consumers never branch on format
//! themselves.
//!
//! The engine is single-writer by construction: every mutating
//! operation takes `&mut self`, which serializes writers at compile
//! time. Observers read through [ReaderEngine::state], a cloned
//! snapshot that is replaced wholesale on every transition. Engines
//! are `Send`, so an embedder can move the blocking work (parsing,
//! pagination, search) onto a worker thread; the crate spawns nothing
//! of its own. After [ReaderEngine::close] every operation becomes a
//! no-op or an error, so a task racing a close abandons its result
//! instead of mutating a dead session.

use std::{
    fs::File,
    io::{BufReader, Read, Seek},
};

use log::{debug, warn};
use zip::ZipArchive;

use crate::{
    cache::ContentCache,
    chapters,
    error::ReaderError,
    package::PackageDoc,
    pagination,
    search,
    types::{
        Book, BookFormat, ChapterEntry, EnginePhase, EngineState, PageContent, PageTurn,
        ReaderConfig, SearchHit, TextScope,
    },
    xml,
};

/// The repository that owns book records
///
/// The engine never persists anything itself; it reports position
/// changes through this narrow interface and the repository decides
/// what to do with them.
pub trait ProgressStore {
    fn update_reading_progress(&mut self, book_id: &str, page: usize, position: f64);
}

/// A speech-synthesis collaborator
///
/// Receives plain page or chapter text; it has no visibility into
/// parsing internals.
pub trait SpeechSink {
    fn accept_text(&mut self, text: &str);
}

/// The capability contract every format variant implements
///
/// Navigation never fails: page and chapter indices are clamped to
/// their valid ranges and moving past either boundary is a no-op that
/// returns the unchanged index. Content access can fail per page;
/// such a failure is returned to the caller and leaves every other
/// page navigable.
pub trait ReaderEngine: Send {
    /// Parses the book and paginates it, entering `Ready` on success
    /// or `Error` on a format failure. `start_page` is clamped to the
    /// paginated range. May be called again to restart a session that
    /// entered `Error`, as long as the engine was not closed.
    fn initialize(&mut self, start_page: usize) -> Result<(), ReaderError>;

    /// Ensures the current page is rendered and cached. Idempotent
    /// and cheap when the page is already cached.
    fn load_content(&mut self) -> Result<(), ReaderError>;

    fn current_page_content(&mut self) -> Result<PageContent, ReaderError>;

    fn current_chapter_title(&self) -> Option<String>;

    fn current_page_text(&mut self) -> Result<String, ReaderError>;

    /// Concatenated text of every page of the current chapter.
    fn current_chapter_text(&mut self) -> Result<String, ReaderError>;

    fn has_next_page(&self) -> bool;

    /// Moves one page in the given direction, clamped at both ends.
    /// Returns the current page index after the move.
    fn navigate_page(&mut self, direction: PageTurn) -> usize;

    /// Jumps to a page, clamped to the valid range. Returns the
    /// current page index after the jump.
    fn go_to_page(&mut self, page_index: usize) -> usize;

    /// Jumps to the first page of a chapter. An invalid chapter index
    /// is a no-op. Returns the current page index after the jump.
    fn go_to_chapter(&mut self, chapter_index: usize) -> usize;

    fn chapters(&self) -> &[ChapterEntry];

    /// `current_page / total_pages`, 0 when nothing is paginated.
    fn reading_progress(&self) -> f64;

    /// Applies a new rendering configuration. Re-paginates formats
    /// whose page boundaries depend on it, preserving the reading
    /// progress fraction rather than the absolute page index.
    fn update_config(&mut self, config: ReaderConfig) -> Result<(), ReaderError>;

    /// Reports the current position to the owning repository.
    fn save_reading_progress(&mut self, store: &mut dyn ProgressStore);

    /// Scans every page for the query. Pages that fail to render are
    /// skipped, not fatal.
    fn search(&mut self, query: &str) -> Vec<SearchHit>;

    /// The book's cover image bytes and media type, if it has one.
    fn cover_image(&self) -> Option<(Vec<u8>, String)>;

    /// Hands the current page or chapter text to a speech collaborator.
    fn supply_text(
        &mut self,
        scope: TextScope,
        sink: &mut dyn SpeechSink,
    ) -> Result<(), ReaderError>;

    /// A complete snapshot of the observable state.
    fn state(&self) -> EngineState;

    /// Releases the archive handle and every cached payload. Safe to
    /// call any number of times; afterwards all operations are no-ops
    /// or report [ReaderError::EngineClosed].
    fn close(&mut self);
}

/// Constructs the engine matching the book's format tag
///
/// The returned engine is in the `Uninitialized` phase; call
/// [ReaderEngine::initialize] to start the session.
pub fn open_book(book: Book) -> Result<Box<dyn ReaderEngine>, ReaderError> {
    match book.format {
        BookFormat::Epub => {
            let file = File::open(&book.path)?;
            Ok(Box::new(EpubReaderEngine::from_reader(
                book,
                BufReader::new(file),
            )))
        }
        BookFormat::PlainText => {
            let bytes = std::fs::read(&book.path)?;
            Ok(Box::new(PlainTextReaderEngine::from_bytes(
                book,
                bytes,
                ReaderConfig::default(),
            )))
        }
    }
}

/// Format-independent session bookkeeping shared by the engines:
/// current position, chapter list, content cache and the published
/// state snapshot.
#[derive(Debug)]
struct EngineCore {
    book: Book,
    state: EngineState,
    chapters: Vec<ChapterEntry>,
    cache: ContentCache,
    total_pages: usize,
    current_page: usize,
    closed: bool,
}

impl EngineCore {
    fn new(book: Book) -> Self {
        Self {
            state: EngineState::uninitialized(book.clone()),
            book,
            chapters: Vec::new(),
            cache: ContentCache::new(),
            total_pages: 0,
            current_page: 0,
            closed: false,
        }
    }

    fn is_ready(&self) -> bool {
        !self.closed && self.state.phase == EnginePhase::Ready
    }

    fn ensure_open(&self) -> Result<(), ReaderError> {
        if self.closed {
            Err(ReaderError::EngineClosed)
        } else {
            Ok(())
        }
    }

    fn ensure_ready(&self) -> Result<(), ReaderError> {
        self.ensure_open()?;
        if self.state.phase == EnginePhase::Ready {
            Ok(())
        } else {
            Err(ReaderError::NotInitialized)
        }
    }

    fn reading_progress(&self) -> f64 {
        if self.total_pages == 0 {
            0.0
        } else {
            self.current_page as f64 / self.total_pages as f64
        }
    }

    /// Builds and publishes a complete state snapshot. Every
    /// transition funnels through here or one of the variants below,
    /// so observers can never see a half-written state.
    fn publish(&mut self, phase: EnginePhase, error: Option<String>) {
        self.state = EngineState {
            phase,
            is_loading: phase == EnginePhase::Loading,
            current_page: self.current_page,
            total_pages: self.total_pages,
            current_chapter: chapters::chapter_for_page(&self.chapters, self.current_page),
            total_chapters: self.chapters.len(),
            reading_progress: self.reading_progress(),
            error,
            book: self.book.clone(),
        };
    }

    fn publish_loading(&mut self) {
        self.publish(EnginePhase::Loading, None);
    }

    fn publish_ready(&mut self) {
        self.publish(EnginePhase::Ready, None);
    }

    fn publish_fatal(&mut self, message: String) {
        self.publish(EnginePhase::Error, Some(message));
    }

    fn navigate(&mut self, direction: PageTurn) -> usize {
        if !self.is_ready() {
            return self.current_page;
        }

        let last_page = self.total_pages.saturating_sub(1);
        self.current_page = match direction {
            PageTurn::Next => (self.current_page + 1).min(last_page),
            PageTurn::Previous => self.current_page.saturating_sub(1),
        };

        self.publish_ready();
        self.current_page
    }

    fn go_to_page(&mut self, page_index: usize) -> usize {
        if !self.is_ready() {
            return self.current_page;
        }

        self.current_page = page_index.min(self.total_pages.saturating_sub(1));
        self.publish_ready();
        self.current_page
    }

    fn go_to_chapter(&mut self, chapter_index: usize) -> usize {
        match self.chapters.get(chapter_index) {
            Some(chapter) => {
                let start = chapter.start_position;
                self.go_to_page(start)
            }
            None => self.current_page,
        }
    }

    fn current_chapter_title(&self) -> Option<String> {
        let index = chapters::chapter_for_page(&self.chapters, self.current_page);
        self.chapters.get(index).map(|chapter| chapter.title.clone())
    }

    /// The page range `[start, end)` of a chapter; the last chapter is
    /// open-ended on the right.
    fn chapter_page_range(&self, chapter_index: usize) -> Option<(usize, usize)> {
        let chapter = self.chapters.get(chapter_index)?;
        let end = self
            .chapters
            .get(chapter_index + 1)
            .map(|next| next.start_position)
            .unwrap_or(self.total_pages);

        Some((chapter.start_position, end.max(chapter.start_position)))
    }

    fn save_reading_progress(&mut self, store: &mut dyn ProgressStore) {
        if self.closed {
            return;
        }
        store.update_reading_progress(&self.book.id, self.current_page, self.reading_progress());
    }

    fn close(&mut self) {
        self.closed = true;
        self.cache.clear();
    }
}

/// Reader engine for zip-based packaged books.
pub struct EpubReaderEngine<R: Read + Seek> {
    core: EngineCore,
    source: Option<R>,
    archive: Option<ZipArchive<R>>,
    doc: Option<PackageDoc>,
}

impl<R: Read + Seek + Send> EpubReaderEngine<R> {
    /// Creates an engine over any seekable reader, usually a buffered
    /// file. Nothing is parsed until `initialize`.
    pub fn from_reader(book: Book, source: R) -> Self {
        Self {
            core: EngineCore::new(book),
            source: Some(source),
            archive: None,
            doc: None,
        }
    }

    fn page_content(&mut self, page_index: usize) -> Result<PageContent, ReaderError> {
        self.core.ensure_ready()?;
        let doc = self.doc.as_ref().ok_or(ReaderError::NotInitialized)?;

        let core = &mut self.core;
        let book = &core.book;
        let chapters = &core.chapters;
        core.cache
            .get_or_insert_with(page_index, || {
                pagination::render_packaged_page(doc, book, page_index, chapters)
            })
            .cloned()
    }
}

impl<R: Read + Seek + Send> ReaderEngine for EpubReaderEngine<R> {
    fn initialize(&mut self, start_page: usize) -> Result<(), ReaderError> {
        self.core.ensure_open()?;
        self.core.publish_loading();

        // The archive is opened once per engine; a re-initialize after
        // an error reuses the existing handle.
        if self.archive.is_none() {
            let mut source = self.source.take().ok_or(ReaderError::EngineClosed)?;

            // Probe against a borrow first, so a source that fails to
            // open as an archive is handed back and a later initialize
            // attempt reports the archive error again instead of
            // looking closed.
            if let Err(err) = ZipArchive::new(&mut source) {
                self.source = Some(source);
                let err = ReaderError::from(err);
                self.core.publish_fatal(err.to_string());
                return Err(err);
            }

            match ZipArchive::new(source) {
                Ok(archive) => self.archive = Some(archive),
                Err(err) => {
                    let err = ReaderError::from(err);
                    self.core.publish_fatal(err.to_string());
                    return Err(err);
                }
            }
        }

        let archive = match self.archive.as_mut() {
            Some(archive) => archive,
            None => return Err(ReaderError::EngineClosed),
        };

        let doc = match PackageDoc::parse(archive) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("initialization failed for \"{}\": {err}", self.core.book.id);
                self.core.publish_fatal(err.to_string());
                return Err(err);
            }
        };

        // Fill display metadata the repository did not have yet.
        if self.core.book.title.trim().is_empty() {
            if let Some(title) = &doc.title {
                self.core.book.title = title.clone();
            }
        }
        if self.core.book.author.trim().is_empty() {
            if let Some(author) = &doc.author {
                self.core.book.author = author.clone();
            }
        }

        self.core.chapters = chapters::packaged_chapters(&doc);
        self.core.total_pages = pagination::packaged_total_pages(&doc);
        self.core.current_page = start_page.min(self.core.total_pages.saturating_sub(1));
        self.core.cache.clear();
        self.doc = Some(doc);

        debug!(
            "book \"{}\" ready: {} pages, {} chapters",
            self.core.book.id,
            self.core.total_pages,
            self.core.chapters.len()
        );
        self.core.publish_ready();
        Ok(())
    }

    fn load_content(&mut self) -> Result<(), ReaderError> {
        let page_index = self.core.current_page;
        self.page_content(page_index).map(|_| ())
    }

    fn current_page_content(&mut self) -> Result<PageContent, ReaderError> {
        self.page_content(self.core.current_page)
    }

    fn current_chapter_title(&self) -> Option<String> {
        self.core.current_chapter_title()
    }

    fn current_page_text(&mut self) -> Result<String, ReaderError> {
        Ok(self.current_page_content()?.text)
    }

    fn current_chapter_text(&mut self) -> Result<String, ReaderError> {
        self.core.ensure_ready()?;

        let chapter_index = chapters::chapter_for_page(&self.core.chapters, self.core.current_page);
        let (start, end) = self
            .core
            .chapter_page_range(chapter_index)
            .unwrap_or((self.core.current_page, self.core.current_page + 1));

        let mut text = String::new();
        for page_index in start..end {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.page_content(page_index)?.text);
        }
        Ok(text)
    }

    fn has_next_page(&self) -> bool {
        self.core.is_ready() && self.core.current_page + 1 < self.core.total_pages
    }

    fn navigate_page(&mut self, direction: PageTurn) -> usize {
        self.core.navigate(direction)
    }

    fn go_to_page(&mut self, page_index: usize) -> usize {
        self.core.go_to_page(page_index)
    }

    fn go_to_chapter(&mut self, chapter_index: usize) -> usize {
        self.core.go_to_chapter(chapter_index)
    }

    fn chapters(&self) -> &[ChapterEntry] {
        &self.core.chapters
    }

    fn reading_progress(&self) -> f64 {
        self.core.reading_progress()
    }

    fn update_config(&mut self, _config: ReaderConfig) -> Result<(), ReaderError> {
        // Packaged pagination is fixed by spine length; nothing to redo.
        self.core.ensure_open()
    }

    fn save_reading_progress(&mut self, store: &mut dyn ProgressStore) {
        self.core.save_reading_progress(store);
    }

    fn search(&mut self, query: &str) -> Vec<SearchHit> {
        if self.core.ensure_ready().is_err() {
            return Vec::new();
        }

        let total_pages = self.core.total_pages;
        let chapter_list = self.core.chapters.clone();
        search::search(total_pages, query, &chapter_list, |page_index| {
            self.page_content(page_index).ok().map(|page| page.text)
        })
    }

    fn cover_image(&self) -> Option<(Vec<u8>, String)> {
        self.doc
            .as_ref()?
            .cover_image()
            .map(|(_, resource)| (resource.data.clone(), resource.mime.clone()))
    }

    fn supply_text(
        &mut self,
        scope: TextScope,
        sink: &mut dyn SpeechSink,
    ) -> Result<(), ReaderError> {
        let text = match scope {
            TextScope::Page => self.current_page_text()?,
            TextScope::Chapter => self.current_chapter_text()?,
        };
        sink.accept_text(&text);
        Ok(())
    }

    fn state(&self) -> EngineState {
        self.core.state.clone()
    }

    fn close(&mut self) {
        self.core.close();
        self.doc = None;
        self.archive = None;
        self.source = None;
    }
}

/// Reader engine for plain-text books.
pub struct PlainTextReaderEngine {
    core: EngineCore,
    raw: Vec<u8>,
    config: ReaderConfig,
    pages: Vec<String>,
}

impl PlainTextReaderEngine {
    /// Creates an engine over raw file bytes. Nothing is decoded or
    /// paginated until `initialize`.
    pub fn from_bytes(book: Book, raw: Vec<u8>, config: ReaderConfig) -> Self {
        Self {
            core: EngineCore::new(book),
            raw,
            config,
            pages: Vec::new(),
        }
    }

    fn repaginate(&mut self) {
        let text = xml::decode_text(&self.raw);
        self.pages = pagination::paginate_text(&text, &self.config);

        let fallback_title = if self.core.book.title.trim().is_empty() {
            "Full Text"
        } else {
            &self.core.book.title
        };
        self.core.chapters = chapters::plain_text_chapters(&self.pages, fallback_title);
        self.core.total_pages = self.pages.len();
        self.core.cache.clear();
    }

    fn page_content(&mut self, page_index: usize) -> Result<PageContent, ReaderError> {
        self.core.ensure_ready()?;

        let core = &mut self.core;
        let pages = &self.pages;
        let chapters = &core.chapters;
        core.cache
            .get_or_insert_with(page_index, || {
                pagination::render_plain_page(pages, page_index, chapters)
            })
            .cloned()
    }
}

impl ReaderEngine for PlainTextReaderEngine {
    fn initialize(&mut self, start_page: usize) -> Result<(), ReaderError> {
        self.core.ensure_open()?;
        self.core.publish_loading();

        self.repaginate();
        self.core.current_page = start_page.min(self.core.total_pages.saturating_sub(1));

        debug!(
            "book \"{}\" ready: {} pages, {} chapters",
            self.core.book.id,
            self.core.total_pages,
            self.core.chapters.len()
        );
        self.core.publish_ready();
        Ok(())
    }

    fn load_content(&mut self) -> Result<(), ReaderError> {
        let page_index = self.core.current_page;
        self.page_content(page_index).map(|_| ())
    }

    fn current_page_content(&mut self) -> Result<PageContent, ReaderError> {
        self.page_content(self.core.current_page)
    }

    fn current_chapter_title(&self) -> Option<String> {
        self.core.current_chapter_title()
    }

    fn current_page_text(&mut self) -> Result<String, ReaderError> {
        Ok(self.current_page_content()?.text)
    }

    fn current_chapter_text(&mut self) -> Result<String, ReaderError> {
        self.core.ensure_ready()?;

        let chapter_index = chapters::chapter_for_page(&self.core.chapters, self.core.current_page);
        let (start, end) = self
            .core
            .chapter_page_range(chapter_index)
            .unwrap_or((self.core.current_page, self.core.current_page + 1));

        let mut text = String::new();
        for page_index in start..end {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.page_content(page_index)?.text);
        }
        Ok(text)
    }

    fn has_next_page(&self) -> bool {
        self.core.is_ready() && self.core.current_page + 1 < self.core.total_pages
    }

    fn navigate_page(&mut self, direction: PageTurn) -> usize {
        self.core.navigate(direction)
    }

    fn go_to_page(&mut self, page_index: usize) -> usize {
        self.core.go_to_page(page_index)
    }

    fn go_to_chapter(&mut self, chapter_index: usize) -> usize {
        self.core.go_to_chapter(chapter_index)
    }

    fn chapters(&self) -> &[ChapterEntry] {
        &self.core.chapters
    }

    fn reading_progress(&self) -> f64 {
        self.core.reading_progress()
    }

    /// Re-runs pagination under the new configuration. Page
    /// boundaries shift, so the reading-progress fraction is
    /// preserved instead of the absolute page index.
    fn update_config(&mut self, config: ReaderConfig) -> Result<(), ReaderError> {
        self.core.ensure_open()?;
        if self.config == config {
            return Ok(());
        }
        self.config = config;

        if !self.core.is_ready() {
            return Ok(());
        }

        let fraction = self.core.reading_progress();
        self.repaginate();

        let last_page = self.core.total_pages.saturating_sub(1);
        let projected = (fraction * self.core.total_pages as f64).round() as usize;
        self.core.current_page = projected.min(last_page);

        self.core.publish_ready();
        Ok(())
    }

    fn save_reading_progress(&mut self, store: &mut dyn ProgressStore) {
        self.core.save_reading_progress(store);
    }

    fn search(&mut self, query: &str) -> Vec<SearchHit> {
        if self.core.ensure_ready().is_err() {
            return Vec::new();
        }

        search::search(
            self.pages.len(),
            query,
            &self.core.chapters,
            |page_index| self.pages.get(page_index).cloned(),
        )
    }

    fn cover_image(&self) -> Option<(Vec<u8>, String)> {
        None
    }

    fn supply_text(
        &mut self,
        scope: TextScope,
        sink: &mut dyn SpeechSink,
    ) -> Result<(), ReaderError> {
        let text = match scope {
            TextScope::Page => self.current_page_text()?,
            TextScope::Chapter => self.current_chapter_text()?,
        };
        sink.accept_text(&text);
        Ok(())
    }

    fn state(&self) -> EngineState {
        self.core.state.clone()
    }

    fn close(&mut self) {
        self.core.close();
        self.pages.clear();
        self.raw.clear();
    }
}
