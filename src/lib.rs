//! Book reader engine
//!
//! A Rust library implementing the reading core of an eBook
//! application: it opens a book file, parses and paginates it, indexes
//! its chapters and serves rendered pages, navigation, search and
//! reading-progress tracking to an embedding application.
//!
//! Two formats are supported. A packaged book (EPUB-style zip
//! container) is paginated one spine document per page behind a
//! synthetic cover page; a plain-text book is paginated by a character
//! budget derived from the rendering configuration. Both are driven
//! through the same [ReaderEngine] trait, so consumers never branch on
//! format.
//!
//! ## Quick Start
//!
//! ```rust, ignore
//! # use folio::{open_book, Book, BookFormat, PageTurn};
//! # fn main() -> Result<(), folio::ReaderError> {
//! let book = Book {
//!     id: "shelf-42".to_string(),
//!     path: "path/to/book.epub".into(),
//!     format: BookFormat::Epub,
//!     title: String::new(),
//!     author: String::new(),
//!     total_pages: 0,
//!     last_read_page: 0,
//!     last_read_position: 0.0,
//! };
//!
//! let mut engine = open_book(book)?;
//! engine.initialize(0)?;
//!
//! let page = engine.current_page_content()?;
//! println!("{}", page.text);
//! engine.navigate_page(PageTurn::Next);
//!
//! engine.close();
//! # Ok(())
//! # }
//! ```

pub(crate) mod xml;

pub mod cache;
pub mod chapters;
pub mod engine;
pub mod error;
pub mod package;
pub mod pagination;
pub mod resolver;
pub mod search;
pub mod types;

pub use engine::{
    EpubReaderEngine, PlainTextReaderEngine, ProgressStore, ReaderEngine, SpeechSink, open_book,
};
pub use error::ReaderError;
pub use types::{
    Book, BookFormat, ChapterEntry, ContentUnit, EnginePhase, EngineState, PageContent, PageTurn,
    ReaderConfig, SearchHit, TextScope,
};
