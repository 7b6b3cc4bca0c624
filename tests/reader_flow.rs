//! End-to-end reading sessions over in-memory packaged books.

use std::io::{Cursor, Write};
use std::path::PathBuf;

use zip::{ZipWriter, write::SimpleFileOptions};

use folio::{
    Book, BookFormat, EnginePhase, EpubReaderEngine, PageTurn, ReaderEngine, ReaderError,
    open_book,
};

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const PACKAGE: &str = r#"<?xml version="1.0"?>
<package version="3.0" xmlns="http://www.idpf.org/2007/opf">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>The Fixture</dc:title>
    <dc:creator>A. Author</dc:creator>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover" href="cover.png" media-type="image/png" properties="cover-image"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="c2"/>
  </spine>
</package>"#;

const NAV: &str = r#"<html xmlns:epub="http://www.idpf.org/2007/ops"><body>
  <nav epub:type="toc"><ol>
    <li><a href="c1.xhtml">One</a></li>
    <li><a href="c2.xhtml">Two</a></li>
  </ol></nav>
</body></html>"#;

const CHAPTER_ONE: &str =
    "<html><body><p>First chapter text.</p><p>It mentions a needle once.</p></body></html>";
const CHAPTER_TWO: &str = "<html><body><p>Second chapter text.</p></body></html>";

fn build_archive(entries: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }

    let mut cursor = writer.finish().unwrap();
    cursor.set_position(0);
    cursor
}

fn sample_archive() -> Cursor<Vec<u8>> {
    build_archive(&[
        ("META-INF/container.xml", CONTAINER.as_bytes()),
        ("OEBPS/content.opf", PACKAGE.as_bytes()),
        ("OEBPS/nav.xhtml", NAV.as_bytes()),
        ("OEBPS/c1.xhtml", CHAPTER_ONE.as_bytes()),
        ("OEBPS/c2.xhtml", CHAPTER_TWO.as_bytes()),
        ("OEBPS/cover.png", &[0x89, b'P', b'N', b'G']),
    ])
}

fn sample_book() -> Book {
    Book {
        id: "fixture-1".to_string(),
        path: PathBuf::from("/books/fixture.epub"),
        format: BookFormat::Epub,
        title: String::new(),
        author: String::new(),
        total_pages: 0,
        last_read_page: 0,
        last_read_position: 0.0,
    }
}

fn ready_engine() -> EpubReaderEngine<Cursor<Vec<u8>>> {
    let mut engine = EpubReaderEngine::from_reader(sample_book(), sample_archive());
    engine.initialize(0).unwrap();
    engine
}

#[test]
fn test_page_count_is_spine_length_plus_cover() {
    let engine = ready_engine();

    let state = engine.state();
    assert_eq!(state.phase, EnginePhase::Ready);
    assert_eq!(state.total_pages, 3);
    assert_eq!(state.total_chapters, 2);
}

#[test]
fn test_metadata_fills_empty_book_fields() {
    let engine = ready_engine();

    let book = engine.state().book;
    assert_eq!(book.title, "The Fixture");
    assert_eq!(book.author, "A. Author");
}

#[test]
fn test_cover_page_renders_first() {
    let mut engine = ready_engine();

    let page = engine.current_page_content().unwrap();
    assert!(page.is_first_page);
    assert!(page.text.contains("The Fixture"));
    assert!(
        page.markup
            .as_deref()
            .unwrap()
            .contains("data:image/png;base64,")
    );
}

#[test]
fn test_navigation_walks_and_clamps() {
    let mut engine = ready_engine();

    assert_eq!(engine.navigate_page(PageTurn::Previous), 0);
    assert_eq!(engine.navigate_page(PageTurn::Next), 1);
    assert_eq!(engine.navigate_page(PageTurn::Next), 2);
    assert_eq!(engine.navigate_page(PageTurn::Next), 2);
    assert!(!engine.has_next_page());

    let page = engine.current_page_content().unwrap();
    assert!(page.is_last_page);
    assert!(page.text.contains("Second chapter text."));
}

#[test]
fn test_chapter_navigation_uses_navigation_document() {
    let mut engine = ready_engine();

    let chapters = engine.chapters().to_vec();
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].title, "One");
    assert_eq!(chapters[0].start_position, 1);
    assert_eq!(chapters[1].title, "Two");
    assert_eq!(chapters[1].start_position, 2);

    assert_eq!(engine.go_to_chapter(1), 2);
    assert_eq!(engine.current_chapter_title().as_deref(), Some("Two"));
}

#[test]
fn test_search_reports_one_hit_per_page() {
    let mut engine = ready_engine();

    let hits = engine.search("chapter text");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].page_index, 1);
    assert_eq!(hits[0].chapter_index, 0);
    assert_eq!(hits[1].page_index, 2);
    assert_eq!(hits[1].chapter_index, 1);

    let hit = &hits[0];
    assert_eq!(
        &hit.snippet[hit.highlight_start..hit.highlight_end].to_lowercase(),
        "chapter text"
    );
}

#[test]
fn test_cover_image_is_exposed() {
    let engine = ready_engine();

    let (data, mime) = engine.cover_image().unwrap();
    assert_eq!(mime, "image/png");
    assert_eq!(data, vec![0x89, b'P', b'N', b'G']);
}

#[test]
fn test_missing_container_descriptor_is_fatal() {
    let archive = build_archive(&[("mimetype", b"application/epub+zip")]);
    let mut engine = EpubReaderEngine::from_reader(sample_book(), archive);

    let result = engine.initialize(0);
    assert!(matches!(
        result,
        Err(ReaderError::NonCanonicalArchive { .. })
    ));

    let state = engine.state();
    assert_eq!(state.phase, EnginePhase::Error);
    assert!(state.error.is_some());
}

#[test]
fn test_garbage_bytes_are_fatal() {
    let mut engine = EpubReaderEngine::from_reader(
        sample_book(),
        Cursor::new(b"this is not a zip archive".to_vec()),
    );

    assert!(engine.initialize(0).is_err());
    assert_eq!(engine.state().phase, EnginePhase::Error);
}

#[test]
fn test_initialize_can_be_retried_after_archive_error() {
    let mut engine = EpubReaderEngine::from_reader(
        sample_book(),
        Cursor::new(b"this is not a zip archive".to_vec()),
    );

    assert!(matches!(
        engine.initialize(0),
        Err(ReaderError::ArchiveError { .. })
    ));
    assert_eq!(engine.state().phase, EnginePhase::Error);

    // The engine was never closed, so a second attempt reports the
    // archive problem again rather than a closed engine.
    assert!(matches!(
        engine.initialize(0),
        Err(ReaderError::ArchiveError { .. })
    ));
    assert_eq!(engine.state().phase, EnginePhase::Error);
}

#[test]
fn test_missing_spine_target_leaves_book_usable() {
    // The spine references c1 and c2, but c2.xhtml is absent.
    let archive = build_archive(&[
        ("META-INF/container.xml", CONTAINER.as_bytes()),
        ("OEBPS/content.opf", PACKAGE.as_bytes()),
        ("OEBPS/nav.xhtml", NAV.as_bytes()),
        ("OEBPS/c1.xhtml", CHAPTER_ONE.as_bytes()),
        ("OEBPS/cover.png", &[0x89, b'P', b'N', b'G']),
    ]);
    let mut engine = EpubReaderEngine::from_reader(sample_book(), archive);
    engine.initialize(0).unwrap();

    let state = engine.state();
    assert_eq!(state.phase, EnginePhase::Ready);
    assert_eq!(state.total_pages, 2);

    assert_eq!(engine.go_to_page(1), 1);
    let page = engine.current_page_content().unwrap();
    assert!(page.text.contains("First chapter text."));
    assert!(page.is_last_page);
}

#[test]
fn test_close_ends_the_session_permanently() {
    let mut engine = ready_engine();
    engine.go_to_page(1);

    engine.close();
    engine.close();

    assert_eq!(engine.navigate_page(PageTurn::Next), 1);
    assert!(matches!(
        engine.current_page_content(),
        Err(ReaderError::NotInitialized) | Err(ReaderError::EngineClosed)
    ));
    assert!(matches!(
        engine.initialize(0),
        Err(ReaderError::EngineClosed)
    ));
}

#[test]
fn test_open_book_dispatches_plain_text() {
    let path = std::env::temp_dir().join("folio_reader_flow_fixture.txt");
    std::fs::write(&path, "Chapter 1\nSome plain text body.\n").unwrap();

    let book = Book {
        id: "plain-fixture".to_string(),
        path: path.clone(),
        format: BookFormat::PlainText,
        title: "Plain".to_string(),
        author: String::new(),
        total_pages: 0,
        last_read_page: 0,
        last_read_position: 0.0,
    };

    let mut engine = open_book(book).unwrap();
    engine.initialize(0).unwrap();

    let state = engine.state();
    assert_eq!(state.phase, EnginePhase::Ready);
    assert!(state.total_pages >= 1);
    assert!(
        engine
            .current_page_content()
            .unwrap()
            .text
            .contains("Chapter 1")
    );

    engine.close();
    std::fs::remove_file(&path).ok();
}
