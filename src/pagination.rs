//! Page synthesis for both book formats
//!
//! A packaged book already has page-sized units: page 0 is a
//! synthesized cover and every following page maps one-to-one onto a
//! spine entry. Rendering a packaged page is therefore a content
//! transform, not a split: intra-document image and stylesheet
//! references are resolved against the unit's own path and substituted
//! in place, and a plain-text form is extracted for search and speech.
//!
//! A plain-text book has no native page concept at all, so pages are
//! synthesized by character budget. The paginator is a pure function
//! of the source text and the [ReaderConfig]; the same inputs always
//! produce the same page list.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::warn;

use crate::{
    chapters,
    error::ReaderError,
    package::PackageDoc,
    resolver::{self, ResourceTable},
    types::{Book, ChapterEntry, PageContent, ReaderConfig},
    xml,
};

/// Indent prepended to a paragraph's first line when the paragraph
/// continues a page rather than opening one.
pub const PARAGRAPH_INDENT: &str = "  ";

/// Total page count of a packaged book: one synthetic cover page plus
/// one page per spine unit.
pub fn packaged_total_pages(doc: &PackageDoc) -> usize {
    doc.spine.len() + 1
}

/// Renders one page of a packaged book
///
/// Page 0 is the synthesized cover. Pages `1..=spine_len` render the
/// spine unit at `page_index - 1`, with image references embedded as
/// data URIs and stylesheet links inlined; references that fail to
/// resolve are left untouched, never fatal.
///
/// ## Return
/// - `Ok(PageContent)`: The rendered page
/// - `Err(ReaderError)`: `page_index` is past the end, which clamped
///   navigation never produces
pub fn render_packaged_page(
    doc: &PackageDoc,
    book: &Book,
    page_index: usize,
    chapters: &[ChapterEntry],
) -> Result<PageContent, ReaderError> {
    let total_pages = packaged_total_pages(doc);
    if page_index >= total_pages {
        return Err(ReaderError::PageOutOfRange { page: page_index });
    }

    let (text, markup) = if page_index == 0 {
        cover_content(doc, book)
    } else {
        let unit = &doc.spine[page_index - 1];
        let source = xml::decode_text(&unit.data);
        (
            strip_markup(&source),
            embed_references(&source, &unit.path, &doc.resources),
        )
    };

    Ok(PageContent {
        text,
        markup: Some(markup),
        page_index,
        chapter_index: chapters::chapter_for_page(chapters, page_index),
        is_first_page: page_index == 0,
        is_last_page: page_index + 1 == total_pages,
    })
}

/// Renders one page of a paginated plain-text book.
pub fn render_plain_page(
    pages: &[String],
    page_index: usize,
    chapters: &[ChapterEntry],
) -> Result<PageContent, ReaderError> {
    let text = pages
        .get(page_index)
        .ok_or(ReaderError::PageOutOfRange { page: page_index })?;

    Ok(PageContent {
        text: text.clone(),
        markup: None,
        page_index,
        chapter_index: chapters::chapter_for_page(chapters, page_index),
        is_first_page: page_index == 0,
        is_last_page: page_index + 1 == pages.len(),
    })
}

/// Synthesizes the cover page content
///
/// Renders the book's cover image (manifest `cover-image` property, or
/// the first image resource) overlaid with the title; a book without
/// any image gets a title and author placeholder.
fn cover_content(doc: &PackageDoc, book: &Book) -> (String, String) {
    let title = non_empty(&book.title).or(doc.title.as_deref()).unwrap_or("Untitled");
    let author = non_empty(&book.author).or(doc.author.as_deref()).unwrap_or("");

    let markup = match doc.cover_image() {
        Some((_, resource)) => format!(
            "<div class=\"cover\"><img src=\"data:{};base64,{}\" alt=\"{}\"/><h1>{}</h1></div>",
            resource.mime,
            BASE64.encode(&resource.data),
            title,
            title,
        ),
        None => format!("<div class=\"cover\"><h1>{title}</h1><p>{author}</p></div>"),
    };

    let text = format!("{title}\n{author}").trim_end().to_string();
    (text, markup)
}

fn non_empty(text: &str) -> Option<&str> {
    (!text.trim().is_empty()).then_some(text)
}

/// Substitutes intra-document references in content markup
///
/// Stylesheet `<link>` elements whose href resolves to a stylesheet in
/// the resource table are replaced by inline `<style>` elements, and
/// `src` attribute values resolving to image resources are replaced by
/// base64 data URIs. A reference that fails to resolve stays as
/// written; the page still renders without its embed.
pub fn embed_references(source: &str, base_path: &str, resources: &ResourceTable) -> String {
    let inlined = inline_stylesheets(source, base_path, resources);
    embed_images(&inlined, base_path, resources)
}

fn inline_stylesheets(source: &str, base_path: &str, resources: &ResourceTable) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("<link") {
        let Some(length) = rest[start..].find('>') else {
            break;
        };
        let element = &rest[start..start + length + 1];
        out.push_str(&rest[..start]);

        let inline = attr_value(element, "href")
            .map(|href| resolver::resolve(href, base_path))
            .and_then(|path| {
                resources
                    .lookup(&path)
                    .filter(|resource| resource.is_stylesheet(&path))
                    .map(|resource| xml::decode_text(&resource.data))
            });

        match inline {
            Some(css) => {
                out.push_str("<style>");
                out.push_str(&css);
                out.push_str("</style>");
            }
            None => out.push_str(element),
        }

        rest = &rest[start + length + 1..];
    }

    out.push_str(rest);
    out
}

fn embed_images(source: &str, base_path: &str, resources: &ResourceTable) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(position) = rest.find("src=") {
        let value_start = position + "src=".len();
        let Some(quote) = rest[value_start..].chars().next().filter(|c| *c == '"' || *c == '\'')
        else {
            out.push_str(&rest[..value_start]);
            rest = &rest[value_start..];
            continue;
        };

        let Some(value_length) = rest[value_start + 1..].find(quote) else {
            break;
        };
        let value = &rest[value_start + 1..value_start + 1 + value_length];

        out.push_str(&rest[..value_start + 1]);

        let path = resolver::resolve(value, base_path);
        match resources.lookup(&path).filter(|r| r.is_image(&path)) {
            Some(resource) => {
                out.push_str(&format!(
                    "data:{};base64,{}",
                    resource.mime,
                    BASE64.encode(&resource.data)
                ));
            }
            None => out.push_str(value),
        }

        out.push(quote);
        rest = &rest[value_start + 1 + value_length + 1..];
    }

    out.push_str(rest);
    out
}

/// Extracts the quoted value of an attribute from raw element text.
fn attr_value<'a>(element: &'a str, name: &str) -> Option<&'a str> {
    let position = element.find(&format!("{name}="))?;
    let after = &element[position + name.len() + 1..];
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &after[1..];
    let end = value.find(quote)?;
    Some(&value[..end])
}

/// Extracts plain text from content markup
///
/// Drops the head, scripts and styles, breaks lines at block-level
/// elements, strips every remaining tag and decodes the common
/// character entities. Good enough for search, speech and progress
/// display; layout fidelity is the renderer's concern, not ours.
pub fn strip_markup(source: &str) -> String {
    let mut cleaned = source.to_string();
    for block in ["head", "script", "style"] {
        cleaned = remove_element_blocks(&cleaned, block);
    }

    const LINE_BREAKERS: [&str; 12] = [
        "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    ];

    let mut out = String::with_capacity(cleaned.len());
    let mut rest = cleaned.as_str();

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let Some(length) = rest[start..].find('>') else {
            break;
        };

        let tag = rest[start + 1..start + length]
            .trim_start_matches('/')
            .split([' ', '/', '\t', '\n'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if LINE_BREAKERS.contains(&tag.as_str()) && !out.ends_with('\n') {
            out.push('\n');
        }

        rest = &rest[start + length + 1..];
    }
    out.push_str(rest);

    let decoded = decode_entities(&out);

    // Collapse the indentation whitespace of pretty-printed markup
    // while keeping paragraph breaks.
    decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn remove_element_blocks(source: &str, name: &str) -> String {
    let open = format!("<{name}");
    let close = format!("</{name}>");

    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find(&open) {
        out.push_str(&rest[..start]);
        match rest[start..].find(&close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let Some(length) = tail.find(';').filter(|length| *length <= 8) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };

        let entity = &tail[1..length];
        let replacement = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match replacement {
            Some(ch) => out.push(ch),
            None => out.push_str(&tail[..length + 1]),
        }

        rest = &tail[length + 1..];
    }

    out.push_str(rest);
    out
}

/// Paginates plain text by character budget
///
/// The source text is split into paragraphs on line breaks, then
/// paragraphs are packed greedily into page buffers of
/// `config.chars_per_page()` characters. A blank paragraph costs one
/// line of budget; a paragraph that does not open a fresh page has its
/// first line indented. When the budget runs out mid-paragraph the
/// buffer is flushed and the paragraph continues, unindented, on the
/// next page.
///
/// The result always contains at least one page, so navigation always
/// has somewhere to stand.
pub fn paginate_text(text: &str, config: &ReaderConfig) -> Vec<String> {
    let chars_per_line = config.chars_per_line();
    let chars_per_page = config.chars_per_page();
    let indent_cost = PARAGRAPH_INDENT.chars().count();

    let mut pages = Vec::new();
    let mut buffer = String::new();
    let mut used = 0usize;

    fn flush(pages: &mut Vec<String>, buffer: &mut String, used: &mut usize) {
        if !buffer.is_empty() {
            pages.push(std::mem::take(buffer));
        }
        *used = 0;
    }

    for paragraph in text.lines() {
        let paragraph = paragraph.trim_end();

        if paragraph.trim().is_empty() {
            // A blank line at the top of a page carries no information.
            if used == 0 {
                continue;
            }
            buffer.push('\n');
            used += chars_per_line;
            if used >= chars_per_page {
                flush(&mut pages, &mut buffer, &mut used);
            }
            continue;
        }

        if used > 0 {
            buffer.push_str(PARAGRAPH_INDENT);
            used += indent_cost;
        }

        for ch in paragraph.chars() {
            if used >= chars_per_page {
                flush(&mut pages, &mut buffer, &mut used);
            }
            buffer.push(ch);
            used += 1;
        }

        buffer.push('\n');
        // The line break ends the current display line.
        used = used.div_ceil(chars_per_line).max(1) * chars_per_line;

        if used >= chars_per_page {
            flush(&mut pages, &mut buffer, &mut used);
        }
    }

    if !buffer.is_empty() {
        pages.push(buffer);
    }
    if pages.is_empty() {
        warn!("pagination produced no pages, substituting a single empty page");
        pages.push(String::new());
    }

    pages
}
