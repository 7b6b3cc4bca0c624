//! Chapter list derivation and page-to-chapter lookup
//!
//! Every book gets an ordered chapter list, whatever its format gives
//! us to work with. A packaged book derives it from the navigation
//! entries (or from the spine when no usable navigation document
//! exists); a plain-text book gets a heuristic scan of page-leading
//! heading patterns. Both paths uphold the same invariant: entries are
//! ordered by `start_position` ascending, which makes the page lookup
//! a binary search.

use crate::{
    package::PackageDoc,
    types::ChapterEntry,
};

/// Character offset threshold for heading detection: a pattern must
/// appear within the first 10 characters of the trimmed page.
const HEADING_OFFSET_LIMIT: usize = 10;

/// Builds the chapter list of a packaged book
///
/// Navigation entries are mapped to page indices by resolving each
/// href to its spine position and shifting by one for the synthetic
/// cover page. An entry whose reference cannot be resolved keeps the
/// first content page as its start; the miss itself is logged by the
/// resolver. When the book has no navigation entries at all, one
/// chapter is synthesized per spine member, titled from the manifest
/// or by ordinal.
pub fn packaged_chapters(doc: &PackageDoc) -> Vec<ChapterEntry> {
    let mut chapters: Vec<ChapterEntry> = doc
        .nav_entries
        .iter()
        .enumerate()
        .map(|(ordinal, entry)| {
            let spine_index = entry
                .href
                .as_deref()
                .and_then(|href| doc.find_content_unit_index(href));

            let title = if entry.label.is_empty() {
                format!("Chapter {}", ordinal + 1)
            } else {
                entry.label.clone()
            };

            ChapterEntry {
                title,
                index: 0,
                // Page 0 is the synthetic cover, spine unit N is page N + 1.
                start_position: spine_index.unwrap_or(0) + 1,
                depth: entry.depth,
            }
        })
        .collect();

    if chapters.is_empty() {
        chapters = doc
            .spine
            .iter()
            .enumerate()
            .map(|(spine_index, unit)| ChapterEntry {
                title: unit
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("Chapter {}", spine_index + 1)),
                index: 0,
                start_position: spine_index + 1,
                depth: 0,
            })
            .collect();
    }

    finish(chapters)
}

/// Builds the chapter list of a paginated plain-text book
///
/// Scans each page for a heading at its start; a page opening with a
/// recognized chapter marker becomes a chapter boundary titled with
/// that heading line. This is a best-effort heuristic: real books will
/// occasionally start a page mid-sentence on something that looks like
/// a heading, or put a heading past the scan window. A book with no
/// detected headings becomes a single chapter titled `fallback_title`.
pub fn plain_text_chapters(pages: &[String], fallback_title: &str) -> Vec<ChapterEntry> {
    let mut chapters: Vec<ChapterEntry> = pages
        .iter()
        .enumerate()
        .filter_map(|(page_index, page)| {
            detect_heading(page).map(|title| ChapterEntry {
                title,
                index: 0,
                start_position: page_index,
                depth: 0,
            })
        })
        .collect();

    if chapters.is_empty() && !pages.is_empty() {
        chapters.push(ChapterEntry {
            title: fallback_title.to_string(),
            index: 0,
            start_position: 0,
            depth: 0,
        });
    }

    finish(chapters)
}

/// Restores the ordering invariant and assigns ordinals.
fn finish(mut chapters: Vec<ChapterEntry>) -> Vec<ChapterEntry> {
    chapters.sort_by_key(|chapter| chapter.start_position);
    for (ordinal, chapter) in chapters.iter_mut().enumerate() {
        chapter.index = ordinal;
    }
    chapters
}

/// Returns the chapter owning the given page
///
/// Binary search over the `start_position`-ascending list for the
/// greatest index whose start is at or before `page_index`; the last
/// chapter is open-ended on the right. Returns 0 for an empty list or
/// a page before the first chapter start. Never panics.
pub fn chapter_for_page(chapters: &[ChapterEntry], page_index: usize) -> usize {
    chapters
        .partition_point(|chapter| chapter.start_position <= page_index)
        .saturating_sub(1)
}

/// Detects a chapter heading at the start of a page
///
/// The trimmed page must open with a heading pattern within the first
/// [HEADING_OFFSET_LIMIT] characters: a CJK numbered marker
/// (`第…章/节/卷/部/回/篇`) or a western `Chapter N` / `Part N` /
/// `Section N`. The matched page's first line, whitespace-trimmed, is
/// the chapter title.
fn detect_heading(page: &str) -> Option<String> {
    let trimmed = page.trim_start();
    let head: Vec<char> = trimmed
        .chars()
        .take(HEADING_OFFSET_LIMIT + 12)
        .collect();

    (0..head.len().min(HEADING_OFFSET_LIMIT + 1))
        .any(|offset| matches_heading(&head[offset..]))
        .then(|| {
            trimmed
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
}

fn matches_heading(chars: &[char]) -> bool {
    matches_cjk_marker(chars) || matches_western_marker(chars)
}

/// `第` + at least one numeral + a section character.
fn matches_cjk_marker(chars: &[char]) -> bool {
    const NUMERALS: &str = "0123456789〇一二三四五六七八九十百千两";
    const SECTIONS: [char; 6] = ['章', '节', '卷', '部', '回', '篇'];

    if chars.first() != Some(&'第') {
        return false;
    }

    let mut count = 0;
    for ch in &chars[1..] {
        if NUMERALS.contains(*ch) {
            count += 1;
        } else {
            return count > 0 && SECTIONS.contains(ch);
        }
    }

    false
}

/// `Chapter` / `Part` / `Section`, a space, then a digit.
fn matches_western_marker(chars: &[char]) -> bool {
    const MARKERS: [&str; 4] = ["Chapter ", "CHAPTER ", "Part ", "Section "];

    MARKERS.iter().any(|marker| {
        let marker_chars: Vec<char> = marker.chars().collect();
        chars.len() > marker_chars.len()
            && chars[..marker_chars.len()] == marker_chars[..]
            && chars[marker_chars.len()].is_ascii_digit()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(start_position: usize) -> ChapterEntry {
        ChapterEntry {
            title: format!("Chapter at {start_position}"),
            index: 0,
            start_position,
            depth: 0,
        }
    }

    mod lookup_tests {
        use super::*;

        #[test]
        fn test_chapter_for_page_picks_greatest_start_at_or_before() {
            let chapters = finish(vec![chapter(1), chapter(4), chapter(9)]);

            assert_eq!(chapter_for_page(&chapters, 0), 0);
            assert_eq!(chapter_for_page(&chapters, 1), 0);
            assert_eq!(chapter_for_page(&chapters, 3), 0);
            assert_eq!(chapter_for_page(&chapters, 4), 1);
            assert_eq!(chapter_for_page(&chapters, 8), 1);
            assert_eq!(chapter_for_page(&chapters, 9), 2);
            assert_eq!(chapter_for_page(&chapters, 1000), 2);
        }

        #[test]
        fn test_chapter_for_page_on_empty_list() {
            assert_eq!(chapter_for_page(&[], 5), 0);
        }

        /// The lookup must be monotonic non-decreasing in the page index.
        #[test]
        fn test_chapter_for_page_is_monotonic() {
            let chapters = finish(vec![chapter(0), chapter(3), chapter(3), chapter(7)]);

            let mut last = 0;
            for page in 0..20 {
                let current = chapter_for_page(&chapters, page);
                assert!(current >= last);
                last = current;
            }
        }
    }

    mod heading_tests {
        use super::*;

        #[test]
        fn test_cjk_heading_detection() {
            assert_eq!(detect_heading("第1章 开始\n正文"), Some("第1章 开始".to_string()));
            assert_eq!(detect_heading("第十二回 某事\n正文"), Some("第十二回 某事".to_string()));
            assert_eq!(detect_heading("  第2章 继续"), Some("第2章 继续".to_string()));
        }

        #[test]
        fn test_western_heading_detection() {
            assert_eq!(detect_heading("Chapter 7\nBody"), Some("Chapter 7".to_string()));
            assert_eq!(detect_heading("Part 2: The Middle"), Some("Part 2: The Middle".to_string()));
            assert_eq!(detect_heading("Section 3.1"), Some("Section 3.1".to_string()));
        }

        #[test]
        fn test_body_text_is_not_a_heading() {
            assert_eq!(detect_heading("He walked into the room."), None);
            assert_eq!(detect_heading("第章 missing numeral"), None);
            assert_eq!(detect_heading("Chapter without number"), None);
        }

        /// A marker past the offset limit is not a page heading.
        #[test]
        fn test_offset_limit_applies() {
            let page = "some long preamble text 第1章";
            assert_eq!(detect_heading(page), None);
        }

        #[test]
        fn test_plain_text_fallback_single_chapter() {
            let pages = vec!["just prose".to_string(), "more prose".to_string()];
            let chapters = plain_text_chapters(&pages, "My Book");

            assert_eq!(chapters.len(), 1);
            assert_eq!(chapters[0].title, "My Book");
            assert_eq!(chapters[0].start_position, 0);
        }
    }
}
