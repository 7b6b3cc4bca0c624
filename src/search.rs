//! Linear substring search over paginated content
//!
//! The search walks every page in order and reports at most one hit
//! per page: the first case-insensitive occurrence of the query, with
//! a snippet window around the match. Multiple occurrences within one
//! page are not separately reported; that is a documented limitation,
//! not an accident.
//!
//! All offsets are character offsets, so highlight positions remain
//! meaningful for multi-byte scripts.

use crate::types::{ChapterEntry, SearchHit};

/// Characters of context kept on each side of a match, clipped at the
/// page boundaries.
pub const SNIPPET_RADIUS: usize = 20;

/// Searches the paginated book for a query
///
/// `text_for_page` supplies the plain text of a page; returning `None`
/// skips that page (a page that fails to render must not abort the
/// rest of the search). An empty query returns an empty result list.
///
/// ## Parameters
/// - `total_pages`: Number of pages to scan
/// - `query`: The text to look for, matched case-insensitively
/// - `chapters`: Chapter list used to tag each hit
/// - `text_for_page`: Supplier of page text by page index
pub fn search<F>(
    total_pages: usize,
    query: &str,
    chapters: &[ChapterEntry],
    mut text_for_page: F,
) -> Vec<SearchHit>
where
    F: FnMut(usize) -> Option<String>,
{
    if query.is_empty() {
        return Vec::new();
    }

    let needle: Vec<char> = query.chars().collect();
    let mut hits = Vec::new();

    for page_index in 0..total_pages {
        let Some(text) = text_for_page(page_index) else {
            continue;
        };

        if let Some(hit) = match_in_page(&text, &needle, page_index, chapters) {
            hits.push(hit);
        }
    }

    hits
}

/// Finds the first occurrence of the needle on one page.
fn match_in_page(
    text: &str,
    needle: &[char],
    page_index: usize,
    chapters: &[ChapterEntry],
) -> Option<SearchHit> {
    let haystack: Vec<char> = text.chars().collect();
    let position = find_case_insensitive(&haystack, needle)?;

    let snippet_start = position.saturating_sub(SNIPPET_RADIUS);
    let snippet_end = (position + needle.len() + SNIPPET_RADIUS).min(haystack.len());

    Some(SearchHit {
        page_index,
        chapter_index: crate::chapters::chapter_for_page(chapters, page_index),
        snippet: haystack[snippet_start..snippet_end].iter().collect(),
        highlight_start: position - snippet_start,
        highlight_end: position - snippet_start + needle.len(),
    })
}

fn find_case_insensitive(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    (0..=haystack.len() - needle.len()).find(|&start| {
        haystack[start..start + needle.len()]
            .iter()
            .zip(needle)
            .all(|(h, n)| h.to_lowercase().eq(n.to_lowercase()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_pages(pages: &[&str], query: &str) -> Vec<SearchHit> {
        search(pages.len(), query, &[], |index| {
            pages.get(index).map(|page| page.to_string())
        })
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        assert!(search_pages(&["some text"], "").is_empty());
    }

    #[test]
    fn test_case_insensitive_match() {
        let hits = search_pages(&["The QUICK brown fox"], "quick");

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.page_index, 0);
        assert_eq!(
            &hit.snippet[hit.highlight_start..hit.highlight_end].to_lowercase(),
            "quick"
        );
    }

    /// A match near the page start clips the snippet on the left, so
    /// the highlight starts at `min(offset, SNIPPET_RADIUS)`.
    #[test]
    fn test_highlight_offset_follows_snippet_window() {
        let page = format!("{}needle{}", "a".repeat(50), "b".repeat(50));
        let hits = search_pages(&[&page], "needle");
        assert_eq!(hits[0].highlight_start, SNIPPET_RADIUS);
        assert_eq!(hits[0].snippet.chars().count(), SNIPPET_RADIUS * 2 + 6);

        let hits = search_pages(&["abc needle tail"], "needle");
        assert_eq!(hits[0].highlight_start, 4);
        assert_eq!(hits[0].highlight_end, 10);
    }

    #[test]
    fn test_one_hit_per_page() {
        let hits = search_pages(&["fox and fox and fox", "no match", "fox"], "fox");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].page_index, 0);
        assert_eq!(hits[1].page_index, 2);
    }

    /// Offsets are character based, so multi-byte text highlights
    /// correctly.
    #[test]
    fn test_multibyte_offsets() {
        let hits = search_pages(&["第1章 开始之前的文字"], "开始");

        assert_eq!(hits[0].highlight_start, 4);
        assert_eq!(hits[0].highlight_end, 6);
        let highlighted: String = hits[0]
            .snippet
            .chars()
            .skip(hits[0].highlight_start)
            .take(2)
            .collect();
        assert_eq!(highlighted, "开始");
    }

    #[test]
    fn test_unrenderable_page_is_skipped() {
        let hits = search(3, "x", &[], |index| {
            (index != 1).then(|| "x marks".to_string())
        });
        assert_eq!(hits.len(), 2);
    }
}
