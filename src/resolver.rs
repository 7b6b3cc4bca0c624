//! Reference resolution for intra-document links
//!
//! Packaged books reference each other's files with relative paths:
//! a content unit at `text/chap1.xhtml` points at `../images/a.png`,
//! the navigation document points at `chap2.xhtml#section-3`. This
//! module normalizes every such reference to a container-rooted path
//! and provides the table those paths are looked up in.
//!
//! Resolution never fails. Malformed input normalizes to a best-effort
//! path, and a lookup miss is an `Option::None` the caller decides the
//! severity of; inside this module it never is fatal.

use indexmap::IndexMap;

/// A resource addressable inside the book container.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Raw resource bytes as stored in the archive.
    pub data: Vec<u8>,

    /// Declared media type of the resource.
    pub mime: String,
}

impl Resource {
    /// Whether this resource is an image, by media type or by the
    /// extension of the path it is stored under.
    pub fn is_image(&self, path: &str) -> bool {
        if self.mime.starts_with("image/") {
            return true;
        }

        let extension = path.rsplit('.').next().unwrap_or_default();
        matches!(
            extension.to_ascii_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" | "bmp"
        )
    }

    /// Whether this resource is a stylesheet.
    pub fn is_stylesheet(&self, path: &str) -> bool {
        self.mime == "text/css" || path.ends_with(".css")
    }
}

/// Mapping from normalized container path to resource
///
/// The table covers every item of the package manifest, not only the
/// spine members, so images and stylesheets referenced from content
/// units can be resolved. Insertion order follows the manifest, which
/// makes "first image resource" a well-defined notion for cover
/// synthesis.
#[derive(Debug, Default)]
pub struct ResourceTable {
    entries: IndexMap<String, Resource>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, resource: Resource) {
        self.entries.insert(path, resource);
    }

    /// Returns the resource stored under the normalized path.
    pub fn lookup(&self, path: &str) -> Option<&Resource> {
        self.entries.get(path)
    }

    /// The first image resource in manifest order, if any.
    pub fn first_image(&self) -> Option<(&str, &Resource)> {
        self.entries
            .iter()
            .find(|(path, resource)| resource.is_image(path))
            .map(|(path, resource)| (path.as_str(), resource))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves a reference against the path of the file containing it
///
/// A reference starting with `/` is root-relative: the leading slash
/// is dropped and the rest is taken from the container root. Any other
/// reference is joined with the directory portion of `base_path`.
/// Either way, `.` and `..` segments are collapsed iteratively until
/// none remain; `..` segments that would climb above the container
/// root are dropped.
///
/// ## Parameters
/// - `reference`: The raw reference as written in the source file
/// - `base_path`: Normalized container path of the referencing file
///
/// ## Return
/// The normalized container-rooted path. Never fails.
pub fn resolve(reference: &str, base_path: &str) -> String {
    if let Some(rooted) = reference.strip_prefix('/') {
        return collapse(rooted);
    }

    let directory = match base_path.rfind('/') {
        Some(split) => &base_path[..split],
        None => "",
    };

    if directory.is_empty() {
        collapse(reference)
    } else {
        collapse(&format!("{directory}/{reference}"))
    }
}

/// Strips the fragment and query portions of a reference.
///
/// `text/chap2.xhtml#sec-3` and `text/chap2.xhtml?x=1` both address
/// the unit `text/chap2.xhtml`.
pub fn strip_fragment(reference: &str) -> &str {
    let end = reference
        .find(['#', '?'])
        .unwrap_or(reference.len());
    &reference[..end]
}

fn collapse(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_relative_reference_with_parent_segment() {
            assert_eq!(resolve("../images/a.png", "text/chap1.xhtml"), "images/a.png");
        }

        #[test]
        fn test_root_relative_reference() {
            assert_eq!(resolve("/images/a.png", "text/chap1.xhtml"), "images/a.png");
        }

        #[test]
        fn test_sibling_reference() {
            assert_eq!(resolve("chap2.xhtml", "text/chap1.xhtml"), "text/chap2.xhtml");
            assert_eq!(resolve("style.css", "content.opf"), "style.css");
        }

        #[test]
        fn test_current_directory_segments_are_dropped() {
            assert_eq!(resolve("./a/./b.png", "text/c.xhtml"), "text/a/b.png");
        }

        /// Climbing above the container root is clipped, not an error.
        #[test]
        fn test_excess_parent_segments() {
            assert_eq!(resolve("../../../a.png", "text/chap1.xhtml"), "a.png");
        }

        #[test]
        fn test_strip_fragment() {
            assert_eq!(strip_fragment("text/c.xhtml#sec-3"), "text/c.xhtml");
            assert_eq!(strip_fragment("text/c.xhtml?x=1"), "text/c.xhtml");
            assert_eq!(strip_fragment("text/c.xhtml"), "text/c.xhtml");
        }
    }

    mod table_tests {
        use super::*;

        fn resource(mime: &str) -> Resource {
            Resource {
                data: vec![1, 2, 3],
                mime: mime.to_string(),
            }
        }

        #[test]
        fn test_lookup() {
            let mut table = ResourceTable::new();
            table.insert("images/a.png".to_string(), resource("image/png"));

            assert!(table.lookup("images/a.png").is_some());
            assert!(table.lookup("images/missing.png").is_none());
        }

        #[test]
        fn test_first_image_follows_insertion_order() {
            let mut table = ResourceTable::new();
            table.insert("style.css".to_string(), resource("text/css"));
            table.insert("cover.jpeg".to_string(), resource("image/jpeg"));
            table.insert("other.png".to_string(), resource("image/png"));

            let (path, _) = table.first_image().unwrap();
            assert_eq!(path, "cover.jpeg");
        }

        #[test]
        fn test_image_detection_by_extension() {
            let untyped = Resource {
                data: vec![],
                mime: "application/octet-stream".to_string(),
            };
            assert!(untyped.is_image("art/cover.JPG"));
            assert!(!untyped.is_image("art/cover.ttf"));
        }
    }
}
