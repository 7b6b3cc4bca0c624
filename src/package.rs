//! Packaged book parsing
//!
//! A packaged book is a zip archive holding a fixed, well-known
//! container descriptor, a package document, the content units it
//! inventories, and an optional navigation document. This module runs
//! the three parses in sequence against a single archive handle and
//! produces the in-memory model everything downstream works from:
//! the ordered spine, the full resource table and the raw navigation
//! entries.
//!
//! Only the container parse is allowed to abort a book: a missing
//! descriptor, a missing `full-path` attribute or an unreadable
//! package document is fatal. Everything after that is best effort.
//! Spine references whose target is absent from the archive are
//! skipped with a warning and leave a gap; a navigation document that
//! is missing, empty or pathologically deep degrades to a spine-derived
//! chapter list instead of failing.

use std::io::{Read, Seek};

use indexmap::IndexMap;
use log::{debug, warn};
use zip::{CompressionMethod, ZipArchive, result::ZipError};

use crate::{
    error::ReaderError,
    resolver::{self, Resource, ResourceTable},
    types::ContentUnit,
    xml::{self, XmlNode},
};

/// Well-known location of the container descriptor.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Maximum depth the navigation hierarchy is descended to. Entries
/// nested deeper are dropped with a warning rather than risking stack
/// exhaustion on cyclic or degenerate documents.
pub const MAX_NAV_DEPTH: usize = 10;

/// One item of the package manifest.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Normalized container path of the item.
    pub path: String,

    /// Declared media type.
    pub mime: String,

    /// Optional display title declared on the item.
    pub title: Option<String>,

    /// Space-separated item properties, e.g. `nav` or `cover-image`.
    pub properties: Option<String>,
}

impl ManifestEntry {
    fn has_property(&self, wanted: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|properties| properties.split_whitespace().any(|p| p == wanted))
    }
}

/// One entry of the flattened navigation hierarchy.
///
/// The nested structure of the navigation document is flattened in
/// document order; nesting survives as the `depth` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    /// Display label of the entry.
    pub label: String,

    /// Normalized container path the entry points at, fragment intact.
    pub href: Option<String>,

    /// Nesting depth, 0 for top-level entries, capped at
    /// [MAX_NAV_DEPTH] - 1.
    pub depth: usize,
}

/// The parsed in-memory model of a packaged book
///
/// Built once per initialization and immutable afterwards. The spine
/// holds the linear reading order with payload bytes already loaded;
/// the resource table covers every manifest item so content transforms
/// can resolve images and stylesheets.
#[derive(Debug)]
pub struct PackageDoc {
    /// Normalized container path of the package document.
    pub package_path: String,

    /// Manifest items keyed by id, in document order.
    pub manifest: IndexMap<String, ManifestEntry>,

    /// The ordered content units of the linear reading order.
    pub spine: Vec<ContentUnit>,

    /// Every manifest item addressable by normalized path.
    pub resources: ResourceTable,

    /// Flattened navigation entries, empty when the book has no usable
    /// navigation document.
    pub nav_entries: Vec<NavEntry>,

    /// Title from the package metadata, if declared.
    pub title: Option<String>,

    /// Author from the package metadata, if declared.
    pub author: Option<String>,
}

impl PackageDoc {
    /// Parses a packaged book from an open archive
    ///
    /// Runs the container, package-document and navigation-document
    /// parses in order against the given handle. The archive is read
    /// eagerly: every manifest item's bytes are loaded into the
    /// resource table so no further archive access is needed to render
    /// pages.
    ///
    /// ## Parameters
    /// - `archive`: The zip archive of the book
    ///
    /// ## Return
    /// - `Ok(PackageDoc)`: The parsed book model
    /// - `Err(ReaderError)`: The container descriptor or package
    ///   document is missing or malformed
    pub fn parse<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self, ReaderError> {
        compression_method_check(archive)?;

        let container = read_archive_file(archive, CONTAINER_PATH).map_err(|_| {
            ReaderError::NonCanonicalArchive {
                expected_file: CONTAINER_PATH.to_string(),
            }
        })?;
        let package_path = parse_container(&xml::decode_text(&container))?;

        let opf = read_archive_file(archive, &package_path).map_err(|_| {
            ReaderError::NonCanonicalArchive {
                expected_file: package_path.clone(),
            }
        })?;
        let package = xml::parse_document(&xml::decode_text(&opf))?;
        debug!("parsed package document at {package_path}");

        let (title, author) = parse_metadata(&package);
        let manifest = parse_manifest(&package, &package_path)?;
        let resources = load_resources(archive, &manifest);
        let spine = load_spine(&package, &manifest, &resources)?;
        let nav_entries = parse_navigation(&manifest, &resources);

        debug!(
            "package parsed: {} spine units, {} resources, {} nav entries",
            spine.len(),
            resources.len(),
            nav_entries.len()
        );

        Ok(Self {
            package_path,
            manifest,
            spine,
            resources,
            nav_entries,
            title,
            author,
        })
    }

    /// Finds the spine index a reference points at
    ///
    /// The reference has its fragment and query stripped, then the
    /// spine is searched for a content unit whose path is textually
    /// equal to the normalized reference, ends with it, or is a suffix
    /// of it.
    ///
    /// ## Return
    /// - `Some(index)`: The first matching spine position
    /// - `None`: No spine unit matches; a warning is logged and the
    ///   caller decides what the miss means
    pub fn find_content_unit_index(&self, reference: &str) -> Option<usize> {
        let normalized = resolver::strip_fragment(reference);
        if normalized.is_empty() {
            return None;
        }

        let found = self.spine.iter().position(|unit| {
            unit.path == normalized
                || unit.path.ends_with(normalized)
                || normalized.ends_with(unit.path.as_str())
        });

        if found.is_none() {
            warn!("reference \"{reference}\" does not match any spine unit");
        }

        found
    }

    /// The cover image of the book, if one can be identified
    ///
    /// Prefers the manifest item flagged with the `cover-image`
    /// property; falls back to the first image resource in manifest
    /// order.
    pub fn cover_image(&self) -> Option<(&str, &Resource)> {
        for (_, entry) in &self.manifest {
            if entry.has_property("cover-image") {
                if let Some(resource) = self.resources.lookup(&entry.path) {
                    return Some((entry.path.as_str(), resource));
                }
            }
        }

        self.resources.first_image()
    }
}

/// Reads one file out of the archive into a byte buffer.
fn read_archive_file<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>, ReaderError> {
    match archive.by_name(path) {
        Ok(mut file) => {
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)?;
            Ok(buffer)
        }
        Err(ZipError::FileNotFound) => Err(ReaderError::ResourceNotFound {
            resource: path.to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Verifies that every archive entry uses a compression method the
/// packaging format allows (stored or deflated).
fn compression_method_check<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<(), ReaderError> {
    for index in 0..archive.len() {
        let file = archive.by_index(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            other => {
                return Err(ReaderError::UnusableCompressionMethod {
                    file: file.name().to_string(),
                    method: other.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Extracts the package document path from the container descriptor
///
/// The descriptor must hold at least one `rootfile` element carrying a
/// `full-path` attribute. Both absences are fatal; this is the only
/// parse step allowed to abort initialization on its own.
fn parse_container(content: &str) -> Result<String, ReaderError> {
    let root = xml::parse_document(content)?;

    let rootfile = root
        .descendant("rootfile")
        .ok_or_else(|| ReaderError::NonCanonicalFile {
            tag: "rootfile".to_string(),
        })?;

    let full_path =
        rootfile
            .attr("full-path")
            .ok_or_else(|| ReaderError::MissingRequiredAttribute {
                tag: "rootfile".to_string(),
                attribute: "full-path".to_string(),
            })?;

    Ok(resolver::resolve(full_path, ""))
}

/// Pulls title and author out of the package metadata section.
///
/// Metadata beyond those two fields exists in real package documents
/// but nothing downstream consumes it, so it is not modeled.
fn parse_metadata(package: &XmlNode) -> (Option<String>, Option<String>) {
    let metadata = match package.descendant("metadata") {
        Some(node) => node,
        None => return (None, None),
    };

    let text_of = |name: &str| {
        metadata
            .children_named(name)
            .map(|node| xml::normalize_whitespace(&node.collected_text()))
            .find(|text| !text.is_empty())
    };

    (text_of("title"), text_of("creator"))
}

/// Parses the package manifest into normalized entries
///
/// Items lacking a required attribute are skipped with a warning
/// instead of failing the book; a missing `<manifest>` element is
/// fatal because nothing can be rendered without it.
fn parse_manifest(
    package: &XmlNode,
    package_path: &str,
) -> Result<IndexMap<String, ManifestEntry>, ReaderError> {
    let manifest_element =
        package
            .descendant("manifest")
            .ok_or_else(|| ReaderError::NonCanonicalFile {
                tag: "manifest".to_string(),
            })?;

    let mut manifest = IndexMap::new();
    for item in manifest_element.children_named("item") {
        let (Some(id), Some(href)) = (item.attr("id"), item.attr("href")) else {
            warn!("manifest item without id or href skipped");
            continue;
        };

        let mime = item
            .attr("media-type")
            .unwrap_or("application/octet-stream")
            .to_string();

        manifest.insert(
            id.to_string(),
            ManifestEntry {
                path: resolver::resolve(href, package_path),
                mime,
                title: item.attr("title").map(str::to_string),
                properties: item.attr("properties").map(str::to_string),
            },
        );
    }

    Ok(manifest)
}

/// Loads every manifest item's bytes into the resource table.
///
/// Items whose path is absent from the archive are logged and left
/// out; the book remains usable without them.
fn load_resources<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    manifest: &IndexMap<String, ManifestEntry>,
) -> ResourceTable {
    let mut resources = ResourceTable::new();

    for (id, entry) in manifest {
        match read_archive_file(archive, &entry.path) {
            Ok(data) => resources.insert(
                entry.path.clone(),
                Resource {
                    data,
                    mime: entry.mime.clone(),
                },
            ),
            Err(_) => {
                warn!(
                    "manifest item \"{id}\" references \"{}\" which is missing from the archive",
                    entry.path
                );
            }
        }
    }

    resources
}

/// Builds the ordered spine from the package document
///
/// Each item reference is resolved through the manifest and its bytes
/// taken from the resource table. References that cannot be resolved
/// or whose target was missing from the archive are skipped with a
/// warning, leaving a gap in the reading order rather than a failure.
fn load_spine(
    package: &XmlNode,
    manifest: &IndexMap<String, ManifestEntry>,
    resources: &ResourceTable,
) -> Result<Vec<ContentUnit>, ReaderError> {
    let spine_element = package
        .descendant("spine")
        .ok_or_else(|| ReaderError::NonCanonicalFile {
            tag: "spine".to_string(),
        })?;

    let mut spine = Vec::new();
    for itemref in spine_element.children_named("itemref") {
        let Some(idref) = itemref.attr("idref") else {
            warn!("spine itemref without idref skipped");
            continue;
        };

        let Some(entry) = manifest.get(idref) else {
            warn!("spine itemref \"{idref}\" has no manifest entry, skipping");
            continue;
        };

        let Some(resource) = resources.lookup(&entry.path) else {
            warn!(
                "spine unit \"{}\" is missing from the archive, skipping",
                entry.path
            );
            continue;
        };

        spine.push(ContentUnit {
            path: entry.path.clone(),
            title: entry.title.clone(),
            data: resource.data.clone(),
            mime: entry.mime.clone(),
        });
    }

    Ok(spine)
}

/// Parses the navigation document into a flat, depth-tagged list
///
/// The navigation document is located through the manifest item
/// carrying the `nav` property. Absence of the item, of the file, of
/// the expected structure, or of any entries all degrade to an empty
/// list; the chapter indexer then synthesizes entries from the spine.
fn parse_navigation(
    manifest: &IndexMap<String, ManifestEntry>,
    resources: &ResourceTable,
) -> Vec<NavEntry> {
    let Some(entry) = manifest.values().find(|entry| entry.has_property("nav")) else {
        debug!("book declares no navigation document");
        return Vec::new();
    };

    let Some(resource) = resources.lookup(&entry.path) else {
        warn!("navigation document \"{}\" is missing from the archive", entry.path);
        return Vec::new();
    };

    let nav_document = match xml::parse_document(&xml::decode_text(&resource.data)) {
        Ok(document) => document,
        Err(err) => {
            warn!("navigation document \"{}\" failed to parse: {err}", entry.path);
            return Vec::new();
        }
    };

    // Prefer the nav element flagged as the table of contents, fall
    // back to the first nav element in the document.
    let nav_elements = nav_document.descendants("nav");
    let toc = nav_elements
        .iter()
        .find(|nav| nav.attr("epub:type") == Some("toc"))
        .or_else(|| nav_elements.first());

    let Some(list) = toc.and_then(|nav| nav.descendant("ol")) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    flatten_nav_list(list, 0, &entry.path, &mut entries);
    entries
}

/// Walks one `<ol>` level of the navigation hierarchy
///
/// Carries an explicit depth counter and refuses to descend past
/// [MAX_NAV_DEPTH], so a cyclic or pathologically deep hierarchy stops
/// with a warning instead of exhausting the stack.
fn flatten_nav_list(list: &XmlNode, depth: usize, nav_path: &str, out: &mut Vec<NavEntry>) {
    if depth >= MAX_NAV_DEPTH {
        warn!("navigation hierarchy exceeds depth {MAX_NAV_DEPTH}, deeper entries dropped");
        return;
    }

    for item in list.children_named("li") {
        let Some(link) = item.first_child_of(&["a", "span"]) else {
            continue;
        };

        let label = xml::normalize_whitespace(&link.collected_text());
        let href = link
            .attr("href")
            .map(|href| resolver::resolve(href, nav_path));

        out.push(NavEntry { label, href, depth });

        if let Some(sublist) = item.children_named("ol").next() {
            flatten_nav_list(sublist, depth + 1, nav_path, out);
        }
    }
}
