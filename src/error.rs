//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while
//! opening, parsing and paginating a book. All errors are uniformly
//! wrapped in the [ReaderError] enumeration for convenient handling
//! by the caller.
//!
//! Only a small subset of these errors is fatal to a reading session:
//! a malformed container or package document aborts initialization,
//! while missing resources, unresolvable references and out-of-range
//! navigation are absorbed locally and never surface as errors.

use thiserror::Error;

/// Types of errors that can occur while reading a book
///
/// This enumeration defines the error cases that can be encountered
/// when parsing a packaged book file, paginating its content and
/// serving pages to a consumer.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// ZIP archive related errors
    ///
    /// Errors occur when processing the ZIP structure of a packaged
    /// book, such as file corruption or unreadability.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// Data decoding error - empty data
    ///
    /// This error occurs when trying to parse an empty document.
    #[error("Decode error: The data is empty.")]
    EmptyData,

    /// Operation on a closed engine
    ///
    /// Once an engine has been closed it releases its archive handle
    /// and cached content; it cannot be initialized again.
    #[error("Engine closed: The reader engine has been closed.")]
    EngineClosed,

    /// XML parsing failure error
    ///
    /// This error occurs when the XML event stream ends without a root
    /// element being completed, usually because of a truncated or
    /// malformed document.
    #[error(
        "Failed parsing XML error: Unknown problems occurred during XML parsing, causing parsing failure."
    )]
    FailedParsingXml,

    #[error("IO error: {source}")]
    IoError { source: std::io::Error },

    /// Missing required attribute error
    ///
    /// Triggered when an XML element in the book file lacks an
    /// attribute that the packaging format requires.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Non-canonical archive structure error
    ///
    /// This error occurs when a packaged book lacks a file that the
    /// packaging format requires, such as the container descriptor or
    /// the package document it points at.
    #[error("Non-canonical package: The \"{expected_file}\" file was not found.")]
    NonCanonicalArchive { expected_file: String },

    /// Non-canonical file structure error
    ///
    /// This error is triggered when a required XML element is missing
    /// from one of the packaging documents.
    #[error("Non-canonical file: The \"{tag}\" element was not found.")]
    NonCanonicalFile { tag: String },

    /// Operation before initialization
    ///
    /// Content and navigation operations require a successful
    /// `initialize` call first.
    #[error("Not initialized: The reader engine has not reached the ready state.")]
    NotInitialized,

    /// Page index outside the paginated range
    ///
    /// Navigation clamps indices before rendering, so this error only
    /// appears when a page is requested directly past the end.
    #[error("Page out of range: There is no page with index {page}.")]
    PageOutOfRange { page: usize },

    /// Unable to find a resource error
    ///
    /// This error occurs when an attempt is made to read a resource
    /// that does not exist in the book container.
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// Unusable compression method error
    ///
    /// This error occurs when a packaged book uses an unsupported
    /// compression method. Only stored and deflated entries are valid.
    #[error(
        "Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method."
    )]
    UnusableCompressionMethod { file: String, method: String },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl From<zip::result::ZipError> for ReaderError {
    fn from(value: zip::result::ZipError) -> Self {
        ReaderError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for ReaderError {
    fn from(value: quick_xml::Error) -> Self {
        ReaderError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for ReaderError {
    fn from(value: std::io::Error) -> Self {
        ReaderError::IoError { source: value }
    }
}
