use thiserror::Error;

/// Main error type for the sheet catalog engine.
/// Aggregates errors from various sources including standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum SplitterError {
    #[error("{context}: {source}")]
    WithContextError {
        context: String,
        source: Box<SplitterError>,
    },

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    GlobError(#[from] glob::GlobError),

    // Third-party library errors
    #[error("{0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    RegexError(#[from] regex::Error),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    // Catalog module errors
    #[error("{0}")]
    CatalogError(#[from] crate::catalog::CatalogError),
}

impl SplitterError {
    /// Structural errors abort the current workbook: the container could not be read
    /// or the catalog sheet is missing or malformed.
    pub fn is_structural(&self) -> bool {
        match self {
            SplitterError::SpreadsheetError(_)
            | SplitterError::ZipError(_)
            | SplitterError::XmlError(_)
            | SplitterError::XmlEncodingError(_)
            | SplitterError::XmlAttributeError(_)
            | SplitterError::XmlHelperError(_) => true,
            SplitterError::CatalogError(error) => error.is_structural(),
            SplitterError::WithContextError { source, .. } => source.is_structural(),
            _ => false,
        }
    }

    /// I/O errors: a file could not be read, written or replaced.
    pub fn is_io(&self) -> bool {
        match self {
            SplitterError::IoError(_) | SplitterError::GlobError(_) => true,
            SplitterError::WithContextError { source, .. } => source.is_io(),
            _ => false,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SplitterError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SplitterError::WithContextError {
            context: message.to_owned(),
            source: Box::new(e),
        })
    }
}
