use core::fmt;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while normalizing a schema or classifying its recursion.
#[derive(Debug)]
pub enum Error {
    /// A schema identifier cannot be parsed as a URI or its document cannot be loaded.
    InvalidIdentifier {
        identifier: String,
        source: Option<BoxedError>,
    },
    /// A `$ref` fragment does not resolve inside its target document.
    InvalidFragment { fragment: String, document: String },
    /// A `$ref` target could be located but not obtained.
    InvalidReference {
        reference: String,
        source: Option<BoxedError>,
    },
    /// A remote document is required but the remote policy forbids fetching it.
    DistributedSchema { identifier: String },
    /// A document is not valid against its declared draft's metaschema.
    DraftValidation { identifier: String, draft: String },
    /// A URL is not present in the fetch cache.
    NotCached { url: String },
}

impl Error {
    pub(crate) fn invalid_identifier(
        identifier: impl Into<String>,
        source: Option<BoxedError>,
    ) -> Error {
        Error::InvalidIdentifier {
            identifier: identifier.into(),
            source,
        }
    }
    pub(crate) fn invalid_fragment(
        fragment: impl Into<String>,
        document: impl Into<String>,
    ) -> Error {
        Error::InvalidFragment {
            fragment: fragment.into(),
            document: document.into(),
        }
    }
    pub(crate) fn invalid_reference(
        reference: impl Into<String>,
        source: Option<BoxedError>,
    ) -> Error {
        Error::InvalidReference {
            reference: reference.into(),
            source,
        }
    }
    pub(crate) fn distributed_schema(identifier: impl Into<String>) -> Error {
        Error::DistributedSchema {
            identifier: identifier.into(),
        }
    }
    pub(crate) fn draft_validation(identifier: impl Into<String>, draft: impl Into<String>) -> Error {
        Error::DraftValidation {
            identifier: identifier.into(),
            draft: draft.into(),
        }
    }
    pub(crate) fn not_cached(url: impl Into<String>) -> Error {
        Error::NotCached { url: url.into() }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidIdentifier { identifier, source } => {
                f.write_fmt(format_args!("Invalid identifier '{identifier}'"))?;
                if let Some(err) = source {
                    f.write_fmt(format_args!(": {err}"))?;
                }
                Ok(())
            }
            Error::InvalidFragment { fragment, document } => f.write_fmt(format_args!(
                "Fragment '{fragment}' does not resolve in '{document}'"
            )),
            Error::InvalidReference { reference, source } => {
                f.write_fmt(format_args!("Reference '{reference}' cannot be obtained"))?;
                if let Some(err) = source {
                    f.write_fmt(format_args!(": {err}"))?;
                }
                Ok(())
            }
            Error::DistributedSchema { identifier } => f.write_fmt(format_args!(
                "Schema '{identifier}' requires remote documents, but remote fetching is disabled"
            )),
            Error::DraftValidation { identifier, draft } => f.write_fmt(format_args!(
                "Schema '{identifier}' is not valid against its draft '{draft}'"
            )),
            Error::NotCached { url } => {
                f.write_fmt(format_args!("URL '{url}' is not in the fetch cache"))
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidIdentifier { source, .. } | Error::InvalidReference { source, .. } => {
                if let Some(source) = source {
                    Some(&**source)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
