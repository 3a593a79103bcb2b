//! # jsonnorm
//!
//! Normalizes JSON Schemas (drafts 04/06/07) that are distributed over
//! multiple files and URLs into single self-contained documents, and
//! classifies the recursion of the result.
//!
//! ```
//! use serde_json::json;
//! use url::Url;
//!
//! let schema = json!({"oneOf": [{"type": "null"}, {"$ref": "#"}]});
//! let base = Url::parse("file:///schemas/list.json").unwrap();
//! let normalized = jsonnorm::normalize(&schema, &base).unwrap();
//! assert_eq!(
//!     jsonnorm::check_recursion(&normalized).unwrap(),
//!     jsonnorm::Recursion::Guarded,
//! );
//! ```
pub mod cache;
mod drafts;
mod error;
mod meta;
mod normalizer;
mod recursion;
mod retriever;
mod schemas;
pub mod uri;

pub use cache::FetchCache;
pub use drafts::Draft;
pub use error::Error;
pub use normalizer::{normalize, NormalizeOptions};
pub use recursion::{check_recursion, Recursion};
pub use retriever::{CachingRetriever, DefaultRetriever, RepositoryKind, Retrieve};
