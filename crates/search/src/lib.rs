//! Product search: the indexed document shape, query options and an
//! in-process index behind the [`SearchIndex`] trait.

pub mod document;
pub mod filter;
pub mod index;
pub mod mapper;
pub mod options;

pub use document::{ProductDocument, VariantDocument};
pub use filter::{group_filters, parse_filters};
pub use index::{InMemorySearchIndex, SearchError, SearchIndex, SearchPage, SearchResult};
pub use mapper::{flatten_attributes, generate_suggestions, to_document};
pub use options::{
    DEFAULT_AUTOCOMPLETE_LIMIT, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, SearchOptions, SortField,
    SortOrder,
};
