//! Image search: request parameters, the searcher and its responses.

pub mod function;
pub mod request;
pub mod response;
pub mod searcher;

pub use function::FeatureDistanceFunction;
pub use request::SearchRequest;
pub use response::{ExtractResponse, SearchHit, SearchResponse, SearchTimings};
pub use searcher::ImageSearcher;
