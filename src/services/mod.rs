pub mod lexical_scorer;
pub mod response_sanitizer;
pub mod semantic_oracle;
pub mod similarity_cache;

pub use lexical_scorer::LexicalScorer;
pub use response_sanitizer::ResponseSanitizer;
pub use semantic_oracle::{RetryPolicy, SemanticOracle};
pub use similarity_cache::SimilarityCache;
