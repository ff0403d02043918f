pub mod duplicate_flow;
pub mod question_ctx;

pub use duplicate_flow::{prefilter, Detection, DetectionOutcome, DuplicateDetector, ScoredCandidate};
pub use question_ctx::QuestionCtx;
