pub mod batch;
pub mod question;
pub mod verdict;

pub use batch::{BatchItem, BatchReport, BatchResult};
pub use question::QuestionRecord;
pub use verdict::{SimilarityVerdict, VerdictSource};
