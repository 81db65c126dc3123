mod condition_parser;
mod macros;
mod preprocess;

pub use preprocess::preprocess;
pub use preprocess::preprocess_single;
pub use preprocess::PreprocessError;
pub use preprocess::PreprocessErrorReason;
pub use preprocess::PreprocessedText;
