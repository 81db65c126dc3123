mod parser;

pub use parser::parse;
pub use parser::ParseError;
pub use parser::ParseErrorReason;
