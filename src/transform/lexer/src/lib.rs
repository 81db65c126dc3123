mod lexer;

pub use lexer::lex;
pub use lexer::LexError;
