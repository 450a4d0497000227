//! Tokenizer, reader, lexical scope, and compiler for lispc source text.

pub mod compiler;
pub mod lexer;
pub mod reader;
pub mod scope;

pub use compiler::Compiler;
pub use lexer::{Token, TokenKind, Tokenizer};
pub use reader::Reader;
pub use scope::LexicalScope;
