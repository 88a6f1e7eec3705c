//! Front end for ember, a tiny expression-oriented language.
//!
//! Source text flows through a hand-written [`lexer`], a precedence-climbing
//! recursive-descent [`parser`] producing the [`ast`], and a [`codegen`] pass
//! that lowers each top-level unit into the register [`ir`]. The [`eval`]
//! module executes generated functions, and [`driver`] ties the loop
//! together for the CLI.

pub mod ast;
pub mod codegen;
pub mod driver;
pub mod env;
pub mod eval;
pub mod ir;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, Function, Item, Prototype, ANON_FN_NAME};
pub use codegen::{Codegen, CodegenError};
pub use driver::Driver;
pub use eval::{EvalError, Interpreter};
pub use lexer::{LexError, Lexer, Token};
pub use parser::{Parser, ParserError};
