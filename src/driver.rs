use std::io::{self, Write};

use crate::ast::{Item, ANON_FN_NAME};
use crate::codegen::Codegen;
use crate::eval::Interpreter;
use crate::ir::Module;
use crate::lexer::{Lexer, Token};
use crate::parser::Parser;

/// Top-level read-generate loop: repeatedly parses one unit (definition,
/// extern declaration, bare expression, or stray `;`) and hands it to code
/// generation, recovering from a syntax error by discarding the offending
/// token. Diagnostics go to the sink; nothing here is fatal.
pub struct Driver<W: Write> {
    codegen: Codegen,
    sink: W,
}

impl<W: Write> Driver<W> {
    pub fn new(module_name: &str, sink: W) -> Self {
        Driver {
            codegen: Codegen::new(module_name),
            sink,
        }
    }

    pub fn module(&self) -> &Module {
        self.codegen.module()
    }

    pub fn finish(self) -> Module {
        self.codegen.finish()
    }

    /// Drive the loop over one source string. Returns the values of the
    /// top-level expressions that generated and evaluated successfully.
    pub fn run(&mut self, source: &str) -> io::Result<Vec<f64>> {
        // Prime the first token here rather than in the parser constructor:
        // a lex error consumes the bad run, so retrying makes progress and a
        // malformed leading token costs one unit, not the whole source.
        let mut lexer = Lexer::from_source(source);
        let first = loop {
            match lexer.next_token() {
                Ok(token) => break token,
                Err(err) => writeln!(self.sink, "error: {}", err)?,
            }
        };
        let mut parser = Parser::with_lookahead(lexer, first);

        let mut results = Vec::new();
        loop {
            match parser.current().clone() {
                Token::Eof => break,
                Token::Punct(';') => {
                    // ignore top-level semicolons
                    if let Err(err) = parser.advance() {
                        writeln!(self.sink, "error: {}", err)?;
                    }
                }
                Token::Def => self.handle_definition(&mut parser)?,
                Token::Extern => self.handle_extern(&mut parser)?,
                _ => self.handle_top_level_expr(&mut parser, &mut results)?,
            }
        }
        Ok(results)
    }

    fn handle_definition<I>(&mut self, parser: &mut Parser<I>) -> io::Result<()>
    where
        I: Iterator<Item = char>,
    {
        match parser.parse_definition() {
            Ok(func) => {
                let name = func.proto.name.clone();
                match self.codegen.codegen_item(&Item::Definition(func)) {
                    Ok(()) => self.dump_function(&name),
                    Err(err) => writeln!(self.sink, "error: {}", err),
                }
            }
            Err(err) => {
                writeln!(self.sink, "error: {}", err)?;
                self.recover(parser)
            }
        }
    }

    fn handle_extern<I>(&mut self, parser: &mut Parser<I>) -> io::Result<()>
    where
        I: Iterator<Item = char>,
    {
        match parser.parse_extern() {
            Ok(proto) => {
                let name = proto.name.clone();
                match self.codegen.codegen_item(&Item::Extern(proto)) {
                    Ok(()) => self.dump_function(&name),
                    Err(err) => writeln!(self.sink, "error: {}", err),
                }
            }
            Err(err) => {
                writeln!(self.sink, "error: {}", err)?;
                self.recover(parser)
            }
        }
    }

    fn handle_top_level_expr<I>(
        &mut self,
        parser: &mut Parser<I>,
        results: &mut Vec<f64>,
    ) -> io::Result<()>
    where
        I: Iterator<Item = char>,
    {
        let func = match parser.parse_top_level_expr() {
            Ok(func) => func,
            Err(err) => {
                writeln!(self.sink, "error: {}", err)?;
                return self.recover(parser);
            }
        };
        if let Err(err) = self.codegen.codegen_item(&Item::Definition(func)) {
            return writeln!(self.sink, "error: {}", err);
        }

        match Interpreter::new(self.codegen.module()).call(ANON_FN_NAME, &[]) {
            Ok(value) => {
                writeln!(self.sink, "= {}", value)?;
                results.push(value);
            }
            Err(err) => writeln!(self.sink, "error: {}", err)?,
        }
        // free the reserved name for the next expression
        self.codegen.erase_function(ANON_FN_NAME);
        Ok(())
    }

    fn dump_function(&mut self, name: &str) -> io::Result<()> {
        if let Some(func) = self.codegen.module().get_function(name) {
            let rendered = func.to_string();
            write!(self.sink, "{}", rendered)?;
        }
        Ok(())
    }

    /// Skip the token the failed parse choked on so the loop can resume.
    fn recover<I>(&mut self, parser: &mut Parser<I>) -> io::Result<()>
    where
        I: Iterator<Item = char>,
    {
        if let Err(err) = parser.advance() {
            writeln!(self.sink, "error: {}", err)?;
        }
        Ok(())
    }
}
