use std::collections::HashMap;

use crate::ast::{Expr, Function, Item, Prototype};
use crate::lexer::{LexError, Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("expected an expression, found '{0}'")]
    ExpectedExpression(Token),
    #[error("expected ')', found '{0}'")]
    ExpectedCloseParen(Token),
    #[error("expected ')' or ',' in argument list, found '{0}'")]
    ExpectedArgDelimiter(Token),
    #[error("expected function name in prototype, found '{0}'")]
    ExpectedFunctionName(Token),
    #[error("expected '(' in prototype, found '{0}'")]
    ExpectedProtoParen(Token),
}

pub type ParseResult<T> = Result<T, ParserError>;

/// Recursive-descent, precedence-climbing parser with one token of lookahead.
///
/// The operator table maps a single-character operator to a positive binding
/// power; higher binds tighter. An entry that is absent, or present with a
/// precedence of 0 or less, is not a binary operator at all, so inserting an
/// entry with precedence 0 is the way to declare a token non-binary.
pub struct Parser<I: Iterator<Item = char>> {
    lexer: Lexer<I>,
    current: Token,
    precedence: HashMap<char, i32>,
}

fn default_precedence() -> HashMap<char, i32> {
    let mut table = HashMap::new();
    table.insert('<', 10);
    table.insert('+', 20);
    table.insert('-', 20);
    table.insert('*', 40);
    table
}

impl<'a> Parser<std::str::Chars<'a>> {
    pub fn from_source(source: &'a str) -> ParseResult<Self> {
        Parser::new(Lexer::from_source(source))
    }
}

impl<I: Iterator<Item = char>> Parser<I> {
    pub fn new(mut lexer: Lexer<I>) -> ParseResult<Self> {
        let current = lexer.next_token()?;
        Ok(Parser::with_lookahead(lexer, current))
    }

    /// Build a parser around a token the caller already pulled, for callers
    /// that prime the first token themselves and handle its lex errors.
    pub fn with_lookahead(lexer: Lexer<I>, current: Token) -> Self {
        Parser {
            lexer,
            current,
            precedence: default_precedence(),
        }
    }

    /// Add or override a binary operator. Precedence must be positive to have
    /// any effect; see the table convention above.
    pub fn with_operator(mut self, op: char, precedence: i32) -> Self {
        self.precedence.insert(op, precedence);
        self
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Replace the lookahead token with the next one from the lexer.
    pub fn advance(&mut self) -> ParseResult<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect_punct(
        &mut self,
        c: char,
        err: fn(Token) -> ParserError,
    ) -> ParseResult<()> {
        if self.current == Token::Punct(c) {
            self.advance()
        } else {
            Err(err(self.current.clone()))
        }
    }

    /// Binding power of the lookahead token, or `None` if it is not a binary
    /// operator.
    fn tok_precedence(&self) -> Option<i32> {
        if let Token::Punct(op) = self.current {
            match self.precedence.get(&op) {
                Some(&p) if p > 0 => Some(p),
                _ => None,
            }
        } else {
            None
        }
    }

    /// top := definition | extern_decl | expression
    ///
    /// Top-level `;` and end-of-input are the driver's business; this parses
    /// exactly one unit.
    pub fn parse_item(&mut self) -> ParseResult<Item> {
        match self.current {
            Token::Def => Ok(Item::Definition(self.parse_definition()?)),
            Token::Extern => Ok(Item::Extern(self.parse_extern()?)),
            _ => Ok(Item::Definition(self.parse_top_level_expr()?)),
        }
    }

    /// definition := 'def' prototype expression
    pub fn parse_definition(&mut self) -> ParseResult<Function> {
        self.advance()?; // eat 'def'
        let proto = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { proto, body })
    }

    /// extern_decl := 'extern' prototype
    pub fn parse_extern(&mut self) -> ParseResult<Prototype> {
        self.advance()?; // eat 'extern'
        self.parse_prototype()
    }

    /// A bare expression becomes the body of a synthetic zero-argument
    /// function named `__anon_expr`.
    pub fn parse_top_level_expr(&mut self) -> ParseResult<Function> {
        let body = self.parse_expression()?;
        Ok(Function {
            proto: Prototype::anonymous(),
            body,
        })
    }

    /// prototype := identifier '(' identifier* ')'
    ///
    /// Parameter names may be separated by whitespace alone; commas between
    /// them are tolerated but not required, as in the original grammar.
    pub fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        // The identifier grammar has no underscore, so a user declaration can
        // never collide with the reserved ANON_FN_NAME.
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            other => return Err(ParserError::ExpectedFunctionName(other.clone())),
        };
        self.advance()?;

        self.expect_punct('(', ParserError::ExpectedProtoParen)?;

        let mut params = Vec::new();
        while let Token::Ident(param) = &self.current {
            params.push(param.clone());
            self.advance()?;
            if self.current == Token::Punct(',') {
                self.advance()?;
            }
        }
        self.expect_punct(')', ParserError::ExpectedCloseParen)?;

        Ok(Prototype::new(name, params))
    }

    /// expression := primary (binop primary)*
    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary()?;
        self.parse_bin_op_rhs(0, lhs)
    }

    /// Precedence climbing: fold operators of at least `min_prec` into `lhs`,
    /// recursing to the right whenever the operator after the candidate
    /// right-hand side binds strictly tighter.
    fn parse_bin_op_rhs(&mut self, min_prec: i32, mut lhs: Expr) -> ParseResult<Expr> {
        loop {
            let op = match self.current {
                Token::Punct(op) => op,
                _ => return Ok(lhs),
            };
            let prec = match self.tok_precedence() {
                Some(p) if p >= min_prec => p,
                _ => return Ok(lhs),
            };
            self.advance()?; // eat the operator

            let mut rhs = self.parse_primary()?;
            if let Some(next_prec) = self.tok_precedence() {
                if prec < next_prec {
                    rhs = self.parse_bin_op_rhs(prec + 1, rhs)?;
                }
            }

            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// primary := number | identifier_expr | paren_expr
    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match &self.current {
            Token::Number(value) => {
                let value = *value;
                self.advance()?;
                Ok(Expr::Number(value))
            }
            Token::Ident(_) => self.parse_identifier_expr(),
            Token::Punct('(') => self.parse_paren_expr(),
            other => Err(ParserError::ExpectedExpression(other.clone())),
        }
    }

    /// identifier_expr := identifier | identifier '(' expression,* ')'
    fn parse_identifier_expr(&mut self) -> ParseResult<Expr> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            other => return Err(ParserError::ExpectedExpression(other.clone())),
        };
        self.advance()?;

        if self.current != Token::Punct('(') {
            return Ok(Expr::Variable(name));
        }
        self.advance()?; // eat '('

        let mut args = Vec::new();
        if self.current != Token::Punct(')') {
            loop {
                args.push(self.parse_expression()?);
                match self.current {
                    Token::Punct(')') => break,
                    Token::Punct(',') => self.advance()?,
                    _ => {
                        return Err(ParserError::ExpectedArgDelimiter(
                            self.current.clone(),
                        ))
                    }
                }
            }
        }
        self.advance()?; // eat ')'

        Ok(Expr::Call(name, args))
    }

    /// paren_expr := '(' expression ')'
    fn parse_paren_expr(&mut self) -> ParseResult<Expr> {
        self.advance()?; // eat '('
        let expr = self.parse_expression()?;
        self.expect_punct(')', ParserError::ExpectedCloseParen)?;
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_expr(source: &str) -> ParseResult<Expr> {
        Parser::from_source(source)?.parse_expression()
    }

    fn num(value: f64) -> Box<Expr> {
        Box::new(Expr::Number(value))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse_expr("1+2*3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary('+', num(1.0), Box::new(Expr::Binary('*', num(2.0), num(3.0))))
        );
    }

    #[test]
    fn same_precedence_folds_left() {
        let expr = parse_expr("1-2-3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary('-', Box::new(Expr::Binary('-', num(1.0), num(2.0))), num(3.0))
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse_expr("(1+2)*3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary('*', Box::new(Expr::Binary('+', num(1.0), num(2.0))), num(3.0))
        );
    }

    #[test]
    fn comparison_binds_loosest() {
        let expr = parse_expr("1+2<2*3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                '<',
                Box::new(Expr::Binary('+', num(1.0), num(2.0))),
                Box::new(Expr::Binary('*', num(2.0), num(3.0))),
            )
        );
    }

    #[test]
    fn unknown_operator_ends_the_expression() {
        // '|' is not in the table, so parsing stops after the primary
        let mut parser = Parser::from_source("1|2").unwrap();
        assert_eq!(parser.parse_expression().unwrap(), Expr::Number(1.0));
        assert_eq!(*parser.current(), Token::Punct('|'));
    }

    #[test]
    fn zero_precedence_marks_operator_non_binary() {
        let mut parser = Parser::from_source("1+2").unwrap().with_operator('+', 0);
        assert_eq!(parser.parse_expression().unwrap(), Expr::Number(1.0));
    }

    #[test]
    fn user_extended_operator_table() {
        let mut parser = Parser::from_source("1|2*3").unwrap().with_operator('|', 5);
        assert_eq!(
            parser.parse_expression().unwrap(),
            Expr::Binary('|', num(1.0), Box::new(Expr::Binary('*', num(2.0), num(3.0))))
        );
    }

    #[test]
    fn call_with_arguments() {
        let expr = parse_expr("foo(a, 1+2)").unwrap();
        assert_eq!(
            expr,
            Expr::Call(
                "foo".to_string(),
                vec![
                    Expr::Variable("a".to_string()),
                    Expr::Binary('+', num(1.0), num(2.0)),
                ]
            )
        );
    }

    #[test]
    fn call_with_no_arguments() {
        assert_eq!(
            parse_expr("foo()").unwrap(),
            Expr::Call("foo".to_string(), vec![])
        );
    }

    #[test]
    fn missing_close_paren_is_an_error() {
        assert_eq!(
            parse_expr("(1+2"),
            Err(ParserError::ExpectedCloseParen(Token::Eof))
        );
    }

    #[test]
    fn bad_argument_delimiter_is_an_error() {
        assert_eq!(
            parse_expr("foo(1 2)"),
            Err(ParserError::ExpectedArgDelimiter(Token::Number(2.0)))
        );
    }

    #[test]
    fn definition_with_space_separated_params() {
        let item = Parser::from_source("def foo(a b) a+b")
            .unwrap()
            .parse_item()
            .unwrap();
        assert_eq!(
            item,
            Item::Definition(Function {
                proto: Prototype::new("foo", vec!["a".to_string(), "b".to_string()]),
                body: Expr::Binary(
                    '+',
                    Box::new(Expr::Variable("a".to_string())),
                    Box::new(Expr::Variable("b".to_string())),
                ),
            })
        );
    }

    #[test]
    fn definition_accepts_commas_between_params() {
        let item = Parser::from_source("def foo(a, b) a")
            .unwrap()
            .parse_item()
            .unwrap();
        match item {
            Item::Definition(func) => {
                assert_eq!(func.proto.params, vec!["a".to_string(), "b".to_string()])
            }
            other => panic!("expected a definition, got {:?}", other),
        }
    }

    #[test]
    fn extern_declaration() {
        let item = Parser::from_source("extern sin(x)")
            .unwrap()
            .parse_item()
            .unwrap();
        assert_eq!(item, Item::Extern(Prototype::new("sin", vec!["x".to_string()])));
    }

    #[test]
    fn bare_expression_is_wrapped_anonymously() {
        let item = Parser::from_source("4*2").unwrap().parse_item().unwrap();
        assert_eq!(
            item,
            Item::Definition(Function {
                proto: Prototype::anonymous(),
                body: Expr::Binary('*', num(4.0), num(2.0)),
            })
        );
    }

    #[test]
    fn reserved_name_cannot_be_declared() {
        // '_' never lexes as part of an identifier, so a source-level
        // declaration of the anonymous name fails in the prototype
        let result = Parser::from_source("def __anon_expr() 1")
            .unwrap()
            .parse_item();
        assert_eq!(
            result,
            Err(ParserError::ExpectedFunctionName(Token::Punct('_')))
        );
    }

    #[test]
    fn missing_prototype_paren_is_an_error() {
        assert_eq!(
            Parser::from_source("def foo a").unwrap().parse_item(),
            Err(ParserError::ExpectedProtoParen(Token::Ident("a".to_string())))
        );
    }

    #[test]
    fn lex_error_surfaces_through_the_parser() {
        assert_eq!(
            parse_expr("1+2.3.4"),
            Err(ParserError::Lex(LexError::MalformedNumber("2.3.4".to_string())))
        );
    }

    #[test]
    fn print_reparse_round_trip() {
        for source in ["1+2*3", "(1+2)*3", "a<b-1", "foo(a, bar(1), 2*x)"] {
            let tree = parse_expr(source).unwrap();
            let reparsed = parse_expr(&tree.to_string()).unwrap();
            assert_eq!(tree, reparsed, "round trip failed for {}", source);
        }
    }
}
