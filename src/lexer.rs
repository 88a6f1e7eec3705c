use std::fmt;

/// Smallest lexical unit of the ember language. Tokens are produced one at a
/// time and never retained in a collection.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Def,
    Extern,
    Ident(String),
    Number(f64),
    /// Any single character the lexer does not otherwise recognise, including
    /// operators, parentheses, commas, and semicolons.
    Punct(char),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Def => write!(f, "def"),
            Token::Extern => write!(f, "extern"),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Number(value) => write!(f, "{}", value),
            Token::Punct(c) => write!(f, "{}", c),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum LexError {
    /// A numeric run with more than one decimal point, e.g. `1.2.3`.
    #[error("malformed numeric literal '{0}'")]
    MalformedNumber(String),
}

/// Pull-based scanner over a character source. Keeps exactly one character of
/// lookahead, since identifier and number scanning must read one character
/// past the token boundary.
pub struct Lexer<I: Iterator<Item = char>> {
    chars: I,
    lookahead: Option<char>,
}

impl<'a> Lexer<std::str::Chars<'a>> {
    pub fn from_source(source: &'a str) -> Self {
        Lexer::new(source.chars())
    }
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(mut chars: I) -> Self {
        let lookahead = chars.next();
        Lexer { chars, lookahead }
    }

    fn peek(&self) -> Option<char> {
        self.lookahead
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.lookahead;
        self.lookahead = self.chars.next();
        c
    }

    /// Produce the next token. Once the source is exhausted this returns
    /// `Token::Eof` on every subsequent call; it never reads past the end.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }

        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        if c.is_ascii_alphabetic() {
            let mut ident = String::new();
            while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric()) {
                if let Some(c) = self.bump() {
                    ident.push(c);
                }
            }
            return Ok(match ident.as_str() {
                "def" => Token::Def,
                "extern" => Token::Extern,
                _ => Token::Ident(ident),
            });
        }

        if c.is_ascii_digit() || c == '.' {
            return self.scan_number();
        }

        if c == '#' {
            // comment runs to end of line, then scanning resumes
            while !matches!(self.peek(), Some('\n') | None) {
                self.bump();
            }
            return self.next_token();
        }

        self.bump();
        Ok(Token::Punct(c))
    }

    fn scan_number(&mut self) -> Result<Token, LexError> {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            if let Some(c) = self.bump() {
                text.push(c);
            }
        }
        // The original scanner fed runs like `1.2.3` straight to strtod and
        // silently kept whatever prefix parsed; reject them instead.
        if text.matches('.').count() > 1 {
            return Err(LexError::MalformedNumber(text));
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| LexError::MalformedNumber(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer::from_source(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    #[test]
    fn lexes_definition() {
        let tokens = lex_all("def add(x y) x+y;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Def,
                Token::Ident("add".to_string()),
                Token::Punct('('),
                Token::Ident("x".to_string()),
                Token::Ident("y".to_string()),
                Token::Punct(')'),
                Token::Ident("x".to_string()),
                Token::Punct('+'),
                Token::Ident("y".to_string()),
                Token::Punct(';'),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_reclassified() {
        assert_eq!(
            lex_all("extern defn").unwrap(),
            vec![Token::Extern, Token::Ident("defn".to_string()), Token::Eof]
        );
    }

    #[test]
    fn comment_is_skipped() {
        assert_eq!(
            lex_all("# ignored\n1").unwrap(),
            vec![Token::Number(1.0), Token::Eof]
        );
    }

    #[test]
    fn comment_at_end_of_input() {
        assert_eq!(
            lex_all("2 # trailing").unwrap(),
            vec![Token::Number(2.0), Token::Eof]
        );
    }

    #[test]
    fn numbers_allow_fractions() {
        assert_eq!(
            lex_all("4.5 .25").unwrap(),
            vec![Token::Number(4.5), Token::Number(0.25), Token::Eof]
        );
    }

    #[test]
    fn multi_dot_number_is_rejected() {
        let mut lexer = Lexer::from_source("1.2.3");
        assert_eq!(
            lexer.next_token(),
            Err(LexError::MalformedNumber("1.2.3".to_string()))
        );
    }

    #[test]
    fn eof_is_sticky() {
        let mut lexer = Lexer::from_source("x");
        assert_eq!(lexer.next_token().unwrap(), Token::Ident("x".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }
}
