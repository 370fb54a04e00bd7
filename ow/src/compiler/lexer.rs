//! Streaming lexer.
//!
//! The [`Lexer`] pulls bytes from any [`std::io::Read`] source (a file, `stdin`, an in-memory
//! buffer) and implements [`Iterator`] over [`Token`]s. Only a few bytes of lookahead are
//! buffered, the whole input is never held in memory.
//!
//! `#` starts a comment running to the end of the line. Newlines are significant as
//! statement separators, except inside parentheses.
use std::io::{self, Read};

use crate::compiler::{Pos, Span, Token, TokenKind};

const LOOKAHEAD: usize = 4;

/// `peek()` / `peek_ahead()` / `advance()` over any `Read`, with position tracking.
struct ReadBuf<R: Read> {
    reader: R,
    buf: [u8; LOOKAHEAD],
    /// valid bytes at the front of `buf`
    filled: usize,
    reader_eof: bool,
    /// first read failure, reported as an error token
    failure: Option<io::Error>,
    offset: usize,
    line: usize,
    column: usize,
}

impl<R: Read> ReadBuf<R> {
    fn new(reader: R) -> Self {
        let mut rb = Self {
            reader,
            buf: [0; LOOKAHEAD],
            filled: 0,
            reader_eof: false,
            failure: None,
            offset: 0,
            line: 1,
            column: 1,
        };
        rb.fill();
        rb
    }

    fn fill(&mut self) {
        while !self.reader_eof && self.filled < LOOKAHEAD {
            let mut one = [0u8; 1];
            match self.reader.read(&mut one) {
                Ok(0) => self.reader_eof = true,
                Ok(_) => {
                    self.buf[self.filled] = one[0];
                    self.filled += 1;
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => (),
                Err(error) => {
                    self.reader_eof = true;
                    self.failure = Some(error);
                }
            }
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.offset, self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.peek_ahead(0)
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        (n < self.filled).then(|| self.buf[n])
    }

    fn advance(&mut self) -> Option<u8> {
        if self.filled == 0 {
            return None;
        }
        let b = self.buf[0];
        self.buf.copy_within(1..self.filled, 0);
        self.filled -= 1;
        self.fill();

        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

pub struct Lexer<R: Read> {
    rb: ReadBuf<R>,
    /// open parentheses, newlines inside them are plain whitespace
    depth: usize,
    emitted_eof: bool,
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            rb: ReadBuf::new(reader),
            depth: 0,
            emitted_eof: false,
        }
    }
}

impl<'a> Lexer<&'a [u8]> {
    pub fn from_str(source: &'a str) -> Self {
        Self::new(source.as_bytes())
    }
}

impl<R: Read> Lexer<R> {
    fn token(&self, kind: TokenKind, start: Pos) -> Token {
        Token::new(kind, Span::new(start, self.rb.pos()))
    }

    fn error(&self, message: impl Into<String>, start: Pos) -> Token {
        self.token(TokenKind::Error(message.into()), start)
    }

    fn skip_trivia(&mut self) {
        while let Some(b) = self.rb.peek() {
            match b {
                b'\n' if self.depth == 0 => break,
                b' ' | b'\t' | b'\r' | b'\n' | 0x0B | 0x0C => {
                    self.rb.advance();
                }
                b'#' => {
                    while self.rb.peek().is_some_and(|b| b != b'\n') {
                        self.rb.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(b) = self.rb.peek().filter(|&b| is_ident_char(b)) {
            word.push(b as char);
            self.rb.advance();
        }
        word
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.rb.pos();
        let word = self.lex_word();
        let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Identifier(word));
        self.token(kind, start)
    }

    fn lex_symbol(&mut self) -> Token {
        let start = self.rb.pos();
        self.rb.advance(); // `:`
        if !self.rb.peek().is_some_and(is_ident_start) {
            return self.error("expected a name after `:'", start);
        }
        let name = self.lex_word();
        self.token(TokenKind::Symbol(name), start)
    }

    /// Escapes: `\\`, `\"`, `\n`, `\t`, `\r`, `\0`.
    fn lex_string(&mut self) -> Token {
        let start = self.rb.pos();
        self.rb.advance(); // opening `"`
        let mut bytes = Vec::new();
        loop {
            match self.rb.advance() {
                Some(b'"') => break,
                Some(b'\\') => {
                    let escaped = match self.rb.advance() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(b'0') => b'\0',
                        Some(b'\\') => b'\\',
                        Some(b'"') => b'"',
                        Some(other) => {
                            return self.error(
                                format!("unknown escape `\\{}'", other as char),
                                start,
                            );
                        }
                        None => return self.error("unterminated string", start),
                    };
                    bytes.push(escaped);
                }
                Some(b) => bytes.push(b),
                None => return self.error("unterminated string", start),
            }
        }
        match String::from_utf8(bytes) {
            Ok(value) => self.token(TokenKind::String(value), start),
            Err(_) => self.error("string is not valid UTF-8", start),
        }
    }

    fn push_digits(&mut self, raw: &mut String) {
        while let Some(b) = self.rb.peek() {
            if b.is_ascii_digit() {
                raw.push(b as char);
            } else if b != b'_' {
                break;
            }
            self.rb.advance();
        }
    }

    /// Integers and floats. A `.` only continues the number when a digit follows, so
    /// `1.to_float()` is a method call.
    fn lex_number(&mut self) -> Token {
        let start = self.rb.pos();
        let mut raw = String::new();
        self.push_digits(&mut raw);

        let mut is_float = false;
        if self.rb.peek() == Some(b'.') && self.rb.peek_ahead(1).is_some_and(|b| b.is_ascii_digit())
        {
            is_float = true;
            raw.push('.');
            self.rb.advance();
            self.push_digits(&mut raw);
        }
        if matches!(self.rb.peek(), Some(b'e' | b'E')) {
            let signed = matches!(self.rb.peek_ahead(1), Some(b'+' | b'-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.rb.peek_ahead(digit_at).is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                raw.push('e');
                self.rb.advance();
                if signed {
                    raw.extend(self.rb.advance().map(char::from));
                }
                self.push_digits(&mut raw);
            }
        }
        if self.rb.peek().is_some_and(is_ident_start) {
            return self.error(format!("malformed number `{raw}'"), start);
        }

        if is_float {
            match raw.parse::<f64>() {
                Ok(value) => self.token(TokenKind::Float(value), start),
                Err(_) => self.error(format!("malformed number `{raw}'"), start),
            }
        } else {
            match raw.parse::<i64>() {
                Ok(value) => self.token(TokenKind::Integer(value), start),
                Err(_) => self.error(format!("integer `{raw}' is too large"), start),
            }
        }
    }

    /// One or two byte punctuation.
    fn lex_operator(&mut self, b: u8) -> Token {
        let start = self.rb.pos();
        self.rb.advance();
        let followed_by_eq = self.rb.peek() == Some(b'=');
        let kind = match b {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'.' => TokenKind::Dot,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'(' => {
                self.depth += 1;
                TokenKind::LParen
            }
            b')' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RParen
            }
            b'=' if followed_by_eq => TokenKind::EqEq,
            b'=' => TokenKind::Assign,
            b'!' if followed_by_eq => TokenKind::NotEq,
            b'<' if followed_by_eq => TokenKind::Le,
            b'<' => TokenKind::Lt,
            b'>' if followed_by_eq => TokenKind::Ge,
            b'>' => TokenKind::Gt,
            other => {
                return self.error(format!("unexpected character `{}'", other as char), start);
            }
        };
        if matches!(
            kind,
            TokenKind::EqEq | TokenKind::NotEq | TokenKind::Le | TokenKind::Ge
        ) {
            self.rb.advance();
        }
        self.token(kind, start)
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let start = self.rb.pos();
        let Some(b) = self.rb.peek() else {
            if let Some(failure) = self.rb.failure.take() {
                return self.error(format!("read error: {failure}"), start);
            }
            return self.token(TokenKind::Eof, start);
        };
        match b {
            b'\n' => {
                self.rb.advance();
                self.token(TokenKind::Newline, start)
            }
            b'"' => self.lex_string(),
            b':' => self.lex_symbol(),
            b'0'..=b'9' => self.lex_number(),
            b if is_ident_start(b) => self.lex_identifier(),
            b if b.is_ascii() => self.lex_operator(b),
            _ => {
                self.rb.advance();
                self.error("unexpected non-ASCII character", start)
            }
        }
    }
}

impl<R: Read> Iterator for Lexer<R> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.emitted_eof {
            return None;
        }
        let token = self.next_token();
        if token.is_eof() {
            self.emitted_eof = true;
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::from_str(source).map(|token| token.kind).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("42 1_000 3.5 1e3"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Integer(1000),
                TokenKind::Float(3.5),
                TokenKind::Float(1000.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn dot_after_integer_is_a_send() {
        assert_eq!(
            kinds("1.neg"),
            vec![
                TokenKind::Integer(1),
                TokenKind::Dot,
                TokenKind::Identifier("neg".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn huge_integer_is_an_error() {
        let tokens = kinds("99999999999999999999");
        assert!(matches!(&tokens[0], TokenKind::Error(message) if message.contains("too large")));
    }

    #[test]
    fn keywords_identifiers_and_symbols() {
        assert_eq!(
            kinds("func f end :sym self"),
            vec![
                TokenKind::Func,
                TokenKind::Identifier("f".into()),
                TokenKind::End,
                TokenKind::Symbol("sym".into()),
                TokenKind::Identifier("self".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#),
            vec![TokenKind::String("a\n\"b\"".into()), TokenKind::Eof]
        );
        assert!(matches!(kinds("\"open")[0], TokenKind::Error(_)));
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("== != <= >= < > = + - * / %"),
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Assign,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn newlines_only_outside_parentheses() {
        assert_eq!(
            kinds("f(1,\n2)\nx # comment\n"),
            vec![
                TokenKind::Identifier("f".into()),
                TokenKind::LParen,
                TokenKind::Integer(1),
                TokenKind::Comma,
                TokenKind::Integer(2),
                TokenKind::RParen,
                TokenKind::Newline,
                TokenKind::Identifier("x".into()),
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn spans_track_lines_and_columns() {
        let tokens: Vec<Token> = Lexer::new(Cursor::new("a\n  bc")).collect();
        let bc = &tokens[2];
        assert_eq!(bc.kind, TokenKind::Identifier("bc".into()));
        assert_eq!(bc.span.to_string(), "2:3-2:5");
    }

    #[test]
    fn stray_character() {
        assert!(matches!(&kinds("@")[0], TokenKind::Error(message) if message.contains('@')));
    }
}
