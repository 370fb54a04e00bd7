use std::fmt;

/// The kind of a lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    /// contents with escapes resolved
    String(String),
    /// `:name`, without the colon
    Symbol(String),
    Identifier(String),

    Func,
    Class,
    Var,
    If,
    Elif,
    Else,
    While,
    Return,
    End,
    And,
    Or,
    Not,
    Nil,
    True,
    False,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    Dot,
    Comma,
    LParen,
    RParen,
    Semicolon,
    /// only outside parentheses
    Newline,

    Eof,
    /// An unrecognized character or malformed token.
    Error(String),
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "func" => Self::Func,
            "class" => Self::Class,
            "var" => Self::Var,
            "if" => Self::If,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "while" => Self::While,
            "return" => Self::Return,
            "end" => Self::End,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "nil" => Self::Nil,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        })
    }

    /// Source text of a keyword, which may still name a member after a `.`.
    pub fn keyword_text(&self) -> Option<&'static str> {
        self.name()
            .strip_prefix('`')
            .and_then(|name| name.strip_suffix('\''))
            .filter(|word| TokenKind::keyword(word).is_some())
    }

    /// Human-readable name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Identifier(_) => "identifier",
            Self::Func => "`func'",
            Self::Class => "`class'",
            Self::Var => "`var'",
            Self::If => "`if'",
            Self::Elif => "`elif'",
            Self::Else => "`else'",
            Self::While => "`while'",
            Self::Return => "`return'",
            Self::End => "`end'",
            Self::And => "`and'",
            Self::Or => "`or'",
            Self::Not => "`not'",
            Self::Nil => "`nil'",
            Self::True => "`true'",
            Self::False => "`false'",
            Self::Plus => "`+'",
            Self::Minus => "`-'",
            Self::Star => "`*'",
            Self::Slash => "`/'",
            Self::Percent => "`%'",
            Self::EqEq => "`=='",
            Self::NotEq => "`!='",
            Self::Lt => "`<'",
            Self::Le => "`<='",
            Self::Gt => "`>'",
            Self::Ge => "`>='",
            Self::Assign => "`='",
            Self::Dot => "`.'",
            Self::Comma => "`,'",
            Self::LParen => "`('",
            Self::RParen => "`)'",
            Self::Semicolon => "`;'",
            Self::Newline => "newline",
            Self::Eof => "end of input",
            Self::Error(_) => "error",
        }
    }

    /// Method selector a binary operator compiles to.
    pub fn selector(&self) -> Option<&'static str> {
        Some(match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::EqEq => "==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            _ => return None,
        })
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

/// Line and column of a byte in the source, both counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    pub const fn origin() -> Self {
        Self::new(0, 1, 1)
    }
}

/// Source range of a token, node or compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    pub const fn point(pos: Pos) -> Self {
        Self::new(pos, pos)
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: std::cmp::min_by_key(self.start, other.start, |pos| pos.offset),
            end: std::cmp::max_by_key(self.end, other.end, |pos| pos.offset),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = (self.start, self.end);
        write!(f, "{}:{}-{}:{}", start.line, start.column, end.line, end.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_print_quoted() {
        assert_eq!(TokenKind::keyword("while"), Some(TokenKind::While));
        assert_eq!(TokenKind::While.keyword_text(), Some("while"));
        assert_eq!(TokenKind::Plus.keyword_text(), None);
        assert_eq!(TokenKind::Plus.selector(), Some("+"));
    }

    #[test]
    fn spans_print_and_merge_by_offset() {
        let head = Span::new(Pos::new(0, 1, 1), Pos::new(2, 1, 3));
        let tail = Span::new(Pos::new(9, 2, 2), Pos::new(12, 2, 5));
        assert_eq!(tail.merge(head).to_string(), "1:1-2:5");
        assert_eq!(Span::point(Pos::origin()).to_string(), "1:1-1:1");
    }
}
