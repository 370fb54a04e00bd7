use std::iter::Peekable;

use crate::compiler::{
    ClassDecl, CompileError, Expr, ExprKind, FuncDecl, Pos, Span, Stmt, StmtKind, Target, Token,
    TokenKind,
};

type ParseResult<T> = Result<T, CompileError>;

/// Seen once the token stream is exhausted.
static EOF: TokenKind = TokenKind::Eof;

/// Recursive descent parser over a token stream. Stops at the first error.
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: Peekable<I>,
    last_span: Span,
}

fn same_kind(a: &TokenKind, b: &TokenKind) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: I) -> Self {
        Self {
            tokens: tokens.peekable(),
            last_span: Span::point(Pos::origin()),
        }
    }

    /// Malformed tokens surface here, as soon as the parser looks at them.
    fn peek(&mut self) -> ParseResult<&TokenKind> {
        match self.tokens.peek() {
            Some(Token {
                kind: TokenKind::Error(message),
                span,
            }) => Err(CompileError::new(message.clone(), *span)),
            Some(token) => Ok(&token.kind),
            None => Ok(&EOF),
        }
    }

    fn peek_span(&mut self) -> Span {
        match self.tokens.peek() {
            Some(token) => token.span,
            None => self.last_span,
        }
    }

    fn check(&mut self, kind: &TokenKind) -> ParseResult<bool> {
        Ok(same_kind(self.peek()?, kind))
    }

    fn advance(&mut self) -> Token {
        match self.tokens.next() {
            Some(token) => {
                self.last_span = token.span;
                token
            }
            None => Token::new(TokenKind::Eof, self.last_span),
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> ParseResult<bool> {
        let found = self.check(kind)?;
        if found {
            self.advance();
        }
        Ok(found)
    }

    fn unexpected<T>(&mut self, expected: &str) -> ParseResult<T> {
        let found = self.peek()?.name();
        Err(CompileError::new(
            format!("expected {expected}, found {found}"),
            self.peek_span(),
        ))
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind)? {
            Ok(self.advance())
        } else {
            self.unexpected(kind.name())
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        match self.peek()? {
            TokenKind::Identifier(_) => match self.advance().kind {
                TokenKind::Identifier(name) => Ok(name),
                _ => unreachable!("peeked an identifier"),
            },
            _ => self.unexpected("a name"),
        }
    }

    /// Identifier or keyword after a `.`, so `x.class()` still reaches the method.
    fn expect_member_name(&mut self) -> ParseResult<String> {
        if let Some(word) = self.peek()?.keyword_text() {
            self.advance();
            return Ok(word.to_owned());
        }
        self.expect_identifier()
    }

    fn skip_separators(&mut self) -> ParseResult<()> {
        while matches!(self.peek()?, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
        Ok(())
    }

    /// Parses a whole source file.
    pub fn parse_program(&mut self) -> ParseResult<Vec<Stmt>> {
        let body = self.parse_block(|_| false)?;
        self.expect(&TokenKind::Eof)?;
        Ok(body)
    }

    /// Statements up to, not including, a token `stops` accepts or the end of input.
    fn parse_block(&mut self, stops: fn(&TokenKind) -> bool) -> ParseResult<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            self.skip_separators()?;
            let next = self.peek()?;
            if stops(next) || matches!(next, TokenKind::Eof) {
                return Ok(body);
            }
            body.push(self.parse_statement()?);
            let next = self.peek()?;
            if !(stops(next)
                || matches!(
                    next,
                    TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
                ))
            {
                return self.unexpected("end of statement");
            }
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek_span();
        let kind = match self.peek()? {
            TokenKind::Func => StmtKind::Func(self.parse_func()?),
            TokenKind::Class => StmtKind::Class(self.parse_class()?),
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expr()?;
                let body = self.parse_block(|kind| matches!(kind, TokenKind::End))?;
                self.expect(&TokenKind::End)?;
                StmtKind::While { condition, body }
            }
            TokenKind::Return => {
                self.advance();
                let value = match self.peek()? {
                    TokenKind::Newline
                    | TokenKind::Semicolon
                    | TokenKind::End
                    | TokenKind::Elif
                    | TokenKind::Else
                    | TokenKind::Eof => None,
                    _ => Some(self.parse_expr()?),
                };
                StmtKind::Return(value)
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(&TokenKind::Assign)? {
                    let target = match expr.kind {
                        ExprKind::Name(name) => Target::Name(name),
                        ExprKind::Attribute { object, name } => Target::Attribute {
                            object: *object,
                            name,
                        },
                        _ => {
                            return Err(CompileError::new(
                                "cannot assign to this expression",
                                expr.span,
                            ));
                        }
                    };
                    let value = self.parse_expr()?;
                    StmtKind::Assign { target, value }
                } else {
                    StmtKind::Expr(expr)
                }
            }
        };
        Ok(Stmt::new(kind, start.merge(self.last_span)))
    }

    /// `func name(params) body end`
    fn parse_func(&mut self) -> ParseResult<FuncDecl> {
        let start = self.expect(&TokenKind::Func)?.span;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen)? {
            loop {
                let param_span = self.peek_span();
                let param = self.expect_identifier()?;
                if params.contains(&param) {
                    return Err(CompileError::new(
                        format!("duplicate parameter `{param}'"),
                        param_span,
                    ));
                }
                params.push(param);
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block(|kind| matches!(kind, TokenKind::End))?;
        let end = self.expect(&TokenKind::End)?.span;
        Ok(FuncDecl {
            name,
            params,
            body,
            span: start.merge(end),
        })
    }

    /// `class Name [< super] (var a, b | func ...)* end`
    fn parse_class(&mut self) -> ParseResult<ClassDecl> {
        self.expect(&TokenKind::Class)?;
        let name = self.expect_identifier()?;
        let super_class = if self.eat(&TokenKind::Lt)? {
            Some(self.parse_postfix()?)
        } else {
            None
        };
        let mut attributes = Vec::new();
        let mut methods = Vec::new();
        loop {
            self.skip_separators()?;
            match self.peek()? {
                TokenKind::Var => {
                    self.advance();
                    loop {
                        attributes.push(self.expect_identifier()?);
                        if !self.eat(&TokenKind::Comma)? {
                            break;
                        }
                    }
                }
                TokenKind::Func => methods.push(self.parse_func()?),
                TokenKind::End => {
                    self.advance();
                    break;
                }
                _ => return self.unexpected("`var', `func' or `end' in class body"),
            }
        }
        Ok(ClassDecl {
            name,
            super_class,
            attributes,
            methods,
        })
    }

    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        fn branch_end(kind: &TokenKind) -> bool {
            matches!(kind, TokenKind::Elif | TokenKind::Else | TokenKind::End)
        }

        self.expect(&TokenKind::If)?;
        let mut branches = Vec::new();
        loop {
            let condition = self.parse_expr()?;
            let body = self.parse_block(branch_end)?;
            branches.push((condition, body));
            if !self.eat(&TokenKind::Elif)? {
                break;
            }
        }
        let otherwise = if self.eat(&TokenKind::Else)? {
            self.parse_block(|kind| matches!(kind, TokenKind::End))?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::End)?;
        Ok(StmtKind::If {
            branches,
            otherwise,
        })
    }

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or)? {
            let right = self.parse_and()?;
            let span = left.span.merge(right.span);
            left = Expr::new(ExprKind::Or(Box::new(left), Box::new(right)), span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And)? {
            let right = self.parse_not()?;
            let span = left.span.merge(right.span);
            left = Expr::new(ExprKind::And(Box::new(left), Box::new(right)), span);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::Not)? {
            let start = self.advance().span;
            let operand = self.parse_not()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(ExprKind::Not(Box::new(operand)), span));
        }
        self.parse_comparison()
    }

    /// Left associative binary sends over `operand`, for operators `accepts` takes.
    fn parse_binary(
        &mut self,
        accepts: fn(&TokenKind) -> bool,
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = operand(self)?;
        while accepts(self.peek()?) {
            let operator = self.advance().kind;
            let right = operand(self)?;
            let span = left.span.merge(right.span);
            left = match operator {
                TokenKind::NotEq => {
                    let equal = Expr::new(send(left, "==", vec![right]), span);
                    Expr::new(ExprKind::Not(Box::new(equal)), span)
                }
                operator => {
                    let selector = operator.selector().unwrap_or_default();
                    Expr::new(send(left, selector, vec![right]), span)
                }
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        self.parse_binary(
            |kind| {
                matches!(
                    kind,
                    TokenKind::EqEq
                        | TokenKind::NotEq
                        | TokenKind::Lt
                        | TokenKind::Le
                        | TokenKind::Gt
                        | TokenKind::Ge
                )
            },
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        self.parse_binary(
            |kind| matches!(kind, TokenKind::Plus | TokenKind::Minus),
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        self.parse_binary(
            |kind| matches!(kind, TokenKind::Star | TokenKind::Slash | TokenKind::Percent),
            Self::parse_unary,
        )
    }

    /// Unary minus folds into number literals, otherwise it sends `neg`.
    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if !self.check(&TokenKind::Minus)? {
            return self.parse_postfix();
        }
        let start = self.advance().span;
        let operand = self.parse_unary()?;
        let span = start.merge(operand.span);
        let kind = match operand.kind {
            ExprKind::Integer(value) => ExprKind::Integer(-value),
            ExprKind::Float(value) => ExprKind::Float(-value),
            _ => send(operand, "neg", Vec::new()),
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(&TokenKind::LParen)? {
                let args = self.parse_args()?;
                let span = expr.span.merge(self.last_span);
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                );
            } else if self.eat(&TokenKind::Dot)? {
                let start = expr.span;
                let name = self.expect_member_name()?;
                let kind = if self.check(&TokenKind::LParen)? {
                    let args = self.parse_args()?;
                    send(expr, &name, args)
                } else {
                    ExprKind::Attribute {
                        object: Box::new(expr),
                        name,
                    }
                };
                expr = Expr::new(kind, start.merge(self.last_span));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen)? {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::LParen)? {
            let start = self.advance().span;
            let inner = self.parse_expr()?;
            let end = self.expect(&TokenKind::RParen)?.span;
            return Ok(Expr::new(inner.kind, start.merge(end)));
        }
        let kind = match self.peek()? {
            TokenKind::Integer(value) => ExprKind::Integer(*value),
            TokenKind::Float(value) => ExprKind::Float(*value),
            TokenKind::String(value) => ExprKind::String(value.clone()),
            TokenKind::Symbol(name) => ExprKind::Symbol(name.clone()),
            TokenKind::Identifier(name) => ExprKind::Name(name.clone()),
            TokenKind::Nil => ExprKind::Nil,
            TokenKind::True => ExprKind::True,
            TokenKind::False => ExprKind::False,
            _ => return self.unexpected("an expression"),
        };
        let span = self.advance().span;
        Ok(Expr::new(kind, span))
    }
}

fn send(receiver: Expr, selector: &str, args: Vec<Expr>) -> ExprKind {
    ExprKind::Send {
        receiver: Box::new(receiver),
        selector: selector.to_owned(),
        args,
    }
}
