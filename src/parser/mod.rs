use crate::ast::*;
use crate::lexer::Token;

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    next_id: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

type Result<T> = std::result::Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Parser { tokens, pos: 0, next_id: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| self.eof_span())
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|(_, s)| *s)
            .unwrap_or(Span::UNKNOWN)
    }

    fn eof_span(&self) -> Span {
        self.tokens
            .last()
            .map(|(_, s)| Span::new(s.end, s.end))
            .unwrap_or(Span::UNKNOWN)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Access raw token (for lookahead).
    fn token_at(&self, idx: usize) -> Option<&Token> {
        self.tokens.get(idx).map(|(t, _)| t)
    }

    fn at(&self, tok: &Token) -> bool {
        self.peek() == Some(tok)
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => Err(self.error("B-P002", format!("expected {:?}, got {:?}", expected, tok))),
            None => Err(self.error("B-P002", format!("expected {:?}, got EOF", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<Ident> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                let span = self.peek_span();
                self.advance();
                Ok(self.ident(name, span))
            }
            Some(tok) => Err(self.error("B-P002", format!("expected identifier, got {:?}", tok))),
            None => Err(self.error("B-P002", "expected identifier, got EOF".into())),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError {
            code,
            position: self.pos,
            span: self.peek_span(),
            message,
        }
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn ident(&mut self, name: String, span: Span) -> Ident {
        Ident { name, id: self.next_id(), span }
    }

    fn skip_semis(&mut self) {
        while self.at(&Token::Semi) {
            self.advance();
        }
    }

    // ---- Sequences ----

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut body = Vec::new();
        loop {
            self.skip_semis();
            if self.peek().is_none() {
                break;
            }
            body.push(self.parse_expr()?);
        }
        Ok(Program { body, source: None })
    }

    /// `{ expr ;? expr ;? ... }`
    fn parse_block(&mut self) -> Result<Vec<Expr>> {
        self.expect(&Token::LBrace)?;
        let mut body = Vec::new();
        loop {
            self.skip_semis();
            match self.peek() {
                Some(Token::RBrace) => break,
                None => return Err(self.error("B-P002", "expected '}' to close block, got EOF".into())),
                Some(_) => body.push(self.parse_expr()?),
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(body)
    }

    /// Comma separated expressions up to (and consuming) `close`.
    fn parse_args(&mut self, close: &Token) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.at(close) {
            args.push(self.parse_expr()?);
            if !self.at(close) {
                self.expect(&Token::Comma)?;
            }
        }
        self.expect(close)?;
        Ok(args)
    }

    // ---- Expressions, lowest precedence first ----

    pub fn parse_expr(&mut self) -> Result<Expr> {
        let target = self.parse_or()?;
        if !self.at(&Token::Assign) {
            return Ok(target);
        }
        let eq_span = self.peek_span();
        self.advance();
        let value = Box::new(self.parse_expr()?);
        match target {
            Expr::Ident(target) => Ok(Expr::Assign { target, value }),
            Expr::Index { object, index, span } => Ok(Expr::AssignIndex { object, index, value, span }),
            Expr::Member { object, name, span } => Ok(Expr::AssignMember { object, name, value, span }),
            _ => Err(ParseError {
                code: "B-P003",
                position: self.pos,
                span: eq_span,
                message: "invalid assignment target; expected a variable, index or member".into(),
            }),
        }
    }

    /// One left-associative binary precedence level.
    fn parse_level(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr>,
        operator: fn(&Token) -> Option<BinOp>,
    ) -> Result<Expr> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek().and_then(operator) {
            let span = self.peek_span();
            self.advance();
            let right = operand(self)?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        self.parse_level(Self::parse_and, |t| matches!(t, Token::OrOr).then_some(BinOp::Or))
    }

    fn parse_and(&mut self) -> Result<Expr> {
        self.parse_level(Self::parse_equality, |t| matches!(t, Token::AndAnd).then_some(BinOp::And))
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        self.parse_level(Self::parse_comparison, |t| match t {
            Token::EqEq => Some(BinOp::Equals),
            Token::NotEq => Some(BinOp::NotEquals),
            _ => None,
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        self.parse_level(Self::parse_term, |t| match t {
            Token::Less => Some(BinOp::LessThan),
            Token::LessEq => Some(BinOp::LessOrEqual),
            Token::Greater => Some(BinOp::GreaterThan),
            Token::GreaterEq => Some(BinOp::GreaterOrEqual),
            _ => None,
        })
    }

    fn parse_term(&mut self) -> Result<Expr> {
        self.parse_level(Self::parse_factor, |t| match t {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Subtract),
            _ => None,
        })
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        self.parse_level(Self::parse_unary, |t| match t {
            Token::Star => Some(BinOp::Multiply),
            Token::Slash => Some(BinOp::Divide),
            Token::Percent => Some(BinOp::Modulo),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Negate,
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Beget) => UnaryOp::Beget,
            _ => return self.parse_postfix(),
        };
        let span = self.peek_span();
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary { op, operand: Box::new(operand), span })
    }

    /// Calls, member access and indexing chain left to right: `a.b(c)[d]`.
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    let open = self.peek_span();
                    self.advance();
                    let args = self.parse_args(&Token::RParen)?;
                    let span = expr.span().unwrap_or(open).merge(self.prev_span());
                    expr = Expr::Call { callee: Box::new(expr), args, span };
                }
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.expect_ident()?;
                    expr = Expr::Member { object: Box::new(expr), name: name.name, span: name.span };
                }
                Some(Token::LBracket) => {
                    let open = self.peek_span();
                    self.advance();
                    let index = self.parse_expr()?;
                    let close = self.expect(&Token::RBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        span: open.merge(close),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            Some(Token::Text(s)) => {
                self.advance();
                Ok(Expr::Literal(Literal::Text(s)))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Some(Token::Null) => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Some(Token::Ident(_)) => Ok(Expr::Ident(self.expect_ident()?)),
            Some(Token::SelfKw) => {
                let span = self.peek_span();
                self.advance();
                Ok(Expr::SelfRef { span })
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBrace) if self.is_object_literal_ahead() => self.parse_object(),
            Some(Token::LBrace) => Ok(Expr::Block(self.parse_block()?)),
            Some(Token::Fn) => self.parse_function(),
            Some(Token::Var) => self.parse_var(),
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => {
                self.advance();
                let guard = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Expr::While { guard: Box::new(guard), body })
            }
            Some(Token::Write) => {
                self.advance();
                self.expect(&Token::LParen)?;
                Ok(Expr::Write(self.parse_args(&Token::RParen)?))
            }
            Some(tok) => Err(self.error("B-P001", format!("expected expression, got {:?}", tok))),
            None => Err(self.error("B-P001", "expected expression, got EOF".into())),
        }
    }

    /// `{}` and `{ key: ...` open an object literal; any other `{` opens a block.
    fn is_object_literal_ahead(&self) -> bool {
        match self.token_at(self.pos + 1) {
            Some(Token::RBrace) => true,
            Some(Token::Ident(_)) | Some(Token::Text(_)) => {
                self.token_at(self.pos + 2) == Some(&Token::Colon)
            }
            _ => false,
        }
    }

    /// `{ key: value, "other key": value }`
    fn parse_object(&mut self) -> Result<Expr> {
        self.expect(&Token::LBrace)?;
        let mut props = Vec::new();
        while !self.at(&Token::RBrace) {
            let key = match self.peek().cloned() {
                Some(Token::Ident(name)) | Some(Token::Text(name)) => {
                    self.advance();
                    name
                }
                Some(tok) => return Err(self.error("B-P002", format!("expected property name, got {:?}", tok))),
                None => return Err(self.error("B-P002", "expected property name, got EOF".into())),
            };
            self.expect(&Token::Colon)?;
            props.push((key, self.parse_expr()?));
            if !self.at(&Token::RBrace) {
                self.expect(&Token::Comma)?;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Literal(Literal::Object(props)))
    }

    /// `fn (params) { body }`; a named `fn f(params) { body }` declares `f`.
    fn parse_function(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::Fn)?;
        let name = match self.peek() {
            Some(Token::Ident(_)) => Some(self.expect_ident()?),
            _ => None,
        };
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        while !self.at(&Token::RParen) {
            params.push(self.expect_ident()?);
            if !self.at(&Token::RParen) {
                self.expect(&Token::Comma)?;
            }
        }
        self.expect(&Token::RParen)?;
        let body = self.parse_block()?;
        let lit = FnLit {
            id: self.next_id(),
            name: name.as_ref().map(|n| n.name.clone()),
            params,
            body,
            span: start.merge(self.prev_span()),
        };
        Ok(match name {
            Some(name) => Expr::Var { name, init: Some(Box::new(Expr::Function(lit))) },
            None => Expr::Function(lit),
        })
    }

    fn parse_var(&mut self) -> Result<Expr> {
        self.expect(&Token::Var)?;
        let name = self.expect_ident()?;
        let init = if self.at(&Token::Assign) {
            self.advance();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        Ok(Expr::Var { name, init })
    }

    fn parse_if(&mut self) -> Result<Expr> {
        self.expect(&Token::If)?;
        let mut branches = Vec::new();
        let mut otherwise = None;
        loop {
            let condition = self.parse_expr()?;
            let body = self.parse_block()?;
            branches.push(Branch { condition, body });
            if !self.at(&Token::Else) {
                break;
            }
            self.advance();
            if self.at(&Token::If) {
                self.advance();
                continue;
            }
            otherwise = Some(self.parse_block()?);
            break;
        }
        Ok(Expr::If { branches, otherwise })
    }
}

/// Parse from token+span pairs. The first error is fatal.
pub fn parse(tokens: Vec<(Token, Span)>) -> Result<Program> {
    let mut parser = Parser::new(tokens);
    let program = parser.parse_program()?;
    tracing::debug!(expressions = program.body.len(), nodes = parser.next_id, "parsed program");
    Ok(program)
}
