//! Recursive-descent Python statement parser.
//!
//! Produces a `Vec<Stmt<'src>>` from a source string using the zero-copy
//! [`Lexer`].  Expressions are not parsed into a tree — they are reduced to
//! [`ExprInfo`] (name reads + call sites with callee shapes) in a single
//! forward pass.
//!
//! Unlike the expression scan, the *statement* grammar is bounded: parsing
//! aborts when the caller's wall-clock deadline passes or when suite nesting
//! exceeds the depth cap, and unclosed brackets at EOF are reported as a
//! syntax failure.  Within those bounds the parser recovers from anything
//! unexpected by reducing the statement to [`StmtKind::Expr`] with its names
//! and calls collected.

use crate::ast::{
    AssignTarget, CallInfo, Callee, ClassDef, ExceptHandler, ExprInfo, ExprKind, FuncDef,
    ImportAlias, Offset, Stmt, StmtKind,
};
use crate::pyparse::lexer::{Lexer, Token};
use std::fmt;
use std::time::Instant;

// ── Limits / errors ───────────────────────────────────────────────────────────

/// Resource bounds applied to one parse invocation.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    /// Absolute wall-clock point after which parsing aborts.
    pub deadline: Option<Instant>,
    /// Maximum suite-nesting depth.
    pub max_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            deadline: None,
            max_depth: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The wall-clock deadline elapsed mid-parse.
    Timeout,
    /// Suite nesting exceeded the configured cap.
    DepthExceeded,
    /// The module ended with unclosed brackets — truncated or broken source.
    UnclosedBrackets,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Timeout => write!(f, "parse deadline exceeded"),
            ParseError::DepthExceeded => write!(f, "suite nesting exceeds depth limit"),
            ParseError::UnclosedBrackets => write!(f, "unclosed brackets at end of file"),
        }
    }
}

impl std::error::Error for ParseError {}

// ── Public entry point ────────────────────────────────────────────────────────

/// Parse a Python source string into a list of top-level statements.
pub fn parse<'src>(src: &'src str, limits: ParseLimits) -> Result<Vec<Stmt<'src>>, ParseError> {
    let mut p = Parser::new(src, limits);
    let stmts = p.parse_module();
    match p.fail {
        Some(e) => Err(e),
        None if p.lex.bracket_depth() > 0 => Err(ParseError::UnclosedBrackets),
        None => Ok(stmts),
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser<'src> {
    lex: Lexer<'src>,
    limits: ParseLimits,
    depth: usize,
    /// First bound violation observed; once set, parsing unwinds fast.
    fail: Option<ParseError>,
}

impl<'src> Parser<'src> {
    fn new(src: &'src str, limits: ParseLimits) -> Self {
        Self {
            lex: Lexer::new(src),
            limits,
            depth: 0,
            fail: None,
        }
    }

    fn peek(&mut self) -> &Token<'src> {
        self.lex.peek()
    }

    // ── Module ────────────────────────────────────────────────────────────────

    fn parse_module(&mut self) -> Vec<Stmt<'src>> {
        let mut stmts = Vec::new();
        let mut last_offset = u32::MAX;
        loop {
            if self.fail.is_some() {
                return stmts;
            }
            self.skip_newlines();
            match self.peek() {
                Token::Eof => break,
                // Stray INDENT/DEDENT leaking to module level after a
                // mishandled compound statement — consume and continue.
                Token::Indent | Token::Dedent => {
                    self.lex.bump();
                }
                _ => {
                    // A statement that consumes nothing (e.g. a stray `)`)
                    // would spin forever; skip the offending token instead.
                    let at = self.lex.peek_offset();
                    if at == last_offset {
                        self.lex.bump();
                        continue;
                    }
                    last_offset = at;
                    let s = self.parse_stmt();
                    stmts.push(s);
                }
            }
        }
        stmts
    }

    // ── Statement dispatch ────────────────────────────────────────────────────

    fn parse_stmt(&mut self) -> Stmt<'src> {
        self.check_bounds();
        let offset = self.lex.peek_offset();
        if self.fail.is_some() {
            return Stmt {
                offset,
                kind: StmtKind::Expr(ExprInfo::default()),
            };
        }
        match self.peek().clone() {
            Token::KwImport => self.parse_import(offset),
            Token::KwFrom => self.parse_from_import(offset),
            Token::KwDef => self.parse_funcdef(offset, false),
            Token::KwAsync => self.parse_async_stmt(offset),
            Token::KwClass => self.parse_classdef(offset),
            Token::KwIf => self.parse_if(offset),
            Token::KwFor => self.parse_for(offset),
            Token::KwWhile => self.parse_while(offset),
            Token::KwWith => self.parse_with(offset),
            Token::KwTry => self.parse_try(offset),
            Token::At => self.parse_decorated(offset),
            // Stray suite keywords (elif/else/except/finally at statement
            // position) and everything else reduce to an expression statement.
            _ => self.parse_expr_stmt(offset),
        }
    }

    fn check_bounds(&mut self) {
        if self.fail.is_some() {
            return;
        }
        if let Some(deadline) = self.limits.deadline
            && Instant::now() > deadline
        {
            self.fail = Some(ParseError::Timeout);
        }
    }

    // ── import ────────────────────────────────────────────────────────────────

    fn parse_import(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `import`
        let mut names = Vec::new();
        loop {
            let alias_offset = self.lex.peek_offset();
            let name = self.parse_dotted_name();
            let asname = if matches!(self.peek(), Token::KwAs) {
                self.lex.bump();
                self.expect_name()
            } else {
                None
            };
            if !name.is_empty() {
                names.push(ImportAlias {
                    name,
                    asname,
                    offset: alias_offset,
                });
            }
            if !self.lex.eat(&Token::Comma) {
                break;
            }
        }
        self.eat_newline();
        Stmt {
            offset,
            kind: StmtKind::Import(names),
        }
    }

    fn parse_from_import(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `from`
        let mut level = 0u32;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.lex.bump();
                    level += 1;
                }
                // `...` lexes as a single Op in this lexer; a relative import
                // that deep is vanishingly rare but must not derail parsing.
                Token::Op => {
                    self.lex.bump();
                    level += 3;
                }
                _ => break,
            }
        }
        let module = match self.peek() {
            Token::Name(_) => Some(self.parse_dotted_name()),
            _ => None,
        };
        let _ = self.lex.eat(&Token::KwImport);

        if matches!(self.peek(), Token::Star) {
            self.lex.bump();
            self.eat_newline();
            return Stmt {
                offset,
                kind: StmtKind::ImportFrom {
                    module,
                    names: vec![],
                    level,
                    star: true,
                },
            };
        }

        let parens = self.lex.eat(&Token::LParen);
        let mut names = Vec::new();
        loop {
            match self.peek() {
                Token::RParen | Token::Newline | Token::Eof | Token::Dedent => break,
                _ => {}
            }
            let alias_offset = self.lex.peek_offset();
            let name = match self.lex.bump() {
                Token::Name(n) => n,
                _ => "",
            };
            let asname = if matches!(self.peek(), Token::KwAs) {
                self.lex.bump();
                self.expect_name()
            } else {
                None
            };
            if !name.is_empty() {
                names.push(ImportAlias {
                    name,
                    asname,
                    offset: alias_offset,
                });
            }
            if !self.lex.eat(&Token::Comma) {
                break;
            }
        }
        if parens {
            let _ = self.lex.eat(&Token::RParen);
        }
        self.eat_newline();
        Stmt {
            offset,
            kind: StmtKind::ImportFrom {
                module,
                names,
                level,
                star: false,
            },
        }
    }

    // ── def / class ───────────────────────────────────────────────────────────

    fn parse_async_stmt(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `async`
        match self.peek().clone() {
            Token::KwDef => self.parse_funcdef(offset, true),
            Token::KwFor => self.parse_for(offset),
            Token::KwWith => self.parse_with(offset),
            _ => self.parse_expr_stmt(offset),
        }
    }

    fn parse_funcdef(&mut self, offset: Offset, is_async: bool) -> Stmt<'src> {
        self.lex.bump(); // `def`
        let name = self.expect_name().unwrap_or("");
        // Parameter list: arguments are bindings, not reads — skip the whole
        // group.  Defaults and annotations are intentionally not scanned.
        if matches!(self.peek(), Token::LParen) {
            self.skip_bracket_group();
        }
        // Optional `-> annotation`, then `:`.
        self.skip_until_colon();
        let _ = self.lex.eat(&Token::Colon);
        let body = self.parse_suite();
        Stmt {
            offset,
            kind: StmtKind::FunctionDef(Box::new(FuncDef {
                name,
                offset,
                is_async,
                decorators: Vec::new(), // filled by parse_decorated
                body,
            })),
        }
    }

    fn parse_classdef(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `class`
        let name = self.expect_name().unwrap_or("");
        let mut bases = Vec::new();
        let mut keywords = Vec::new();
        if self.lex.eat(&Token::LParen) {
            loop {
                match self.peek() {
                    Token::RParen | Token::Eof => break,
                    Token::Comma => {
                        self.lex.bump();
                        continue;
                    }
                    Token::DblStar | Token::Star => {
                        // `**kwargs` / `*bases` in a class header — skip.
                        self.lex.bump();
                        let _ = self.parse_expr_info_until(&[Token::Comma, Token::RParen]);
                    }
                    _ => {
                        let before = self.lex.peek_offset();
                        let info =
                            self.parse_expr_info_until(&[Token::Comma, Token::RParen, Token::Eq]);
                        if self.lex.peek_offset() == before && !matches!(self.peek(), Token::Eq) {
                            // Malformed header — skip the token the scan
                            // refused to consume.
                            self.lex.bump();
                            continue;
                        }
                        if matches!(self.peek(), Token::Eq) {
                            // Keyword class argument: `metaclass=Meta`.
                            self.lex.bump();
                            let value =
                                self.parse_expr_info_until(&[Token::Comma, Token::RParen]);
                            if let ExprKind::Name(kw) = info.kind {
                                keywords.push((kw, value));
                            }
                        } else {
                            bases.push(info);
                        }
                    }
                }
            }
            let _ = self.lex.eat(&Token::RParen);
        }
        let _ = self.lex.eat(&Token::Colon);
        let body = self.parse_suite();
        Stmt {
            offset,
            kind: StmtKind::ClassDef(Box::new(ClassDef {
                name,
                offset,
                bases,
                keywords,
                decorators: Vec::new(),
                body,
            })),
        }
    }

    fn parse_decorated(&mut self, offset: Offset) -> Stmt<'src> {
        let mut decorators = Vec::new();
        while matches!(self.peek(), Token::At) {
            self.lex.bump();
            decorators.push(self.parse_expr_info_until(&[]));
            self.eat_newline();
            self.skip_newlines();
        }
        let inner_offset = self.lex.peek_offset();
        let mut stmt = match self.peek().clone() {
            Token::KwDef => self.parse_funcdef(inner_offset, false),
            Token::KwClass => self.parse_classdef(inner_offset),
            Token::KwAsync => self.parse_async_stmt(inner_offset),
            _ => self.parse_expr_stmt(inner_offset),
        };
        stmt.offset = offset;
        match &mut stmt.kind {
            StmtKind::FunctionDef(f) => f.decorators = decorators,
            StmtKind::ClassDef(c) => c.decorators = decorators,
            _ => {}
        }
        stmt
    }

    // ── compound statements ───────────────────────────────────────────────────

    fn parse_if(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `if` / `elif`
        let test = self.parse_expr_info_until(&[]);
        let _ = self.lex.eat(&Token::Colon);
        let body = self.parse_suite();
        let orelse = self.parse_elif_else();
        Stmt {
            offset,
            kind: StmtKind::If { test, body, orelse },
        }
    }

    fn parse_elif_else(&mut self) -> Vec<Stmt<'src>> {
        match self.peek() {
            Token::KwElif => {
                let offset = self.lex.peek_offset();
                vec![self.parse_if(offset)]
            }
            Token::KwElse => {
                self.lex.bump();
                let _ = self.lex.eat(&Token::Colon);
                self.parse_suite()
            }
            _ => vec![],
        }
    }

    fn parse_for(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `for`
        // Loop targets are bindings — skip to `in`.  The only keyword that
        // can appear at depth 0 in a target list is `in` itself (it lexes
        // as KwOther).
        let mut depth = 0i32;
        loop {
            match self.peek() {
                Token::Eof | Token::Newline | Token::Dedent => break,
                Token::KwOther if depth == 0 => {
                    self.lex.bump();
                    break;
                }
                Token::LParen | Token::LBracket | Token::LBrace => {
                    depth += 1;
                    self.lex.bump();
                }
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth -= 1;
                    self.lex.bump();
                }
                _ => {
                    self.lex.bump();
                }
            }
        }
        let iter = self.parse_expr_info_until(&[]);
        let _ = self.lex.eat(&Token::Colon);
        let body = self.parse_suite();
        let orelse = self.parse_else_clause();
        Stmt {
            offset,
            kind: StmtKind::For { iter, body, orelse },
        }
    }

    fn parse_while(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `while`
        let test = self.parse_expr_info_until(&[]);
        let _ = self.lex.eat(&Token::Colon);
        let body = self.parse_suite();
        let orelse = self.parse_else_clause();
        Stmt {
            offset,
            kind: StmtKind::While { test, body, orelse },
        }
    }

    fn parse_else_clause(&mut self) -> Vec<Stmt<'src>> {
        if matches!(self.peek(), Token::KwElse) {
            self.lex.bump();
            let _ = self.lex.eat(&Token::Colon);
            self.parse_suite()
        } else {
            vec![]
        }
    }

    fn parse_with(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `with`
        let mut items = Vec::new();
        loop {
            let context = self.parse_expr_info_until(&[Token::KwAs, Token::Comma]);
            items.push(context);
            if matches!(self.peek(), Token::KwAs) {
                self.lex.bump();
                // The bound target is a binding — skip it.
                let _ = self.parse_expr_info_until(&[Token::Comma]);
            }
            if !self.lex.eat(&Token::Comma) {
                break;
            }
        }
        let _ = self.lex.eat(&Token::Colon);
        let body = self.parse_suite();
        Stmt {
            offset,
            kind: StmtKind::With { items, body },
        }
    }

    fn parse_try(&mut self, offset: Offset) -> Stmt<'src> {
        self.lex.bump(); // `try`
        let _ = self.lex.eat(&Token::Colon);
        let body = self.parse_suite();
        let mut handlers = Vec::new();
        while matches!(self.peek(), Token::KwExcept) {
            self.lex.bump();
            // `except*` (3.11)
            let _ = self.lex.eat(&Token::Star);
            let type_expr = match self.peek() {
                Token::Colon | Token::Newline | Token::Eof => ExprInfo::default(),
                _ => self.parse_expr_info_until(&[Token::KwAs]),
            };
            if matches!(self.peek(), Token::KwAs) {
                self.lex.bump();
                let _ = self.expect_name();
            }
            let _ = self.lex.eat(&Token::Colon);
            let handler_body = self.parse_suite();
            handlers.push(ExceptHandler {
                type_names: type_expr.names.iter().map(|(n, _)| *n).collect(),
                body: handler_body,
            });
        }
        let orelse = self.parse_else_clause();
        let finalbody = if matches!(self.peek(), Token::KwFinally) {
            self.lex.bump();
            let _ = self.lex.eat(&Token::Colon);
            self.parse_suite()
        } else {
            vec![]
        };
        Stmt {
            offset,
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
        }
    }

    // ── expression statements / assignments ──────────────────────────────────

    fn parse_expr_stmt(&mut self, offset: Offset) -> Stmt<'src> {
        let lhs = self.parse_expr_info_until(&[]);
        match self.peek().clone() {
            Token::Eq => {
                // `a = b = expr` — chase the chain; everything before the
                // final expression is a target.
                let mut targets = vec![info_to_target(&lhs, offset)];
                loop {
                    self.lex.bump(); // `=`
                    let next_offset = self.lex.peek_offset();
                    let next = self.parse_expr_info_until(&[]);
                    if matches!(self.peek(), Token::Eq) {
                        targets.push(info_to_target(&next, next_offset));
                    } else {
                        self.eat_newline();
                        return Stmt {
                            offset,
                            kind: StmtKind::Assign {
                                targets,
                                value: next,
                            },
                        };
                    }
                }
            }
            Token::Colon => {
                self.lex.bump();
                // Block header (`match x:`, unknown compounds) or annotated
                // assignment (`x: T = expr`).
                if matches!(self.peek(), Token::Newline) {
                    let body = self.parse_suite();
                    return Stmt {
                        offset,
                        kind: StmtKind::Block { header: lhs, body },
                    };
                }
                let annotation = self.parse_expr_info_until(&[]);
                if matches!(self.peek(), Token::Eq) {
                    self.lex.bump();
                    let mut value = self.parse_expr_info_until(&[]);
                    self.eat_newline();
                    // Annotation names are reads too.
                    value.names.extend(annotation.names);
                    return Stmt {
                        offset,
                        kind: StmtKind::Assign {
                            targets: vec![info_to_target(&lhs, offset)],
                            value,
                        },
                    };
                }
                // Could still be an inline suite: `if x: y` parses its own
                // suite, so a colon here with trailing tokens is either a
                // bare annotation or an unmodelled header — fold the facts.
                let mut merged = lhs;
                merged.names.extend(annotation.names);
                merged.calls.extend(annotation.calls);
                self.eat_newline();
                Stmt {
                    offset,
                    kind: StmtKind::Expr(merged),
                }
            }
            _ => {
                self.eat_newline();
                Stmt {
                    offset,
                    kind: StmtKind::Expr(lhs),
                }
            }
        }
    }

    // ── suite (indented block) ────────────────────────────────────────────────

    fn parse_suite(&mut self) -> Vec<Stmt<'src>> {
        if self.fail.is_some() {
            return vec![];
        }
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            self.fail = Some(ParseError::DepthExceeded);
            self.depth -= 1;
            return vec![];
        }
        let stmts = self.parse_suite_inner();
        self.depth -= 1;
        stmts
    }

    fn parse_suite_inner(&mut self) -> Vec<Stmt<'src>> {
        self.skip_newlines();
        // Inline suite: `if cond: stmt` (no newline before the body).
        if !matches!(self.peek(), Token::Indent | Token::Newline | Token::Eof) {
            return vec![self.parse_stmt()];
        }
        if !matches!(self.peek(), Token::Indent) {
            return vec![];
        }
        self.lex.bump(); // INDENT
        let mut stmts = Vec::new();
        let mut last_offset = u32::MAX;
        loop {
            if self.fail.is_some() {
                return stmts;
            }
            self.skip_newlines();
            match self.peek() {
                Token::Dedent | Token::Eof => break,
                _ => {
                    let at = self.lex.peek_offset();
                    if at == last_offset {
                        self.lex.bump();
                        continue;
                    }
                    last_offset = at;
                    stmts.push(self.parse_stmt());
                }
            }
        }
        let _ = self.lex.eat(&Token::Dedent);
        stmts
    }

    // ── Expression scanning ───────────────────────────────────────────────────
    //
    // Expressions are scanned, not parsed: the loop consumes tokens up to a
    // statement boundary (or a caller-supplied stop token at bracket depth
    // 0), collecting name reads and call sites.  Dotted chains are resolved
    // to a callee shape when followed by `(`.

    /// Scan an expression, stopping (without consuming) at any of `stops`
    /// seen at bracket depth 0, or at a statement boundary (`Newline`,
    /// `Eof`, `Dedent`) or top-level `=` / `:`.
    fn parse_expr_info_until(&mut self, stops: &[Token<'src>]) -> ExprInfo<'src> {
        let mut info = ExprInfo::default();
        let mut depth = 0i32;
        let mut first = true;
        // Depth recorded when a `getattr(` group opened; used to recognise
        // the `getattr(...)(...)` dynamic-call shape.
        let mut getattr_at: Option<(i32, usize)> = None;
        // True when the previous consumed token was a `)`.
        let mut just_closed_paren = false;

        loop {
            let tok = self.peek().clone();

            if depth == 0 {
                match &tok {
                    Token::Newline | Token::Eof | Token::Dedent | Token::Eq | Token::Colon => break,
                    t if stops.iter().any(|s| s == t) => break,
                    _ => {}
                }
            }

            match tok {
                Token::Name(n) => {
                    let name_offset = self.lex.peek_offset();
                    self.lex.bump();
                    just_closed_paren = false;
                    info.names.push((n, name_offset));

                    // Chase the dotted chain: `n.a.b…`.
                    let mut hops: Vec<&'src str> = Vec::new();
                    while matches!(self.peek(), Token::Dot) {
                        self.lex.bump();
                        match self.peek().clone() {
                            Token::Name(attr) => {
                                self.lex.bump();
                                hops.push(attr);
                            }
                            _ => break,
                        }
                    }
                    if first {
                        info.kind = match hops.first() {
                            None => ExprKind::Name(n),
                            Some(a) => ExprKind::Attr(n, a),
                        };
                        first = false;
                    }
                    // A call?
                    if matches!(self.peek(), Token::LParen) {
                        let callee = match hops.len() {
                            0 => Callee::Name(n),
                            1 => Callee::Attr(n, hops[0]),
                            _ => Callee::Chained,
                        };
                        if callee == Callee::Name("getattr") {
                            getattr_at = Some((depth, info.calls.len()));
                        }
                        info.calls.push(CallInfo {
                            callee,
                            offset: name_offset,
                        });
                    }
                    continue;
                }
                Token::LParen => {
                    // `(...)(…)` — a call on a just-closed group.  When that
                    // group was a `getattr(...)` at the same depth, this is
                    // the dynamic-dispatch shape.
                    if just_closed_paren
                        && let Some((d, idx)) = getattr_at
                        && d == depth
                    {
                        info.calls[idx].callee = Callee::GetattrDynamic;
                        getattr_at = None;
                    }
                    depth += 1;
                    self.lex.bump();
                    just_closed_paren = false;
                    first = false;
                    continue;
                }
                Token::LBracket | Token::LBrace => {
                    depth += 1;
                    self.lex.bump();
                    just_closed_paren = false;
                    first = false;
                    continue;
                }
                Token::RParen | Token::RBracket | Token::RBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    self.lex.bump();
                    just_closed_paren = matches!(tok, Token::RParen);
                    first = false;
                    continue;
                }
                Token::KwLambda => {
                    self.lex.bump();
                    self.skip_lambda_params();
                    just_closed_paren = false;
                    first = false;
                    continue;
                }
                Token::Dot => {
                    self.lex.bump();
                    if matches!(self.peek(), Token::Name(_)) {
                        self.lex.bump();
                    }
                    just_closed_paren = false;
                    first = false;
                    continue;
                }
                _ => {
                    self.lex.bump();
                    just_closed_paren = false;
                    first = false;
                    continue;
                }
            }
        }
        info
    }

    /// Skip lambda parameters up to (and consuming) the body `:`.
    fn skip_lambda_params(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                Token::Eof | Token::Newline | Token::Dedent => break,
                Token::Colon if depth == 0 => {
                    self.lex.bump();
                    break;
                }
                Token::LParen | Token::LBracket | Token::LBrace => {
                    depth += 1;
                    self.lex.bump();
                }
                Token::RParen | Token::RBracket | Token::RBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    self.lex.bump();
                }
                _ => {
                    self.lex.bump();
                }
            }
        }
    }

    // ── token helpers ─────────────────────────────────────────────────────────

    /// Consume a balanced bracket group starting at the current `(`/`[`/`{`.
    fn skip_bracket_group(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                Token::Eof => break,
                Token::LParen | Token::LBracket | Token::LBrace => {
                    depth += 1;
                    self.lex.bump();
                }
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth -= 1;
                    self.lex.bump();
                    if depth <= 0 {
                        break;
                    }
                }
                _ => {
                    self.lex.bump();
                }
            }
        }
    }

    /// Skip tokens until a depth-0 `:` (not consumed) or statement boundary.
    fn skip_until_colon(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                Token::Eof | Token::Newline | Token::Dedent => break,
                Token::Colon if depth == 0 => break,
                Token::LParen | Token::LBracket | Token::LBrace => {
                    depth += 1;
                    self.lex.bump();
                }
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth -= 1;
                    self.lex.bump();
                }
                _ => {
                    self.lex.bump();
                }
            }
        }
    }

    fn expect_name(&mut self) -> Option<&'src str> {
        match self.peek().clone() {
            Token::Name(n) => {
                self.lex.bump();
                Some(n)
            }
            _ => None,
        }
    }

    /// Parse `a.b.c` and return the full dotted span as one source slice.
    fn parse_dotted_name(&mut self) -> &'src str {
        let start = self.lex.peek_offset() as usize;
        let Some(first) = self.expect_name() else {
            return "";
        };
        let mut end = start + first.len();
        while matches!(self.peek(), Token::Dot) {
            self.lex.bump();
            let part_off = self.lex.peek_offset() as usize;
            match self.expect_name() {
                Some(part) => end = part_off + part.len(),
                None => break,
            }
        }
        &self.lex.src()[start..end]
    }

    fn eat_newline(&mut self) {
        let _ = self.lex.eat(&Token::Newline);
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.lex.bump();
        }
    }
}

fn info_to_target<'src>(info: &ExprInfo<'src>, offset: Offset) -> AssignTarget<'src> {
    match info.kind {
        // A call on the left means subscript/complex — not a plain binding.
        _ if !info.calls.is_empty() => AssignTarget::Other,
        ExprKind::Name(n) => AssignTarget::Name(n, offset),
        ExprKind::Attr(base, attr) => AssignTarget::Attr { base, attr, offset },
        ExprKind::Other => AssignTarget::Other,
    }
}

// ── tests ────────────────────────────────────────────────────────────────────
