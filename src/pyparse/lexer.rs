//! Zero-copy Python lexer.
//!
//! Produces [`Token`] variants that borrow `&'src str` slices directly from
//! the source buffer — no heap allocation for identifiers.
//!
//! Handles:
//! - The keyword tokens the statement parser dispatches on
//! - INDENT / DEDENT via an indentation stack
//! - Implicit line continuation inside `(`, `[`, `{`
//! - Explicit line continuation via trailing `\`
//! - All string literal forms (single/triple-quoted, raw, bytes, f-strings);
//!   string *content* is skipped — relationship extraction never needs it
//! - Comments (skipped)
//! - Semicolons as statement separators (treated like NEWLINE)

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    Name(&'src str),
    /// Any numeric literal — value not needed.
    Number,
    /// Any string literal — content not needed.
    Str,

    // Structural
    Newline,
    Indent,
    Dedent,

    // Punctuation the parser distinguishes
    Eq,    // =  (assignment; `==` lexes as Op)
    Colon, // :  (`:=` lexes as Op so expressions don't stop at a walrus)
    Comma, // ,
    Dot,   // .

    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    Star,    // *
    DblStar, // **
    At,      // @  (decorator position only; `@=` and infix `@` lex as Op)

    /// Every other operator, including augmented assignments, `->`, `:=`,
    /// comparisons, and arithmetic.
    Op,

    // Keywords
    KwImport,
    KwFrom,
    KwAs,
    KwDef,
    KwClass,
    KwAsync,
    KwIf,
    KwElif,
    KwElse,
    KwFor,
    KwWhile,
    KwWith,
    KwTry,
    KwExcept,
    KwFinally,
    KwLambda,
    /// `return raise pass break continue global nonlocal del assert in is
    /// not and or await yield True False None` — uniform for the parser.
    KwOther,

    Eof,
}

/// Keywords that never act as statement heads the parser cares about.
const OTHER_KEYWORDS: &[&str] = &[
    "return", "raise", "pass", "break", "continue", "global", "nonlocal", "del", "assert", "in",
    "is", "not", "and", "or", "await", "yield", "True", "False", "None",
];

// ── TokenWithOffset ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TokenWithOffset<'src> {
    pub token: Token<'src>,
    pub offset: u32,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

pub struct Lexer<'src> {
    src: &'src [u8],
    src_str: &'src str,
    /// Current byte position.
    pos: usize,
    /// Indentation stack; always starts with [0].
    indent_stack: Vec<usize>,
    /// How many DEDENT tokens remain to be emitted.
    pending_dedents: usize,
    /// Whether the next logical line should trigger indent/dedent analysis.
    at_line_start: bool,
    /// Nesting depth of `()`, `[]`, `{}`.  When > 0 newlines are ignored.
    bracket_depth: i32,
    /// One-token lookahead buffer.
    peeked: Option<TokenWithOffset<'src>>,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src: src.as_bytes(),
            src_str: src,
            pos: 0,
            indent_stack: vec![0],
            pending_dedents: 0,
            at_line_start: true,
            bracket_depth: 0,
            peeked: None,
        }
    }

    // ── public interface ──────────────────────────────────────────────────────

    /// Return (but do not consume) the next token.
    pub fn peek(&mut self) -> &Token<'src> {
        if self.peeked.is_none() {
            let t = self.next_inner();
            self.peeked = Some(t);
        }
        &self
            .peeked
            .as_ref()
            .expect("peeked is always Some after the fill above")
            .token
    }

    /// Return (but do not consume) the next token's byte offset.
    pub fn peek_offset(&mut self) -> u32 {
        self.peek();
        self.peeked
            .as_ref()
            .expect("peeked is always Some after the fill above")
            .offset
    }

    /// Consume and return the next token with its offset.
    pub fn consume(&mut self) -> TokenWithOffset<'src> {
        match self.peeked.take() {
            Some(t) => t,
            None => self.next_inner(),
        }
    }

    /// Consume the next token and return just the token (discards offset).
    pub fn bump(&mut self) -> Token<'src> {
        self.consume().token
    }

    /// Consume the next token only if it matches `expected`.
    /// Returns `true` if it matched and was consumed.
    pub fn eat(&mut self, expected: &Token<'src>) -> bool {
        if self.peek() == expected {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Current bracket nesting depth.  Non-zero at EOF means unclosed
    /// delimiters (truncated or syntactically broken input).
    pub fn bracket_depth(&self) -> i32 {
        self.bracket_depth
    }

    /// The full source buffer, for offset-based slicing (dotted names).
    pub fn src(&self) -> &'src str {
        self.src_str
    }

    // ── internal tokenisation ────────────────────────────────────────────────

    fn next_inner(&mut self) -> TokenWithOffset<'src> {
        if self.pending_dedents > 0 {
            self.pending_dedents -= 1;
            return self.tok(Token::Dedent, self.pos);
        }

        loop {
            if self.at_line_start && self.bracket_depth == 0 {
                self.at_line_start = false;
                if let Some(tok) = self.handle_indent() {
                    return tok;
                }
                if self.pending_dedents > 0 {
                    self.pending_dedents -= 1;
                    return self.tok(Token::Dedent, self.pos);
                }
                // A blank or comment-only line was consumed whole; restart
                // at the next line's start so its indent is measured from
                // column zero.
                if self.at_line_start {
                    continue;
                }
            }

            if self.pos >= self.src.len() {
                // Flush remaining DEDENT tokens before EOF.
                if self.indent_stack.len() > 1 {
                    self.pending_dedents = self.indent_stack.len() - 2;
                    self.indent_stack.truncate(1);
                    return self.tok(Token::Dedent, self.pos);
                }
                return self.tok(Token::Eof, self.pos);
            }

            let start = self.pos;
            let b = self.src[self.pos];

            match b {
                b' ' | b'\t' | b'\r' => {
                    self.pos += 1;
                }
                b'#' => {
                    while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'\n' => {
                    self.pos += 1;
                    if self.bracket_depth > 0 {
                        continue;
                    }
                    self.at_line_start = true;
                    return self.tok(Token::Newline, start);
                }
                b'\\' if self.peek_byte(1) == Some(b'\n') => {
                    // Explicit line continuation.
                    self.pos += 2;
                }
                b'\\' if self.peek_byte(1) == Some(b'\r') && self.peek_byte(2) == Some(b'\n') => {
                    self.pos += 3;
                }
                b';' => {
                    self.pos += 1;
                    return self.tok(Token::Newline, start);
                }
                b'(' => return self.open(Token::LParen),
                b')' => return self.close(Token::RParen),
                b'[' => return self.open(Token::LBracket),
                b']' => return self.close(Token::RBracket),
                b'{' => return self.open(Token::LBrace),
                b'}' => return self.close(Token::RBrace),
                b',' => {
                    self.pos += 1;
                    return self.tok(Token::Comma, start);
                }
                b'.' => {
                    // `...` and float literals like `.5` both collapse to
                    // tokens the parser treats uniformly.
                    if self.peek_byte(1) == Some(b'.') && self.peek_byte(2) == Some(b'.') {
                        self.pos += 3;
                        return self.tok(Token::Op, start);
                    }
                    if self.peek_byte(1).is_some_and(|c| c.is_ascii_digit()) {
                        self.lex_number();
                        return self.tok(Token::Number, start);
                    }
                    self.pos += 1;
                    return self.tok(Token::Dot, start);
                }
                b'=' => {
                    if self.peek_byte(1) == Some(b'=') {
                        self.pos += 2;
                        return self.tok(Token::Op, start);
                    }
                    self.pos += 1;
                    return self.tok(Token::Eq, start);
                }
                b':' => {
                    if self.peek_byte(1) == Some(b'=') {
                        self.pos += 2;
                        return self.tok(Token::Op, start);
                    }
                    self.pos += 1;
                    return self.tok(Token::Colon, start);
                }
                b'*' => {
                    if self.peek_byte(1) == Some(b'*') {
                        if self.peek_byte(2) == Some(b'=') {
                            self.pos += 3;
                            return self.tok(Token::Op, start);
                        }
                        self.pos += 2;
                        return self.tok(Token::DblStar, start);
                    }
                    if self.peek_byte(1) == Some(b'=') {
                        self.pos += 2;
                        return self.tok(Token::Op, start);
                    }
                    self.pos += 1;
                    return self.tok(Token::Star, start);
                }
                b'@' => {
                    if self.peek_byte(1) == Some(b'=') {
                        self.pos += 2;
                        return self.tok(Token::Op, start);
                    }
                    self.pos += 1;
                    return self.tok(Token::At, start);
                }
                b'\'' | b'"' => {
                    self.lex_string(start);
                    return self.tok(Token::Str, start);
                }
                b'0'..=b'9' => {
                    self.lex_number();
                    return self.tok(Token::Number, start);
                }
                _ if is_ident_start(b) => {
                    // Identifier or string prefix (r"", b"", f"", rb"" …).
                    let ident = self.lex_ident();
                    if self.pos < self.src.len()
                        && matches!(self.src[self.pos], b'\'' | b'"')
                        && ident.len() <= 2
                        && ident
                            .bytes()
                            .all(|c| matches!(c, b'r' | b'b' | b'f' | b'u' | b'R' | b'B' | b'F' | b'U'))
                    {
                        let quote_at = self.pos;
                        self.lex_string(quote_at);
                        return self.tok(Token::Str, start);
                    }
                    return self.tok(keyword_or_name(ident), start);
                }
                _ => {
                    // Any other operator byte (or stray UTF-8): advance one
                    // whole character so we never split a multibyte sequence.
                    self.pos += utf8_len(b);
                    return self.tok(Token::Op, start);
                }
            }
        }
    }

    // ── indentation ──────────────────────────────────────────────────────────

    /// Measure the indentation of the line starting at `self.pos`.
    /// Returns an INDENT/DEDENT token if the level changed, `None` if the
    /// line is blank/comment-only (consumed) or the level is unchanged.
    fn handle_indent(&mut self) -> Option<TokenWithOffset<'src>> {
        let mut col = 0usize;
        let mut i = self.pos;
        while i < self.src.len() {
            match self.src[i] {
                b' ' => col += 1,
                b'\t' => col += 8 - (col % 8),
                // CR before LF: width-less, so a CRLF blank line takes the
                // blank-line path below.
                b'\r' => {}
                _ => break,
            }
            i += 1;
        }
        // Blank or comment-only line: consume it without indent bookkeeping.
        if i >= self.src.len() {
            self.pos = i;
            return None;
        }
        if self.src[i] == b'\n' {
            self.pos = i + 1;
            self.at_line_start = true;
            return None;
        }
        if self.src[i] == b'#' {
            while i < self.src.len() && self.src[i] != b'\n' {
                i += 1;
            }
            self.pos = (i + 1).min(self.src.len());
            self.at_line_start = true;
            return None;
        }

        self.pos = i;
        let current = *self.indent_stack.last().expect("stack never empty");
        if col > current {
            self.indent_stack.push(col);
            return Some(self.tok(Token::Indent, i));
        }
        if col < current {
            let mut dedents = 0;
            while self.indent_stack.len() > 1
                && col < *self.indent_stack.last().expect("stack never empty")
            {
                self.indent_stack.pop();
                dedents += 1;
            }
            self.pending_dedents = dedents - 1;
            return Some(self.tok(Token::Dedent, i));
        }
        None
    }

    // ── literal scanners ─────────────────────────────────────────────────────

    /// Consume a string literal starting at the quote at `quote_at`.
    /// Handles triple quotes and backslash escapes; content is discarded.
    fn lex_string(&mut self, quote_at: usize) {
        let quote = self.src[quote_at];
        self.pos = quote_at;
        let triple = self.peek_byte(1) == Some(quote) && self.peek_byte(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            if b == b'\\' {
                self.pos = (self.pos + 2).min(self.src.len());
                continue;
            }
            if b == quote {
                if !triple {
                    self.pos += 1;
                    return;
                }
                if self.peek_byte(1) == Some(quote) && self.peek_byte(2) == Some(quote) {
                    self.pos += 3;
                    return;
                }
            }
            if b == b'\n' && !triple {
                // Unterminated single-quoted string — stop at the newline.
                return;
            }
            self.pos += utf8_len(b);
        }
    }

    fn lex_number(&mut self) {
        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
            } else if (b == b'+' || b == b'-')
                && matches!(self.src.get(self.pos - 1), Some(b'e') | Some(b'E'))
            {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn lex_ident(&mut self) -> &'src str {
        let start = self.pos;
        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            if b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 {
                self.pos += utf8_len(b);
            } else {
                break;
            }
        }
        &self.src_str[start..self.pos]
    }

    // ── small helpers ────────────────────────────────────────────────────────

    fn peek_byte(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn open(&mut self, t: Token<'src>) -> TokenWithOffset<'src> {
        let start = self.pos;
        self.bracket_depth += 1;
        self.pos += 1;
        self.tok(t, start)
    }

    fn close(&mut self, t: Token<'src>) -> TokenWithOffset<'src> {
        let start = self.pos;
        self.bracket_depth = (self.bracket_depth - 1).max(0);
        self.pos += 1;
        self.tok(t, start)
    }

    fn tok(&self, token: Token<'src>, offset: usize) -> TokenWithOffset<'src> {
        TokenWithOffset {
            token,
            offset: offset as u32,
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

fn keyword_or_name(ident: &str) -> Token<'_> {
    match ident {
        "import" => Token::KwImport,
        "from" => Token::KwFrom,
        "as" => Token::KwAs,
        "def" => Token::KwDef,
        "class" => Token::KwClass,
        "async" => Token::KwAsync,
        "if" => Token::KwIf,
        "elif" => Token::KwElif,
        "else" => Token::KwElse,
        "for" => Token::KwFor,
        "while" => Token::KwWhile,
        "with" => Token::KwWith,
        "try" => Token::KwTry,
        "except" => Token::KwExcept,
        "finally" => Token::KwFinally,
        "lambda" => Token::KwLambda,
        _ if OTHER_KEYWORDS.contains(&ident) => Token::KwOther,
        _ => Token::Name(ident),
    }
}

// ── tests ────────────────────────────────────────────────────────────────────
