/// Streaming lexer for tern source text.
///
/// The [`Lexer`] consumes bytes from any [`std::io::Read`] source (a file,
/// `stdin`, or an in-memory buffer) and implements [`Iterator`] over
/// [`Token`]s. It tracks byte offset, line, and column for every token it
/// produces.
///
/// # Comment syntax
///
/// | Syntax         | Kind          | Notes                        |
/// |----------------|---------------|------------------------------|
/// | `// …`         | Line comment  | Runs to end of line          |
/// | `/* … */`      | Block comment | **Nestable** (`/* /* */ */`) |
///
/// # Literals
///
/// Integers may carry a `0x`, `0o` or `0b` prefix and `_` separators.
/// Floats need a digit on both sides of the `.` and may carry an exponent.
/// Strings are double-quoted with the escapes `\n \t \r \" \\ \0`.
use std::io::Read;

use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

// ═══════════════════════════════════════════════════════════════════
// Read buffer: one byte at a time over any Read
// ═══════════════════════════════════════════════════════════════════

/// Enough lookahead for two maximum-length UTF-8 characters.
const LOOKAHEAD: usize = 8;

struct ReadBuf<R: Read> {
    reader: R,
    buf: [u8; LOOKAHEAD],
    /// How many valid bytes are in `buf` starting from index 0.
    filled: usize,
    reader_eof: bool,
    offset: usize,
    line: usize,
    column: usize,
}

impl<R: Read> ReadBuf<R> {
    fn new(reader: R) -> Self {
        let mut rb = Self {
            reader,
            buf: [0u8; LOOKAHEAD],
            filled: 0,
            reader_eof: false,
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
                Ok(0) | Err(_) => self.reader_eof = true,
                Ok(_) => {
                    self.buf[self.filled] = one[0];
                    self.filled += 1;
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

    /// Decode the leading UTF-8 character without consuming it.
    /// Invalid sequences decode as U+FFFD with length 1.
    fn peek_char(&self) -> Option<(char, usize)> {
        let b0 = self.peek()?;
        let (expected_len, first_bits) = match b0 {
            0x00..=0x7F => return Some((b0 as char, 1)),
            0xC0..=0xDF => (2, (b0 & 0x1F) as u32),
            0xE0..=0xEF => (3, (b0 & 0x0F) as u32),
            0xF0..=0xF7 => (4, (b0 & 0x07) as u32),
            _ => return Some(('\u{FFFD}', 1)),
        };
        if expected_len > self.filled {
            return Some(('\u{FFFD}', 1));
        }
        let mut codepoint = first_bits;
        for &cont in &self.buf[1..expected_len] {
            if cont & 0xC0 != 0x80 {
                return Some(('\u{FFFD}', 1));
            }
            codepoint = (codepoint << 6) | (cont & 0x3F) as u32;
        }
        match char::from_u32(codepoint) {
            Some(ch) => Some((ch, expected_len)),
            None => Some(('\u{FFFD}', 1)),
        }
    }

    fn advance_char(&mut self) -> Option<(char, usize)> {
        let (ch, len) = self.peek_char()?;
        for _ in 0..len {
            self.advance();
        }
        Some((ch, len))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════

/// A streaming lexer for tern source code.
///
/// ```rust
/// use parser::{Lexer, TokenKind};
///
/// let kinds: Vec<_> = Lexer::from_str("x += 1;").map(|t| t.kind).collect();
/// assert_eq!(kinds[1], TokenKind::PlusAssign);
/// ```
pub struct Lexer<R: Read> {
    rb: ReadBuf<R>,
    emitted_eof: bool,
}

impl<R: Read> Lexer<R> {
    /// Create a new lexer over the given readable stream.
    pub fn new(reader: R) -> Self {
        Self {
            rb: ReadBuf::new(reader),
            emitted_eof: false,
        }
    }
}

impl<'a> Lexer<&'a [u8]> {
    /// Create a new lexer from a source string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(source: &'a str) -> Self {
        Self::new(source.as_bytes())
    }
}

impl<R: Read> Lexer<R> {
    fn pos(&self) -> Pos {
        self.rb.pos()
    }

    fn peek(&self) -> Option<u8> {
        self.rb.peek()
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.rb.peek_ahead(n)
    }

    fn advance(&mut self) -> Option<u8> {
        self.rb.advance()
    }

    // ───────────────────────────────────────────────────────────
    //  Whitespace
    // ───────────────────────────────────────────────────────────

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C) = self.peek()
        {
            self.advance();
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Comments:  // line   and   /* block (nestable) */
    // ───────────────────────────────────────────────────────────

    fn lex_line_comment(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        self.advance();
        let mut text = Vec::new();
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            text.push(b);
            self.advance();
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        let raw = format!("//{text}");
        Token::new(
            TokenKind::LineComment(text),
            Span::new(start, self.pos()),
            raw,
        )
    }

    fn lex_block_comment(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        self.advance();
        let mut text = Vec::new();
        let mut depth: usize = 1;

        loop {
            match self.peek() {
                None => {
                    return Token::new(
                        TokenKind::Error("unterminated block comment".into()),
                        Span::new(start, self.pos()),
                        "/*",
                    );
                }
                Some(b'/') if self.peek_ahead(1) == Some(b'*') => {
                    depth += 1;
                    text.extend_from_slice(b"/*");
                    self.advance();
                    self.advance();
                }
                Some(b'*') if self.peek_ahead(1) == Some(b'/') => {
                    depth -= 1;
                    self.advance();
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                    text.extend_from_slice(b"*/");
                }
                Some(b) => {
                    text.push(b);
                    self.advance();
                }
            }
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        let raw = format!("/*{text}*/");
        Token::new(
            TokenKind::BlockComment(text),
            Span::new(start, self.pos()),
            raw,
        )
    }

    // ───────────────────────────────────────────────────────────
    //  String literals:  "..."
    // ───────────────────────────────────────────────────────────

    fn lex_string(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        let mut value = Vec::new();
        let mut raw = vec![b'"'];
        loop {
            match self.advance() {
                Some(b'"') => {
                    raw.push(b'"');
                    break;
                }
                Some(b'\\') => {
                    raw.push(b'\\');
                    let Some(esc) = self.advance() else {
                        return self.error_token(
                            "unterminated string escape",
                            start,
                            &raw,
                        );
                    };
                    raw.push(esc);
                    value.push(match esc {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        b'0' => 0,
                        b'\\' => b'\\',
                        b'"' => b'"',
                        other => {
                            return self.error_token(
                                &format!(
                                    "unknown escape sequence \\{}",
                                    other as char
                                ),
                                start,
                                &raw,
                            );
                        }
                    });
                }
                Some(b) => {
                    raw.push(b);
                    value.push(b);
                }
                None => {
                    return self.error_token("unterminated string", start, &raw);
                }
            }
        }
        let span = Span::new(start, self.pos());
        match String::from_utf8(value) {
            Ok(value) => Token::new(
                TokenKind::String(value),
                span,
                String::from_utf8_lossy(&raw),
            ),
            Err(_) => self.error_token("string is not valid UTF-8", start, &raw),
        }
    }

    fn error_token(&self, message: &str, start: Pos, raw: &[u8]) -> Token {
        Token::new(
            TokenKind::Error(message.to_string()),
            Span::new(start, self.pos()),
            String::from_utf8_lossy(raw),
        )
    }

    // ───────────────────────────────────────────────────────────
    //  Numbers
    // ───────────────────────────────────────────────────────────

    /// Consume a run of digits valid in `radix`, skipping `_` separators.
    fn digit_run(&mut self, radix: u32, raw: &mut String) -> String {
        let mut digits = String::new();
        while let Some(b) = self.peek() {
            if b == b'_' {
                raw.push('_');
            } else if (b as char).is_digit(radix) {
                raw.push(b as char);
                digits.push(b as char);
            } else {
                break;
            }
            self.advance();
        }
        digits
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();

        if self.peek() == Some(b'0') {
            let radix = match self.peek_ahead(1) {
                Some(b'x' | b'X') => Some(16),
                Some(b'o' | b'O') => Some(8),
                Some(b'b' | b'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                for _ in 0..2 {
                    if let Some(b) = self.advance() {
                        raw.push(b as char);
                    }
                }
                let digits = self.digit_run(radix, &mut raw);
                let span = Span::new(start, self.pos());
                if digits.is_empty() {
                    return Token::new(
                        TokenKind::Error("missing digits after radix prefix".into()),
                        span,
                        raw,
                    );
                }
                return match i64::from_str_radix(&digits, radix) {
                    Ok(v) => Token::new(TokenKind::Integer(v), span, raw),
                    Err(_) => Token::new(
                        TokenKind::Error("integer literal out of range".into()),
                        span,
                        raw,
                    ),
                };
            }
        }

        let mut text = self.digit_run(10, &mut raw);
        let mut is_float = false;

        if self.peek() == Some(b'.')
            && self.peek_ahead(1).is_some_and(|b| b.is_ascii_digit())
        {
            is_float = true;
            self.advance();
            raw.push('.');
            text.push('.');
            text.push_str(&self.digit_run(10, &mut raw));
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            let signed = matches!(self.peek_ahead(1), Some(b'+' | b'-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_ahead(digit_at).is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                for _ in 0..digit_at {
                    if let Some(b) = self.advance() {
                        raw.push(b as char);
                        text.push(b as char);
                    }
                }
                text.push_str(&self.digit_run(10, &mut raw));
            }
        }

        let span = Span::new(start, self.pos());
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => Token::new(TokenKind::Float(v), span, raw),
                Err(_) => Token::new(
                    TokenKind::Error("malformed float literal".into()),
                    span,
                    raw,
                ),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => Token::new(TokenKind::Integer(v), span, raw),
                Err(_) => Token::new(
                    TokenKind::Error("integer literal out of range".into()),
                    span,
                    raw,
                ),
            }
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Identifiers and reserved words
    // ───────────────────────────────────────────────────────────

    fn is_ident_char(ch: char) -> bool {
        ch == '_' || ch.is_alphanumeric()
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.pos();
        let mut ident = String::new();
        while let Some((ch, _)) = self.rb.peek_char() {
            if !Self::is_ident_char(ch) {
                break;
            }
            ident.push(ch);
            self.rb.advance_char();
        }
        let span = Span::new(start, self.pos());
        let kind = TokenKind::reserved(&ident)
            .unwrap_or_else(|| TokenKind::Identifier(ident.clone()));
        Token::new(kind, span, ident)
    }

    // ───────────────────────────────────────────────────────────
    //  Operators and delimiters
    // ───────────────────────────────────────────────────────────

    /// Longest match over the fixed operator set.
    fn lex_operator(&mut self, first: u8) -> Option<Token> {
        let start = self.pos();
        let second = self.peek_ahead(1);
        let (kind, len) = match (first, second) {
            (b'&', Some(b'&')) => (TokenKind::AmpAmp, 2),
            (b'|', Some(b'|')) => (TokenKind::PipePipe, 2),
            (b'<', Some(b'<')) => (TokenKind::Shl, 2),
            (b'>', Some(b'>')) => (TokenKind::Shr, 2),
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::NotEq, 2),
            (b'<', Some(b'=')) => (TokenKind::LtEq, 2),
            (b'>', Some(b'=')) => (TokenKind::GtEq, 2),
            (b'+', Some(b'+')) => (TokenKind::PlusPlus, 2),
            (b'-', Some(b'-')) => (TokenKind::MinusMinus, 2),
            (b'+', Some(b'=')) => (TokenKind::PlusAssign, 2),
            (b'-', Some(b'=')) => (TokenKind::MinusAssign, 2),
            (b'*', Some(b'=')) => (TokenKind::StarAssign, 2),
            (b'/', Some(b'=')) => (TokenKind::SlashAssign, 2),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b';', _) => (TokenKind::Semicolon, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'~', _) => (TokenKind::Tilde, 1),
            (b'&', _) => (TokenKind::Amp, 1),
            (b'|', _) => (TokenKind::Pipe, 1),
            (b'^', _) => (TokenKind::Caret, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'=', _) => (TokenKind::Assign, 1),
            _ => return None,
        };
        let mut lexeme = String::with_capacity(len);
        for _ in 0..len {
            if let Some(b) = self.advance() {
                lexeme.push(b as char);
            }
        }
        Some(Token::new(kind, Span::new(start, self.pos()), lexeme))
    }

    // ───────────────────────────────────────────────────────────
    //  Main dispatch
    // ───────────────────────────────────────────────────────────

    fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.pos();

        let Some(b) = self.peek() else {
            return Token::new(TokenKind::Eof, Span::point(start), "");
        };

        match b {
            b'/' if self.peek_ahead(1) == Some(b'/') => self.lex_line_comment(),
            b'/' if self.peek_ahead(1) == Some(b'*') => {
                self.lex_block_comment()
            }
            b'"' => self.lex_string(),
            b'0'..=b'9' => self.lex_number(),
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.lex_identifier(),
            _ => {
                if let Some(tok) = self.lex_operator(b) {
                    return tok;
                }
                if let Some((ch, _)) = self.rb.peek_char()
                    && ch.is_alphabetic()
                {
                    return self.lex_identifier();
                }
                match self.rb.advance_char() {
                    Some((ch, _)) => Token::new(
                        TokenKind::Error(format!(
                            "unexpected character: {ch:?}"
                        )),
                        Span::new(start, self.pos()),
                        ch.to_string(),
                    ),
                    None => Token::new(
                        TokenKind::Error("unexpected byte".into()),
                        Span::new(start, self.pos()),
                        "?",
                    ),
                }
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
        let tok = self.next_token();
        if tok.is_eof() {
            self.emitted_eof = true;
        }
        Some(tok)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::from_str(src).collect()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokens(src).into_iter().map(|t| t.kind).collect()
    }

    // ── Literals ──────────────────────────────────────────────

    #[test]
    fn lex_integer() {
        assert_eq!(kinds("42"), vec![TokenKind::Integer(42), TokenKind::Eof]);
    }

    #[test]
    fn lex_minus_is_separate_token() {
        assert_eq!(kinds("-7"), vec![
            TokenKind::Minus,
            TokenKind::Integer(7),
            TokenKind::Eof
        ]);
    }

    #[test]
    fn lex_prefixed_integers() {
        assert_eq!(kinds("0xff")[0], TokenKind::Integer(255));
        assert_eq!(kinds("0o17")[0], TokenKind::Integer(15));
        assert_eq!(kinds("0b1010")[0], TokenKind::Integer(10));
        assert_eq!(kinds("1_000_000")[0], TokenKind::Integer(1_000_000));
    }

    #[test]
    fn lex_missing_radix_digits() {
        assert!(matches!(kinds("0x")[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_integer_overflow() {
        assert!(matches!(
            kinds("99999999999999999999")[0],
            TokenKind::Error(_)
        ));
    }

    #[test]
    fn lex_float() {
        assert_eq!(kinds("3.25")[0], TokenKind::Float(3.25));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
        assert_eq!(kinds("2.5e-1")[0], TokenKind::Float(0.25));
    }

    #[test]
    fn lex_dot_after_integer_is_attribute() {
        assert_eq!(kinds("1.x"), vec![
            TokenKind::Integer(1),
            TokenKind::Dot,
            TokenKind::Identifier("x".into()),
            TokenKind::Eof
        ]);
    }

    #[test]
    fn lex_string() {
        assert_eq!(kinds(r#""hello""#)[0], TokenKind::String("hello".into()));
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb\t\"c\\""#)[0],
            TokenKind::String("a\nb\t\"c\\".into())
        );
    }

    #[test]
    fn lex_string_unicode() {
        assert_eq!(kinds("\"héllo\"")[0], TokenKind::String("héllo".into()));
    }

    #[test]
    fn lex_unterminated_string() {
        assert!(matches!(kinds("\"abc")[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_unknown_escape() {
        assert!(matches!(kinds(r#""\q""#)[0], TokenKind::Error(_)));
    }

    // ── Identifiers ───────────────────────────────────────────

    #[test]
    fn lex_identifiers_and_reserved_words() {
        assert_eq!(kinds("while whilst _x import as"), vec![
            TokenKind::While,
            TokenKind::Identifier("whilst".into()),
            TokenKind::Identifier("_x".into()),
            TokenKind::Import,
            TokenKind::As,
            TokenKind::Eof
        ]);
    }

    #[test]
    fn lex_unicode_identifier() {
        assert_eq!(kinds("größe")[0], TokenKind::Identifier("größe".into()));
    }

    #[test]
    fn lex_emoji_is_error() {
        assert!(matches!(kinds("🙂")[0], TokenKind::Error(_)));
    }

    // ── Operators ─────────────────────────────────────────────

    #[test]
    fn lex_operators_longest_match() {
        assert_eq!(kinds("a+++b"), vec![
            TokenKind::Identifier("a".into()),
            TokenKind::PlusPlus,
            TokenKind::Plus,
            TokenKind::Identifier("b".into()),
            TokenKind::Eof
        ]);
        assert_eq!(kinds("<<= >> != == && || ~ ^"), vec![
            TokenKind::Shl,
            TokenKind::Assign,
            TokenKind::Shr,
            TokenKind::NotEq,
            TokenKind::EqEq,
            TokenKind::AmpAmp,
            TokenKind::PipePipe,
            TokenKind::Tilde,
            TokenKind::Caret,
            TokenKind::Eof
        ]);
    }

    #[test]
    fn lex_compound_assignment() {
        assert_eq!(kinds("+= -= *= /="), vec![
            TokenKind::PlusAssign,
            TokenKind::MinusAssign,
            TokenKind::StarAssign,
            TokenKind::SlashAssign,
            TokenKind::Eof
        ]);
    }

    // ── Comments ──────────────────────────────────────────────

    #[test]
    fn lex_line_comment() {
        assert_eq!(kinds("x // note\ny"), vec![
            TokenKind::Identifier("x".into()),
            TokenKind::LineComment(" note".into()),
            TokenKind::Identifier("y".into()),
            TokenKind::Eof
        ]);
    }

    #[test]
    fn lex_nested_block_comment() {
        assert_eq!(kinds("/* a /* b */ c */ 1"), vec![
            TokenKind::BlockComment(" a /* b */ c ".into()),
            TokenKind::Integer(1),
            TokenKind::Eof
        ]);
    }

    #[test]
    fn lex_unterminated_block_comment() {
        assert!(matches!(kinds("/* open")[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_slash_as_operator() {
        assert_eq!(kinds("a / b")[1], TokenKind::Slash);
    }

    // ── Spans ─────────────────────────────────────────────────

    #[test]
    fn span_tracking() {
        let toks = tokens("foo = 12;");
        assert_eq!(toks[0].span.start, Pos::new(0, 1, 1));
        assert_eq!(toks[0].span.end, Pos::new(3, 1, 4));
        assert_eq!(toks[2].span.start, Pos::new(6, 1, 7));
        assert_eq!(toks[2].lexeme, "12");
    }

    #[test]
    fn span_multiline() {
        let toks = tokens("a\n  b");
        assert_eq!(toks[1].span.start, Pos::new(4, 2, 3));
    }

    #[test]
    fn lex_from_cursor() {
        let lexer = Lexer::new(Cursor::new(b"print(1);".to_vec()));
        let kinds: Vec<_> = lexer.map(|t| t.kind).collect();
        assert_eq!(kinds.len(), 6);
        assert_eq!(kinds[0], TokenKind::Identifier("print".into()));
    }
}
