//! Single-pass tolerant scanner for Lua 5.3 source.
//!
//! Newlines are emitted as tokens (the parser uses them only to bound
//! `return` expression lists). Unknown bytes never abort the scan: they
//! become `TokenKind::Unknown` tokens one byte wide, and the caller decides
//! whether the unknown ratio disqualifies the input as Lua at all.

use crate::ast::LuaValue;
use crate::token::{Span, Token, TokenKind};

/// Fraction of `Unknown` tokens above which the input is not a Lua file.
pub const UNKNOWN_RATIO_LIMIT: f64 = 0.05;

pub struct Lexer<'src> {
    src: &'src [u8],
    cursor: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src [u8]) -> Self {
        Self {
            src,
            cursor: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scan the whole input. The returned stream always ends with `Eof`.
    pub fn scan_all(src: &'src [u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    /// Fraction of `Unknown` tokens in a scanned stream (Eof excluded).
    pub fn unknown_ratio(tokens: &[Token]) -> f64 {
        let total = tokens.iter().filter(|t| t.kind != TokenKind::Eof).count();
        if total == 0 {
            return 0.0;
        }
        let unknown = tokens.iter().filter(|t| t.kind == TokenKind::Unknown).count();
        unknown as f64 / total as f64
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.cursor).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.src.get(self.cursor + n).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.cursor += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column, self.cursor)
    }

    fn lexeme_from(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.src[start..self.cursor]).into_owned()
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Token {
        // Skip horizontal whitespace; newlines are tokens of their own.
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' => {
                    self.advance();
                }
                b'-' if self.peek_at(1) == Some(b'-') => {
                    self.skip_comment();
                }
                _ => break,
            }
        }

        let span = self.span();
        let start = self.cursor;

        let byte = match self.peek() {
            Some(b) => b,
            None => return Token::new(TokenKind::Eof, "", span),
        };

        match byte {
            b'\n' => {
                self.advance();
                Token::new(TokenKind::Newline, "\n", span)
            }
            b'"' | b'\'' => self.scan_short_string(span),
            b'[' if matches!(self.peek_at(1), Some(b'[') | Some(b'=')) && self.long_bracket_level().is_some() => {
                self.scan_long_string(span)
            }
            b'0'..=b'9' => self.scan_number(span),
            b'.' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => self.scan_number(span),
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.scan_name(span),
            _ => {
                if let Some(kind) = self.scan_operator() {
                    Token::new(kind, self.lexeme_from(start), span)
                } else {
                    // Unknown byte: emit and advance exactly one byte.
                    self.advance();
                    Token::new(TokenKind::Unknown, self.lexeme_from(start), span)
                }
            }
        }
    }

    fn skip_comment(&mut self) {
        // Consume the two dashes.
        self.advance();
        self.advance();
        if self.peek() == Some(b'[') {
            if let Some(level) = self.long_bracket_level() {
                self.consume_long_bracket_body(level);
                return;
            }
        }
        // Line comment: up to (not including) the newline.
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.advance();
        }
    }

    /// If the cursor sits on a long-bracket opener `[=*[`, return its level.
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek() != Some(b'[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == Some(b'=') {
            level += 1;
        }
        if self.peek_at(1 + level) == Some(b'[') {
            Some(level)
        } else {
            None
        }
    }

    /// Consume `[=*[ ... ]=*]` including both brackets. Tolerant of EOF.
    fn consume_long_bracket_body(&mut self, level: usize) {
        // Opening bracket.
        for _ in 0..level + 2 {
            self.advance();
        }
        loop {
            match self.peek() {
                None => return,
                Some(b']') => {
                    let mut eqs = 0;
                    while self.peek_at(1 + eqs) == Some(b'=') {
                        eqs += 1;
                    }
                    if eqs == level && self.peek_at(1 + eqs) == Some(b']') {
                        for _ in 0..level + 2 {
                            self.advance();
                        }
                        return;
                    }
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn scan_long_string(&mut self, span: Span) -> Token {
        let start = self.cursor;
        let level = self.long_bracket_level().unwrap_or(0);
        self.consume_long_bracket_body(level);
        let lexeme = self.lexeme_from(start);
        let kind = classify_string(&lexeme);
        Token::new(kind, lexeme, span)
    }

    fn scan_short_string(&mut self, span: Span) -> Token {
        let start = self.cursor;
        let quote = self.advance().unwrap_or(b'"');
        loop {
            match self.peek() {
                // Tolerant: unterminated strings end at newline or EOF.
                None | Some(b'\n') => break,
                Some(b'\\') => {
                    self.advance();
                    // \z may skip newlines; everything else is one escape char
                    // (hex/decimal digits fall through the normal loop).
                    if self.peek() == Some(b'z') {
                        self.advance();
                        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n')) {
                            self.advance();
                        }
                    } else {
                        self.advance();
                    }
                }
                Some(b) if b == quote => {
                    self.advance();
                    break;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
        let lexeme = self.lexeme_from(start);
        let kind = classify_string(&lexeme);
        Token::new(kind, lexeme, span)
    }

    fn scan_number(&mut self, span: Span) -> Token {
        let start = self.cursor;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit() || b == b'.') {
                self.advance();
            }
            // Binary exponent of hex floats.
            if matches!(self.peek(), Some(b'p') | Some(b'P')) {
                self.advance();
                if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                    self.advance();
                }
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.advance();
                }
            }
        } else {
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
            if self.peek() == Some(b'.') {
                self.advance();
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.advance();
                }
            }
            if matches!(self.peek(), Some(b'e') | Some(b'E')) {
                self.advance();
                if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                    self.advance();
                }
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.advance();
                }
            }
        }
        Token::new(TokenKind::Number, self.lexeme_from(start), span)
    }

    fn scan_name(&mut self, span: Span) -> Token {
        let start = self.cursor;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.advance();
        }
        let lexeme = self.lexeme_from(start);
        let kind = TokenKind::keyword(&lexeme).unwrap_or_else(|| classify_name(&lexeme));
        Token::new(kind, lexeme, span)
    }

    fn scan_operator(&mut self) -> Option<TokenKind> {
        let a = self.peek()?;
        let b = self.peek_at(1);
        let (kind, len) = match (a, b) {
            (b'=', Some(b'=')) => (TokenKind::Eq, 2),
            (b'~', Some(b'=')) => (TokenKind::NotEq, 2),
            (b'<', Some(b'=')) => (TokenKind::LessEq, 2),
            (b'>', Some(b'=')) => (TokenKind::GreaterEq, 2),
            (b'<', Some(b'<')) => (TokenKind::ShiftLeft, 2),
            (b'>', Some(b'>')) => (TokenKind::ShiftRight, 2),
            (b'/', Some(b'/')) => (TokenKind::DoubleSlash, 2),
            (b':', Some(b':')) => (TokenKind::DoubleColon, 2),
            (b'.', Some(b'.')) => {
                if self.peek_at(2) == Some(b'.') {
                    (TokenKind::Ellipsis, 3)
                } else {
                    (TokenKind::Concat, 2)
                }
            }
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'^', _) => (TokenKind::Caret, 1),
            (b'#', _) => (TokenKind::Hash, 1),
            (b'&', _) => (TokenKind::Ampersand, 1),
            (b'~', _) => (TokenKind::Tilde, 1),
            (b'|', _) => (TokenKind::Pipe, 1),
            (b'<', _) => (TokenKind::Less, 1),
            (b'>', _) => (TokenKind::Greater, 1),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b';', _) => (TokenKind::Semicolon, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            _ => return None,
        };
        for _ in 0..len {
            self.advance();
        }
        Some(kind)
    }
}

/// Classify a string lexeme as plain or encrypted.
///
/// Encrypted: at least one `\xHH` or `\ddd` escape in the raw lexeme, or an
/// unbroken run of 5+ non-printable bytes in the decoded body.
fn classify_string(lexeme: &str) -> TokenKind {
    let bytes = lexeme.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\\' {
            let next = bytes[i + 1];
            if next == b'x' || next.is_ascii_digit() {
                return TokenKind::EncryptedString;
            }
            i += 2;
            continue;
        }
        i += 1;
    }

    let body = decode_string_lexeme(lexeme);
    let mut run = 0usize;
    for &b in &body {
        if !(0x20..=0x7E).contains(&b) && b != b'\t' && b != b'\n' && b != b'\r' {
            run += 1;
            if run >= 5 {
                return TokenKind::EncryptedString;
            }
        } else {
            run = 0;
        }
    }
    TokenKind::Str
}

/// Classify an identifier lexeme as plain or obfuscated.
///
/// Obfuscated: length 21+; length 5+ made entirely of the visually-confusable
/// set {l, I, 1, o, O, 0}; or length 12+ shaped `[A-Za-z]_[A-Za-z0-9_]+`.
fn classify_name(lexeme: &str) -> TokenKind {
    let len = lexeme.len();
    if len >= 21 {
        return TokenKind::ObfuscatedName;
    }
    if len >= 5 && lexeme.bytes().all(|b| matches!(b, b'l' | b'I' | b'1' | b'o' | b'O' | b'0')) {
        return TokenKind::ObfuscatedName;
    }
    if len >= 12 {
        let bytes = lexeme.as_bytes();
        if bytes[0].is_ascii_alphabetic() && bytes[1] == b'_' {
            return TokenKind::ObfuscatedName;
        }
    }
    TokenKind::Name
}

/// Decode a string lexeme (short or long form) to its byte content.
pub fn decode_string_lexeme(lexeme: &str) -> Vec<u8> {
    let bytes = lexeme.as_bytes();
    if bytes.first() == Some(&b'[') {
        return long_string_body(lexeme).as_bytes().to_vec();
    }
    decode_short_string(lexeme)
}

/// Body of a long-bracket string `[=*[ ... ]=*]`, with the leading newline
/// stripped per Lua semantics.
pub fn long_string_body(lexeme: &str) -> &str {
    let bytes = lexeme.as_bytes();
    let mut level = 0;
    while bytes.get(1 + level) == Some(&b'=') {
        level += 1;
    }
    let open = level + 2;
    let close = lexeme.len().saturating_sub(level + 2).max(open);
    let mut body = &lexeme[open.min(lexeme.len())..close];
    if let Some(stripped) = body.strip_prefix('\n') {
        body = stripped;
    }
    body
}

/// Decode a short string lexeme (including its quotes) to bytes, processing
/// backslash escapes. Invalid escapes pass the escaped byte through.
pub fn decode_short_string(lexeme: &str) -> Vec<u8> {
    let bytes = lexeme.as_bytes();
    if bytes.len() < 2 {
        return Vec::new();
    }
    let quote = bytes[0];
    let inner_end = if bytes[bytes.len() - 1] == quote && bytes.len() >= 2 {
        bytes.len() - 1
    } else {
        bytes.len()
    };
    let inner = &bytes[1..inner_end];

    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let b = inner[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&esc) = inner.get(i) else { break };
        match esc {
            b'n' => {
                out.push(b'\n');
                i += 1;
            }
            b't' => {
                out.push(b'\t');
                i += 1;
            }
            b'r' => {
                out.push(b'\r');
                i += 1;
            }
            b'a' => {
                out.push(0x07);
                i += 1;
            }
            b'b' => {
                out.push(0x08);
                i += 1;
            }
            b'f' => {
                out.push(0x0C);
                i += 1;
            }
            b'v' => {
                out.push(0x0B);
                i += 1;
            }
            b'\\' | b'"' | b'\'' | b'\n' => {
                out.push(esc);
                i += 1;
            }
            b'x' => {
                i += 1;
                let mut value = 0u8;
                let mut digits = 0;
                while digits < 2 {
                    match inner.get(i) {
                        Some(&h) if h.is_ascii_hexdigit() => {
                            value = value.wrapping_mul(16).wrapping_add(hex_value(h));
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                out.push(value);
            }
            b'0'..=b'9' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 {
                    match inner.get(i) {
                        Some(&d) if d.is_ascii_digit() => {
                            value = value * 10 + (d - b'0') as u32;
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            b'z' => {
                i += 1;
                while matches!(inner.get(i), Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n')) {
                    i += 1;
                }
            }
            b'u' => {
                // \u{XXX}: encode as UTF-8.
                i += 1;
                if inner.get(i) == Some(&b'{') {
                    i += 1;
                    let mut cp: u32 = 0;
                    while let Some(&h) = inner.get(i) {
                        if h == b'}' {
                            i += 1;
                            break;
                        }
                        if !h.is_ascii_hexdigit() {
                            break;
                        }
                        cp = cp.wrapping_mul(16).wrapping_add(hex_value(h) as u32);
                        i += 1;
                    }
                    if let Some(c) = char::from_u32(cp) {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Parse a number lexeme into a Lua 5.3 value (integer when exact).
pub fn parse_number(lexeme: &str) -> Option<LuaValue> {
    let s = lexeme.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.contains('.') || hex.contains('p') || hex.contains('P') {
            // Hex floats are rare in obfuscated dumps; go through f64.
            return parse_hex_float(hex).map(LuaValue::Float);
        }
        // Lua wraps hex integers that overflow lua_Integer.
        let mut value: i64 = 0;
        for b in hex.bytes() {
            if !b.is_ascii_hexdigit() {
                return None;
            }
            value = value.wrapping_mul(16).wrapping_add(hex_value(b) as i64);
        }
        return Some(LuaValue::Int(value));
    }
    if !s.contains('.') && !s.contains('e') && !s.contains('E') {
        if let Ok(i) = s.parse::<i64>() {
            return Some(LuaValue::Int(i));
        }
    }
    s.parse::<f64>().ok().map(LuaValue::Float)
}

fn parse_hex_float(hex: &str) -> Option<f64> {
    let (mantissa_str, exp) = match hex.find(['p', 'P']) {
        Some(pos) => (&hex[..pos], hex[pos + 1..].parse::<i32>().ok()?),
        None => (hex, 0),
    };
    let mut value = 0.0f64;
    let mut frac_scale = None::<f64>;
    for b in mantissa_str.bytes() {
        match b {
            b'.' => frac_scale = Some(1.0 / 16.0),
            _ if b.is_ascii_hexdigit() => match frac_scale {
                None => value = value * 16.0 + hex_value(b) as f64,
                Some(scale) => {
                    value += hex_value(b) as f64 * scale;
                    frac_scale = Some(scale / 16.0);
                }
            },
            _ => return None,
        }
    }
    Some(value * 2.0f64.powi(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::scan_all(src.as_bytes())
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_statement() {
        assert_eq!(
            kinds("local x = 1"),
            vec![
                TokenKind::Local,
                TokenKind::Name,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_newlines_are_tokens() {
        assert_eq!(
            kinds("return\nx"),
            vec![TokenKind::Return, TokenKind::Newline, TokenKind::Name, TokenKind::Eof]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("== ~= <= >= .. ... :: // << >>"),
            vec![
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::LessEq,
                TokenKind::GreaterEq,
                TokenKind::Concat,
                TokenKind::Ellipsis,
                TokenKind::DoubleColon,
                TokenKind::DoubleSlash,
                TokenKind::ShiftLeft,
                TokenKind::ShiftRight,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("x -- trailing\ny --[[ block\nstill block ]] z"),
            vec![
                TokenKind::Name,
                TokenKind::Newline,
                TokenKind::Name,
                TokenKind::Name,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_long_string() {
        let tokens = Lexer::scan_all(b"[==[hello ]] world]==]");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(long_string_body(&tokens[0].lexeme), "hello ]] world");
    }

    #[test]
    fn test_encrypted_string_by_escapes() {
        let tokens = Lexer::scan_all(br#"x = "\x41\x42\x43""#);
        assert_eq!(tokens[2].kind, TokenKind::EncryptedString);
        let tokens = Lexer::scan_all(br#"x = "\65\66""#);
        assert_eq!(tokens[2].kind, TokenKind::EncryptedString);
        let tokens = Lexer::scan_all(br#"x = "plain\ntext""#);
        assert_eq!(tokens[2].kind, TokenKind::Str);
    }

    #[test]
    fn test_obfuscated_names() {
        // Length >= 21
        assert_eq!(kinds("abcdefghijklmnopqrstu")[0], TokenKind::ObfuscatedName);
        // Confusable alphabet, length >= 5
        assert_eq!(kinds("IlIl0O1o")[0], TokenKind::ObfuscatedName);
        // Shape X_rest, length >= 12
        assert_eq!(kinds("a_bcdefghijk")[0], TokenKind::ObfuscatedName);
        // Plain identifiers survive
        assert_eq!(kinds("handler_1")[0], TokenKind::Name);
        assert_eq!(kinds("lio")[0], TokenKind::Name);
    }

    #[test]
    fn test_unknown_bytes_advance() {
        let tokens = Lexer::scan_all(b"x \x01\x02 y");
        let unknown: Vec<_> = tokens.iter().filter(|t| t.kind == TokenKind::Unknown).collect();
        assert_eq!(unknown.len(), 2);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_spans_reconstruct_source() {
        // Token lexemes plus the gaps between spans reproduce the input.
        let src = "local x = 1 -- c\nreturn x + 2\n";
        let tokens = Lexer::scan_all(src.as_bytes());
        let mut rebuilt = String::new();
        let mut pos = 0;
        for token in &tokens {
            rebuilt.push_str(&src[pos..token.span.offset]);
            rebuilt.push_str(&token.lexeme);
            pos = token.span.offset + token.lexeme.len();
        }
        rebuilt.push_str(&src[pos..]);
        assert_eq!(rebuilt, src);
    }

    #[test]
    fn test_number_values() {
        assert_eq!(parse_number("42"), Some(LuaValue::Int(42)));
        assert_eq!(parse_number("0x10"), Some(LuaValue::Int(16)));
        assert_eq!(parse_number("1.5"), Some(LuaValue::Float(1.5)));
        assert_eq!(parse_number("1e2"), Some(LuaValue::Float(100.0)));
        assert_eq!(parse_number("0x1p4"), Some(LuaValue::Float(16.0)));
    }

    #[test]
    fn test_string_decode() {
        assert_eq!(decode_short_string(r#""a\x41b""#), b"aAb".to_vec());
        assert_eq!(decode_short_string(r#""a\65b""#), b"aAb".to_vec());
        assert_eq!(decode_short_string(r#""a\nb""#), b"a\nb".to_vec());
        assert_eq!(decode_short_string(r#"'it\'s'"#), b"it's".to_vec());
    }
}
