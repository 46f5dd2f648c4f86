//! Lexer for the C subset
//!
//! Turns preprocessed source text into a token stream ending in `Eof`.
//! Whitespace and comments never produce tokens. Lines starting with `#`
//! (preprocessor remnants such as `#line` markers) are consumed and
//! discarded. Multi-character operators are matched longest-first.

use crate::diag::Diagnostic;

/// Keywords of C89. The full 32-name table is recognized so that
/// unsupported keywords (`float`, `double`, `volatile`) surface as clear
/// parse errors instead of lexing as identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Auto,
    Break,
    Case,
    Char,
    Const,
    Continue,
    Default,
    Do,
    Double,
    Else,
    Enum,
    Extern,
    Float,
    For,
    Goto,
    If,
    Int,
    Long,
    Register,
    Return,
    Short,
    Signed,
    Sizeof,
    Static,
    Struct,
    Switch,
    Typedef,
    Union,
    Unsigned,
    Void,
    Volatile,
    While,
}

/// Keyword table: identifier text that reclassifies to a keyword
const KEYWORDS: &[(&str, Keyword)] = &[
    ("auto", Keyword::Auto),
    ("break", Keyword::Break),
    ("case", Keyword::Case),
    ("char", Keyword::Char),
    ("const", Keyword::Const),
    ("continue", Keyword::Continue),
    ("default", Keyword::Default),
    ("do", Keyword::Do),
    ("double", Keyword::Double),
    ("else", Keyword::Else),
    ("enum", Keyword::Enum),
    ("extern", Keyword::Extern),
    ("float", Keyword::Float),
    ("for", Keyword::For),
    ("goto", Keyword::Goto),
    ("if", Keyword::If),
    ("int", Keyword::Int),
    ("long", Keyword::Long),
    ("register", Keyword::Register),
    ("return", Keyword::Return),
    ("short", Keyword::Short),
    ("signed", Keyword::Signed),
    ("sizeof", Keyword::Sizeof),
    ("static", Keyword::Static),
    ("struct", Keyword::Struct),
    ("switch", Keyword::Switch),
    ("typedef", Keyword::Typedef),
    ("union", Keyword::Union),
    ("unsigned", Keyword::Unsigned),
    ("void", Keyword::Void),
    ("volatile", Keyword::Volatile),
    ("while", Keyword::While),
];

/// Punctuators and operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semi,
    Comma,
    Dot,
    Arrow,
    Ellipsis,
    Question,
    Colon,
    PlusPlus,
    MinusMinus,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    BangEq,
    AmpAmp,
    PipePipe,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
}

/// What a token is, with literal values already decoded
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident,
    Keyword(Keyword),
    /// Integer literal; `unsigned`/`long` reflect the (case-insensitive)
    /// `u`/`l` suffixes and determine the literal's type
    IntLit {
        value: i64,
        unsigned: bool,
        long: bool,
    },
    /// Character literal, value is the code of the single resulting byte
    CharLit(i64),
    /// String literal payload, escapes decoded, no NUL terminator
    StrLit(Vec<u8>),
    Punct(Punct),
    Eof,
}

/// A token with its verbatim lexeme and source position (1-indexed)
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

struct Lexer<'a> {
    src: &'a [u8],
    file: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

/// Tokenize a preprocessed translation unit.
///
/// Fails on the first malformed token: unterminated string/char literal,
/// unterminated block comment, or a stray character.
pub fn tokenize(source: &str, file: &str) -> Result<Vec<Token>, Diagnostic> {
    let mut lexer = Lexer {
        src: source.as_bytes(),
        file,
        pos: 0,
        line: 1,
        column: 1,
    };
    lexer.run()
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    line,
                    column,
                });
                return Ok(tokens);
            };
            let start = self.pos;
            let kind = if c == b'_' || c.is_ascii_alphabetic() {
                self.lex_ident()
            } else if c.is_ascii_digit() {
                self.lex_number(line, column)?
            } else if c == b'\'' {
                self.lex_char(line, column)?
            } else if c == b'"' {
                self.lex_string(line, column)?
            } else if let Some(p) = self.lex_punct() {
                TokenKind::Punct(p)
            } else {
                return Err(Diagnostic::error(
                    self.file,
                    line,
                    column,
                    format!("stray character '{}' in input", c as char),
                ));
            };
            let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            tokens.push(Token {
                kind,
                text,
                line,
                column,
            });
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skip whitespace, comments and `#`-directive lines
    fn skip_trivia(&mut self) -> Result<(), Diagnostic> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'#') if self.column == 1 || self.at_line_start() => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => {
                                return Err(Diagnostic::error(
                                    self.file,
                                    line,
                                    column,
                                    "unterminated block comment",
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// True when only whitespace precedes the cursor on the current line
    fn at_line_start(&self) -> bool {
        let mut i = self.pos;
        while i > 0 {
            let c = self.src[i - 1];
            if c == b'\n' {
                return true;
            }
            if !c.is_ascii_whitespace() {
                return false;
            }
            i -= 1;
        }
        true
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'_' || c.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        for (name, kw) in KEYWORDS {
            if name.as_bytes() == text {
                return TokenKind::Keyword(*kw);
            }
        }
        TokenKind::Ident
    }

    fn lex_number(&mut self, line: usize, column: usize) -> Result<TokenKind, Diagnostic> {
        let start = self.pos;
        let (radix, digits_start) = if self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(b'x') | Some(b'X'))
        {
            self.bump();
            self.bump();
            (16, self.pos)
        } else if self.peek() == Some(b'0') {
            (8, self.pos)
        } else {
            (10, self.pos)
        };
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() && (radix == 16 || c.is_ascii_digit()) {
                self.bump();
            } else {
                break;
            }
        }
        let digits = &self.src[digits_start..self.pos];
        if radix == 16 && digits.is_empty() {
            return Err(Diagnostic::error(
                self.file,
                line,
                column,
                "hexadecimal literal has no digits",
            ));
        }
        let digits = std::str::from_utf8(digits).expect("ascii digits");
        // "0" alone parses as octal zero
        let value = if digits.is_empty() {
            0
        } else {
            u64::from_str_radix(digits, radix).map_err(|_| {
                Diagnostic::error(
                    self.file,
                    line,
                    column,
                    format!(
                        "integer literal '{}' out of range",
                        String::from_utf8_lossy(&self.src[start..self.pos])
                    ),
                )
            })?
        };
        let mut unsigned = false;
        let mut long = false;
        while let Some(c) = self.peek() {
            match c {
                b'u' | b'U' if !unsigned => {
                    unsigned = true;
                    self.bump();
                }
                b'l' | b'L' if !long => {
                    long = true;
                    self.bump();
                }
                _ => break,
            }
        }
        if let Some(c) = self.peek()
            && (c.is_ascii_alphanumeric() || c == b'_')
        {
            return Err(Diagnostic::error(
                self.file,
                line,
                column,
                format!("invalid suffix on integer literal ('{}')", c as char),
            ));
        }
        Ok(TokenKind::IntLit {
            value: value as i64,
            unsigned,
            long,
        })
    }

    /// Decode one (possibly escaped) byte of a char/string literal
    fn lex_escaped_byte(&mut self, line: usize, column: usize) -> Result<u8, Diagnostic> {
        let c = self.bump().ok_or_else(|| {
            Diagnostic::error(self.file, line, column, "unterminated literal")
        })?;
        if c != b'\\' {
            return Ok(c);
        }
        let e = self.bump().ok_or_else(|| {
            Diagnostic::error(self.file, line, column, "unterminated escape sequence")
        })?;
        match e {
            b'n' => Ok(b'\n'),
            b't' => Ok(b'\t'),
            b'r' => Ok(b'\r'),
            b'\\' => Ok(b'\\'),
            b'\'' => Ok(b'\''),
            b'"' => Ok(b'"'),
            b'0'..=b'7' => {
                // up to three octal digits, first already consumed
                let mut v = (e - b'0') as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            self.bump();
                            v = v * 8 + (d - b'0') as u32;
                        }
                        _ => break,
                    }
                }
                Ok(v as u8)
            }
            b'x' => {
                let mut v: u32 = 0;
                let mut any = false;
                while let Some(d) = self.peek() {
                    if d.is_ascii_hexdigit() {
                        self.bump();
                        v = v * 16 + (d as char).to_digit(16).expect("hex digit");
                        any = true;
                        if v > 0xFF {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                if !any || v > 0xFF {
                    return Err(Diagnostic::error(
                        self.file,
                        line,
                        column,
                        "invalid hex escape sequence",
                    ));
                }
                Ok(v as u8)
            }
            other => Err(Diagnostic::error(
                self.file,
                line,
                column,
                format!("unknown escape sequence '\\{}'", other as char),
            )),
        }
    }

    fn lex_char(&mut self, line: usize, column: usize) -> Result<TokenKind, Diagnostic> {
        self.bump(); // opening quote
        if self.peek() == Some(b'\'') {
            return Err(Diagnostic::error(
                self.file,
                line,
                column,
                "empty character literal",
            ));
        }
        let byte = self.lex_escaped_byte(line, column)?;
        match self.bump() {
            Some(b'\'') => Ok(TokenKind::CharLit(byte as i64)),
            _ => Err(Diagnostic::error(
                self.file,
                line,
                column,
                "unterminated character literal",
            )),
        }
    }

    fn lex_string(&mut self, line: usize, column: usize) -> Result<TokenKind, Diagnostic> {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.bump();
                    return Ok(TokenKind::StrLit(bytes));
                }
                Some(b'\n') | None => {
                    return Err(Diagnostic::error(
                        self.file,
                        line,
                        column,
                        "unterminated string literal",
                    ));
                }
                Some(_) => bytes.push(self.lex_escaped_byte(line, column)?),
            }
        }
    }

    /// Match an operator, longest first
    fn lex_punct(&mut self) -> Option<Punct> {
        use Punct::*;
        let rest = &self.src[self.pos..];
        // (text, punct) ordered so that longer operators are tried first
        const TABLE: &[(&str, Punct)] = &[
            ("<<=", ShlAssign),
            (">>=", ShrAssign),
            ("...", Ellipsis),
            ("->", Arrow),
            ("++", PlusPlus),
            ("--", MinusMinus),
            ("<<", Shl),
            (">>", Shr),
            ("<=", Le),
            (">=", Ge),
            ("==", EqEq),
            ("!=", BangEq),
            ("&&", AmpAmp),
            ("||", PipePipe),
            ("+=", PlusAssign),
            ("-=", MinusAssign),
            ("*=", StarAssign),
            ("/=", SlashAssign),
            ("%=", PercentAssign),
            ("&=", AmpAssign),
            ("|=", PipeAssign),
            ("^=", CaretAssign),
            ("(", LParen),
            (")", RParen),
            ("[", LBracket),
            ("]", RBracket),
            ("{", LBrace),
            ("}", RBrace),
            (";", Semi),
            (",", Comma),
            (".", Dot),
            ("?", Question),
            (":", Colon),
            ("+", Plus),
            ("-", Minus),
            ("*", Star),
            ("/", Slash),
            ("%", Percent),
            ("&", Amp),
            ("|", Pipe),
            ("^", Caret),
            ("~", Tilde),
            ("!", Bang),
            ("<", Lt),
            (">", Gt),
            ("=", Assign),
        ];
        for (text, punct) in TABLE {
            if rest.starts_with(text.as_bytes()) {
                for _ in 0..text.len() {
                    self.bump();
                }
                return Some(*punct);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, "test.c")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        let ks = kinds("int main void foo");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Ident,
                TokenKind::Keyword(Keyword::Void),
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_int_literals() {
        let ks = kinds("123 0x1A 010 42u 7L 9ul");
        assert_eq!(
            ks[0],
            TokenKind::IntLit {
                value: 123,
                unsigned: false,
                long: false
            }
        );
        assert_eq!(
            ks[1],
            TokenKind::IntLit {
                value: 26,
                unsigned: false,
                long: false
            }
        );
        assert_eq!(
            ks[2],
            TokenKind::IntLit {
                value: 8,
                unsigned: false,
                long: false
            }
        );
        assert_eq!(
            ks[3],
            TokenKind::IntLit {
                value: 42,
                unsigned: true,
                long: false
            }
        );
        assert_eq!(
            ks[4],
            TokenKind::IntLit {
                value: 7,
                unsigned: false,
                long: true
            }
        );
        assert_eq!(
            ks[5],
            TokenKind::IntLit {
                value: 9,
                unsigned: true,
                long: true
            }
        );
    }

    #[test]
    fn test_lexeme_preserved_verbatim() {
        let tokens = tokenize("0x1A 010", "test.c").unwrap();
        assert_eq!(tokens[0].text, "0x1A");
        assert_eq!(tokens[1].text, "010");
    }

    #[test]
    fn test_char_literals() {
        let ks = kinds(r"'a' '\n' '\0' '\x41' '\101'");
        assert_eq!(ks[0], TokenKind::CharLit(97));
        assert_eq!(ks[1], TokenKind::CharLit(10));
        assert_eq!(ks[2], TokenKind::CharLit(0));
        assert_eq!(ks[3], TokenKind::CharLit(65));
        assert_eq!(ks[4], TokenKind::CharLit(65));
    }

    #[test]
    fn test_string_literal_escapes() {
        let ks = kinds(r#""hi\n\t\"q\"""#);
        assert_eq!(
            ks[0],
            TokenKind::StrLit(b"hi\n\t\"q\"".to_vec())
        );
    }

    #[test]
    fn test_operators_longest_first() {
        let ks = kinds("<<= << < >>= >> >= > ... . ->");
        use Punct::*;
        let expect = [ShlAssign, Shl, Lt, ShrAssign, Shr, Ge, Gt, Ellipsis, Dot, Arrow];
        for (i, p) in expect.iter().enumerate() {
            assert_eq!(ks[i], TokenKind::Punct(*p), "at index {}", i);
        }
    }

    #[test]
    fn test_comments_skipped() {
        let ks = kinds("a // line comment\n/* block\ncomment */ b");
        assert_eq!(ks.len(), 3); // a, b, eof
    }

    #[test]
    fn test_line_directive_discarded() {
        let ks = kinds("# 1 \"t.c\"\nint x;\n#line 5\nint y;");
        // two declarations worth of tokens, no '#' garbage
        assert_eq!(
            ks.iter()
                .filter(|k| matches!(k, TokenKind::Keyword(Keyword::Int)))
                .count(),
            2
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("int\n  x;", "test.c").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("\"abc", "test.c").unwrap_err();
        assert!(err.message.contains("unterminated string"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = tokenize("int x; /* oops", "test.c").unwrap_err();
        assert!(err.message.contains("unterminated block comment"));
    }

    #[test]
    fn test_stray_character() {
        let err = tokenize("int x @ y;", "test.c").unwrap_err();
        assert!(err.message.contains("stray character"));
        assert_eq!(err.column, 7);
    }

    #[test]
    fn test_relex_reconstruction_preserves_tokens() {
        // reassemble lexemes with canonical whitespace and re-lex
        let source = "int main(void){return 040+0x2A;}";
        let tokens = tokenize(source, "t.c").unwrap();
        let rebuilt: Vec<String> = tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| t.text.clone())
            .collect();
        let rebuilt = rebuilt.join(" ");
        let again = tokenize(&rebuilt, "t.c").unwrap();
        let a: Vec<_> = tokens.iter().map(|t| &t.kind).collect();
        let b: Vec<_> = again.iter().map(|t| &t.kind).collect();
        assert_eq!(a, b);
    }
}
