/// Token types produced by the tern lexer.
use crate::span::Span;

/// The kind of a lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer literal, e.g. `42`, `0xff`, `1_000`.
    Integer(i64),
    /// Floating-point literal, e.g. `3.14`, `1.5e10`.
    Float(f64),
    /// String literal (contents without surrounding quotes, escapes resolved).
    String(std::string::String),
    /// An identifier, e.g. `counter`, `_tmp`.
    Identifier(std::string::String),

    // reserved words
    Break,
    Continue,
    Return,
    If,
    Else,
    While,
    Import,
    As,
    Function,
    True,
    False,
    Null,

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `.`
    Dot,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    Amp,
    Pipe,
    Caret,
    AmpAmp,
    PipePipe,
    Shl,
    Shr,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    PlusPlus,
    MinusMinus,

    /// `=`
    Assign,
    /// `+=`
    PlusAssign,
    /// `-=`
    MinusAssign,
    /// `*=`
    StarAssign,
    /// `/=`
    SlashAssign,

    /// A line comment: `// ...` (text does NOT include the leading `//`).
    LineComment(std::string::String),
    /// A block comment: `/* ... */` (text does NOT include delimiters).
    /// Block comments may nest.
    BlockComment(std::string::String),

    /// End of input.
    Eof,
    /// An unrecognized character or malformed token.
    Error(std::string::String),
}

impl TokenKind {
    /// Human-readable name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Identifier(_) => "identifier",
            Self::Break => "`break`",
            Self::Continue => "`continue`",
            Self::Return => "`return`",
            Self::If => "`if`",
            Self::Else => "`else`",
            Self::While => "`while`",
            Self::Import => "`import`",
            Self::As => "`as`",
            Self::Function => "`function`",
            Self::True => "`true`",
            Self::False => "`false`",
            Self::Null => "`null`",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::LBracket => "`[`",
            Self::RBracket => "`]`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::Comma => "`,`",
            Self::Colon => "`:`",
            Self::Semicolon => "`;`",
            Self::Dot => "`.`",
            Self::Plus => "`+`",
            Self::Minus => "`-`",
            Self::Star => "`*`",
            Self::Slash => "`/`",
            Self::Percent => "`%`",
            Self::Bang => "`!`",
            Self::Tilde => "`~`",
            Self::Amp => "`&`",
            Self::Pipe => "`|`",
            Self::Caret => "`^`",
            Self::AmpAmp => "`&&`",
            Self::PipePipe => "`||`",
            Self::Shl => "`<<`",
            Self::Shr => "`>>`",
            Self::EqEq => "`==`",
            Self::NotEq => "`!=`",
            Self::Lt => "`<`",
            Self::Gt => "`>`",
            Self::LtEq => "`<=`",
            Self::GtEq => "`>=`",
            Self::PlusPlus => "`++`",
            Self::MinusMinus => "`--`",
            Self::Assign => "`=`",
            Self::PlusAssign => "`+=`",
            Self::MinusAssign => "`-=`",
            Self::StarAssign => "`*=`",
            Self::SlashAssign => "`/=`",
            Self::LineComment(_) => "line comment",
            Self::BlockComment(_) => "block comment",
            Self::Eof => "end of input",
            Self::Error(_) => "error",
        }
    }

    /// Map an identifier to its reserved word, if it is one.
    pub fn reserved(ident: &str) -> Option<Self> {
        Some(match ident {
            "break" => Self::Break,
            "continue" => Self::Continue,
            "return" => Self::Return,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "import" => Self::Import,
            "as" => Self::As,
            "function" => Self::Function,
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            _ => return None,
        })
    }

    /// Returns `true` if this token is any kind of comment.
    pub fn is_comment(&self) -> bool {
        matches!(self, Self::LineComment(_) | Self::BlockComment(_))
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// The original source text of this token.
    pub lexeme: std::string::String,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        span: Span,
        lexeme: impl Into<std::string::String>,
    ) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_comment(&self) -> bool {
        self.kind.is_comment()
    }
}
