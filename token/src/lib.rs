//! The token model (spec §3.1): token kinds, decoded literal payloads and
//! source positions. Grounded on the teacher's abandoned hand-rolled
//! prototype (`nova_parser::lexer::Token`, `ast::Keyword`/`Reserved`) rather
//! than the oxc-based tokenizer `nova_vm` eventually adopted, since the spec
//! asks us to own this stage outright.

use num_bigint::BigInt;

/// Precise source location of a token: byte offsets plus 1-based line and
/// column, per spec §3.1's invariant that `start <= end` and both line and
/// column are `>= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end, line, column }
    }
}

/// Decoded literal payload. Absent for punctuators and keywords.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Number(f64),
    /// A numeric literal written in legacy octal form (`010`), kept
    /// distinct from `Number` so the parser can reject it under strict
    /// mode per spec §4.1.
    LegacyOctalNumber(f64),
    BigInt(BigInt),
    String(std::string::String),
    /// Raw, unprocessed template chunk text (escapes are resolved later
    /// once quasis are split out by the parser).
    TemplatePart(std::string::String),
    Regex { pattern: std::string::String, flags: std::string::String },
    Boolean(bool),
}

/// The full ~130-variant token kind enumeration called for by spec §3.1.
/// Comments never surface as tokens (the lexer consumes and discards them,
/// except where they affect ASI/HTML-comment recognition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,

    // Literals
    Identifier,
    PrivateIdentifier,
    NumericLiteral,
    BigIntLiteral,
    StringLiteral,
    RegexLiteral,
    NoSubstitutionTemplate,
    TemplateHead,
    TemplateMiddle,
    TemplateTail,
    True,
    False,
    Null,

    // Keywords
    Await,
    Break,
    Case,
    Catch,
    Class,
    Const,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Export,
    Extends,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    InstanceOf,
    New,
    Return,
    Super,
    Switch,
    This,
    Throw,
    Try,
    TypeOf,
    Var,
    Void,
    While,
    With,
    Yield,
    Let,

    // Contextual keywords (identifier-shaped; kind is only assigned by the
    // parser when unescaped and in the right position)
    Async,
    Static,
    Get,
    Set,
    Of,
    As,
    From,
    Target,
    Meta,

    // Future-reserved words
    Enum,
    Implements,
    Interface,
    Package,
    Private,
    Protected,
    Public,

    // Punctuators
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Ellipsis,
    Semicolon,
    Comma,
    Lt,
    Gt,
    Lte,
    Gte,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Plus,
    Minus,
    Star,
    Percent,
    StarStar,
    PlusPlus,
    MinusMinus,
    ShiftLeft,
    ShiftRight,
    UShiftRight,
    Amp,
    Pipe,
    Caret,
    Bang,
    Tilde,
    AmpAmp,
    PipePipe,
    Question,
    QuestionDot,
    QuestionQuestion,
    Colon,
    Arrow,
    Slash,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    StarStarEq,
    ShiftLeftEq,
    ShiftRightEq,
    UShiftRightEq,
    AmpEq,
    PipeEq,
    CaretEq,
    AmpAmpEq,
    PipePipeEq,
    QuestionQuestionEq,
    At,
    Hash,
}

impl TokenKind {
    /// Reserved words that can never be used as a binding identifier,
    /// independent of strict mode. Used by the parser's Early Error checks.
    pub fn is_always_reserved(self) -> bool {
        matches!(
            self,
            TokenKind::Break
                | TokenKind::Case
                | TokenKind::Catch
                | TokenKind::Class
                | TokenKind::Const
                | TokenKind::Continue
                | TokenKind::Debugger
                | TokenKind::Default
                | TokenKind::Delete
                | TokenKind::Do
                | TokenKind::Else
                | TokenKind::Export
                | TokenKind::Extends
                | TokenKind::False
                | TokenKind::Finally
                | TokenKind::For
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::Import
                | TokenKind::In
                | TokenKind::InstanceOf
                | TokenKind::New
                | TokenKind::Null
                | TokenKind::Return
                | TokenKind::Super
                | TokenKind::Switch
                | TokenKind::This
                | TokenKind::Throw
                | TokenKind::True
                | TokenKind::Try
                | TokenKind::TypeOf
                | TokenKind::Var
                | TokenKind::Void
                | TokenKind::While
                | TokenKind::With
        )
    }

    /// Words reserved only under strict mode (spec §4.2).
    pub fn is_strict_reserved(self) -> bool {
        matches!(
            self,
            TokenKind::Implements
                | TokenKind::Interface
                | TokenKind::Package
                | TokenKind::Private
                | TokenKind::Protected
                | TokenKind::Public
                | TokenKind::Static
                | TokenKind::Yield
                | TokenKind::Let
        )
    }

    pub fn is_assignment_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
                | TokenKind::StarStarEq
                | TokenKind::ShiftLeftEq
                | TokenKind::ShiftRightEq
                | TokenKind::UShiftRightEq
                | TokenKind::AmpEq
                | TokenKind::PipeEq
                | TokenKind::CaretEq
                | TokenKind::AmpAmpEq
                | TokenKind::PipePipeEq
                | TokenKind::QuestionQuestionEq
        )
    }
}

/// A single token: exact source slice, decoded literal, position, and the
/// `has_unicode_escape` flag spec §3.1 requires for later Early Error checks
/// (e.g. a keyword spelled with a `e` escape is not a keyword).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: std::string::String,
    pub literal_value: Option<LiteralValue>,
    pub span: Span,
    pub has_unicode_escape: bool,
    /// True if at least one line terminator appears between this token and
    /// the previous one. Drives ASI in the parser.
    pub preceded_by_newline: bool,
}

impl Token {
    pub fn eof(span: Span) -> Self {
        Token {
            kind: TokenKind::Eof,
            lexeme: std::string::String::new(),
            literal_value: None,
            span,
            has_unicode_escape: false,
            preceded_by_newline: true,
        }
    }
}
