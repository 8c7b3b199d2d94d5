//! Error handling substrate (spec §7). `ExceptionType` classifies both
//! engine-raised errors and script `throw`n values under one discriminant so
//! a host embedder or the test262 runner can match on error *kind* rather
//! than scraping a message string — this is the REDESIGN FLAG from
//! `spec.md` §9 applied throughout. `JsError` pairs that with the actual
//! thrown `Value`, mirroring `nova_vm::ecmascript::execution::agent`'s
//! `JsError` newtype so a thrown object and an engine-raised `TypeError`
//! share one propagation path.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    SyntaxError,
    TypeError,
    RangeError,
    ReferenceError,
    EvalError,
    UriError,
    Other,
}

impl ExceptionType {
    pub fn name(self) -> &'static str {
        match self {
            ExceptionType::SyntaxError => "SyntaxError",
            ExceptionType::TypeError => "TypeError",
            ExceptionType::RangeError => "RangeError",
            ExceptionType::ReferenceError => "ReferenceError",
            ExceptionType::EvalError => "EvalError",
            ExceptionType::UriError => "URIError",
            ExceptionType::Other => "Error",
        }
    }
}

/// A thrown value plus the engine's best classification of it. Constructed
/// either directly by the evaluator (`JsError::new(ExceptionType::TypeError, ..)`)
/// or by unwrapping a script-level `throw` of an arbitrary value, in which
/// case `kind` is derived from the thrown object's constructor name when
/// recognizable and `Other` otherwise.
#[derive(Debug, Clone)]
pub struct JsError {
    pub kind: ExceptionType,
    pub value: Value,
}

impl JsError {
    pub fn new(kind: ExceptionType, message: impl Into<std::string::String>) -> Self {
        JsError { kind, value: Value::from_string(format!("{}: {}", kind.name(), message.into())) }
    }

    pub fn thrown(value: Value) -> Self {
        JsError { kind: ExceptionType::Other, value }
    }
}

impl std::fmt::Display for JsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value.to_display_string())
    }
}

impl std::error::Error for JsError {}

/// Parse/lex surface errors, kept distinct from runtime `JsError`s (they
/// happen before any realm exists to construct a `SyntaxError` object in).
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] js_parser::ParseError),
    #[error("{0}")]
    Runtime(JsError),
}

impl From<JsError> for EngineError {
    fn from(e: JsError) -> Self {
        EngineError::Runtime(e)
    }
}

impl EngineError {
    /// The error's typed kind, for callers (the test262 runner) that need to
    /// match an expected error class rather than scrape a message string.
    pub fn exception_type(&self) -> ExceptionType {
        match self {
            EngineError::Parse(_) => ExceptionType::SyntaxError,
            EngineError::Runtime(e) => e.kind,
        }
    }
}
