//! Translation errors.
//!
//! Every error is fatal for the method it names and for nothing else:
//! [`Translator::translate_all`](crate::Translator::translate_all) collects
//! them and keeps going. Linkage failures during speculative work never
//! surface here; the caller falls back to the general operator instead.

use std::fmt;

use cps_bytecode::{Kind, MethodId, SymbolRef};
use cps_ir::VerifyError;

/// What is wrong with a method body.
///
/// Only reachable through input that an upstream verifier should have
/// rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Malformed {
    #[error("method has no code")]
    EmptyCode,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("operand stack exceeds declared maximum of {max}")]
    StackOverflow { max: u16 },
    #[error("expected a {expected} value, found {found}")]
    KindMismatch { expected: Kind, found: Kind },
    #[error("a two-slot value is split by a stack operation")]
    SplitValue,
    #[error("local {index} is read before any store")]
    UndefinedLocal { index: u16 },
    #[error("local {index} exceeds declared maximum of {max}")]
    LocalOutOfRange { index: u16, max: u16 },
    #[error("branch target {target} is not the start of an instruction")]
    InvalidTarget { target: u32 },
    #[error("more than one exception handler covers this instruction")]
    OverlappingHandlers,
    #[error("block reached with stack depth {found}, first reached with {expected}")]
    InconsistentStack { expected: usize, found: usize },
    #[error("control falls off the end of the code")]
    FallsOffEnd,
    #[error("unsupported instruction: {0}")]
    Unsupported(&'static str),
    #[error("no symbol {symbol}")]
    UnknownSymbol { symbol: SymbolRef },
    #[error("symbol {symbol} does not name a {expected}")]
    WrongSymbolKind {
        symbol: SymbolRef,
        expected: &'static str,
    },
}

/// Pipeline stage after which a verifier failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Translation,
    Conversion,
    Lowering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Translation => f.write_str("block translation"),
            Stage::Conversion => f.write_str("closure conversion"),
            Stage::Lowering => f.write_str("operator lowering"),
        }
    }
}

/// A failed method translation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("{method} @{offset}: {kind}")]
    Malformed {
        method: MethodId,
        offset: u32,
        kind: Malformed,
    },
    #[error("{method}: invalid graph after {stage}: {source}")]
    Verify {
        method: MethodId,
        stage: Stage,
        source: VerifyError,
    },
    #[error("{method}: internal error: {message}")]
    Internal { method: MethodId, message: String },
    #[error("{method} was already translated")]
    Duplicate { method: MethodId },
}

impl TranslateError {
    pub fn malformed(method: MethodId, offset: u32, kind: Malformed) -> Self {
        TranslateError::Malformed {
            method,
            offset,
            kind,
        }
    }

    /// The method this error belongs to.
    pub fn method(&self) -> MethodId {
        match self {
            TranslateError::Malformed { method, .. }
            | TranslateError::Verify { method, .. }
            | TranslateError::Internal { method, .. }
            | TranslateError::Duplicate { method } => *method,
        }
    }
}

pub type Result<T, E = TranslateError> = std::result::Result<T, E>;
