//! Symbolic references and the resolution interface.
//!
//! The front end never loads classes itself. It asks a [`SymbolTable`]
//! whether a reference is already resolved, and either folds the resolved
//! [`Descriptor`] into the IR as a constant or emits a runtime resolution
//! step. Resolution may be requested concurrently by independent method
//! translations, so implementations must be `Sync` and idempotent.

mod pool;

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;

use crate::{Kind, Literal};

pub use pool::SymbolPool;

// ── Handles ─────────────────────────────────────────────────────────

/// Index of a symbolic reference (constant-pool entry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolRef(u32);

impl SymbolRef {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a loaded type, as compared by a hub read at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeTag(u32);

impl TypeTag {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type{}", self.0)
    }
}

/// Identity of a method, used as the key of the translated-method table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MethodId(u32);

impl MethodId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

// ── Symbolic information ────────────────────────────────────────────

/// What a symbolic reference names, known without resolving it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Class,
    Field {
        kind: Kind,
        is_static: bool,
    },
    /// A method; `params` excludes the receiver.
    Method {
        params: Vec<Kind>,
        result: Kind,
        is_static: bool,
    },
}

/// Unresolved view of a symbol: its name and signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Symbolic {
    pub name: Box<str>,
    pub kind: SymbolKind,
}

/// What a resolved symbol points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Resolved {
    Class {
        tag: TypeTag,
    },
    Field {
        offset: u32,
        /// Compile-time constant value of a final static field.
        constant: Option<Literal>,
    },
    Method {
        id: MethodId,
    },
}

/// Result of resolving a symbolic reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub symbol: SymbolRef,
    /// Declaring type; the one that must be initialized before use.
    pub holder: TypeTag,
    pub target: Resolved,
}

impl Descriptor {
    /// Constant value of a folded static field, if any.
    pub fn constant(&self) -> Option<&Literal> {
        match &self.target {
            Resolved::Field { constant, .. } => constant.as_ref(),
            _ => None,
        }
    }

    /// Target method of a resolved method reference.
    pub fn method(&self) -> Option<MethodId> {
        match self.target {
            Resolved::Method { id } => Some(id),
            _ => None,
        }
    }
}

/// Linkage failure reported by [`SymbolTable::resolve`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkageError {
    #[error("no symbol {0}")]
    UnknownSymbol(SymbolRef),
    #[error("class of symbol {symbol} could not be loaded: {reason}")]
    NoClassDef { symbol: SymbolRef, reason: Box<str> },
}

// ── Traits ──────────────────────────────────────────────────────────

/// Symbol table consulted during translation and lowering.
pub trait SymbolTable: Sync {
    /// Name and signature of `symbol`, without loading anything.
    fn symbolic(&self, symbol: SymbolRef) -> Option<Symbolic>;

    /// Whether `symbol` is resolved already, so resolving it is side-effect
    /// free.
    fn is_resolved(&self, symbol: SymbolRef) -> bool;

    /// Resolve `symbol`, loading classes if needed.
    fn resolve(&self, symbol: SymbolRef) -> Result<Descriptor, LinkageError>;

    /// Whether the holder of `descriptor` may still need initialization.
    fn requires_initialization(&self, descriptor: &Descriptor) -> bool;

    /// Method that a virtual call through `descriptor` dispatches to for a
    /// receiver of type `receiver`, when that is known.
    fn select_virtual(&self, descriptor: &Descriptor, receiver: TypeTag) -> Option<MethodId> {
        let _ = (descriptor, receiver);
        None
    }
}

/// Call-site receiver profile, keyed by bytecode offset.
pub trait ReceiverProfile: Sync {
    fn most_frequent_receiver_type(&self, offset: u32) -> Option<TypeTag>;
}

/// Profile with no data.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProfile;

impl ReceiverProfile for NoProfile {
    fn most_frequent_receiver_type(&self, _offset: u32) -> Option<TypeTag> {
        None
    }
}

impl<S: BuildHasher + Sync> ReceiverProfile for HashMap<u32, TypeTag, S> {
    fn most_frequent_receiver_type(&self, offset: u32) -> Option<TypeTag> {
        self.get(&offset).copied()
    }
}
