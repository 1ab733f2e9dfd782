//! In-memory symbol table.
//!
//! Used by tests and by embedders that pre-link a closed world. Resolution
//! and initialization state live behind `parking_lot` locks so concurrent
//! translations can resolve the same symbol without coordination.

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use super::{
    Descriptor, LinkageError, MethodId, Resolved, SymbolKind, SymbolRef, SymbolTable, Symbolic,
    TypeTag,
};
use crate::{Kind, Literal};

struct Entry {
    symbolic: Symbolic,
    linkage: Result<Descriptor, LinkageError>,
}

/// A symbol table backed by a vector of entries.
#[derive(Default)]
pub struct SymbolPool {
    entries: Vec<Entry>,
    next_field_offset: u32,
    resolved: RwLock<FxHashSet<SymbolRef>>,
    initialized: RwLock<FxHashSet<TypeTag>>,
    overrides: FxHashMap<(MethodId, TypeTag), MethodId>,
}

impl SymbolPool {
    pub fn new() -> Self {
        Self::default()
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "symbol pools never approach u32::MAX entries"
    )]
    fn push(
        &mut self,
        symbolic: Symbolic,
        linkage: impl FnOnce(SymbolRef) -> Result<Descriptor, LinkageError>,
    ) -> SymbolRef {
        let symbol = SymbolRef::new(self.entries.len() as u32);
        self.entries.push(Entry {
            symbolic,
            linkage: linkage(symbol),
        });
        symbol
    }

    /// Add a class reference.
    pub fn add_class(&mut self, name: &str, tag: TypeTag) -> SymbolRef {
        let symbolic = Symbolic {
            name: name.into(),
            kind: SymbolKind::Class,
        };
        self.push(symbolic, |symbol| {
            Ok(Descriptor {
                symbol,
                holder: tag,
                target: Resolved::Class { tag },
            })
        })
    }

    /// Add an instance field reference.
    pub fn add_field(&mut self, name: &str, holder: TypeTag, kind: Kind) -> SymbolRef {
        self.add_field_entry(name, holder, kind, false, None)
    }

    /// Add a static field reference, optionally with a constant value.
    pub fn add_static_field(
        &mut self,
        name: &str,
        holder: TypeTag,
        kind: Kind,
        constant: Option<Literal>,
    ) -> SymbolRef {
        self.add_field_entry(name, holder, kind, true, constant)
    }

    fn add_field_entry(
        &mut self,
        name: &str,
        holder: TypeTag,
        kind: Kind,
        is_static: bool,
        constant: Option<Literal>,
    ) -> SymbolRef {
        let offset = self.next_field_offset;
        self.next_field_offset += 8;
        let symbolic = Symbolic {
            name: name.into(),
            kind: SymbolKind::Field { kind, is_static },
        };
        self.push(symbolic, |symbol| {
            Ok(Descriptor {
                symbol,
                holder,
                target: Resolved::Field { offset, constant },
            })
        })
    }

    /// Add a static method reference.
    pub fn add_static_method(
        &mut self,
        name: &str,
        holder: TypeTag,
        id: MethodId,
        params: Vec<Kind>,
        result: Kind,
    ) -> SymbolRef {
        self.add_method_entry(name, holder, id, params, result, true)
    }

    /// Add an instance method reference; `params` excludes the receiver.
    pub fn add_method(
        &mut self,
        name: &str,
        holder: TypeTag,
        id: MethodId,
        params: Vec<Kind>,
        result: Kind,
    ) -> SymbolRef {
        self.add_method_entry(name, holder, id, params, result, false)
    }

    fn add_method_entry(
        &mut self,
        name: &str,
        holder: TypeTag,
        id: MethodId,
        params: Vec<Kind>,
        result: Kind,
        is_static: bool,
    ) -> SymbolRef {
        let symbolic = Symbolic {
            name: name.into(),
            kind: SymbolKind::Method {
                params,
                result,
                is_static,
            },
        };
        self.push(symbolic, |symbol| {
            Ok(Descriptor {
                symbol,
                holder,
                target: Resolved::Method { id },
            })
        })
    }

    /// Add a reference whose resolution always fails.
    pub fn add_unlinkable(&mut self, name: &str, kind: SymbolKind) -> SymbolRef {
        let reason: Box<str> = name.into();
        let symbolic = Symbolic {
            name: name.into(),
            kind,
        };
        self.push(symbolic, |symbol| {
            Err(LinkageError::NoClassDef { symbol, reason })
        })
    }

    /// Pretend `symbol` was resolved by earlier execution.
    pub fn mark_resolved(&self, symbol: SymbolRef) {
        self.resolved.write().insert(symbol);
    }

    /// Pretend `tag` was initialized by earlier execution.
    pub fn mark_initialized(&self, tag: TypeTag) {
        self.initialized.write().insert(tag);
    }

    /// Record that `method` dispatches to `target` for receivers of `receiver`.
    pub fn add_override(&mut self, method: MethodId, receiver: TypeTag, target: MethodId) {
        self.overrides.insert((method, receiver), target);
    }

    fn entry(&self, symbol: SymbolRef) -> Option<&Entry> {
        self.entries.get(symbol.index())
    }
}

impl SymbolTable for SymbolPool {
    fn symbolic(&self, symbol: SymbolRef) -> Option<Symbolic> {
        self.entry(symbol).map(|entry| entry.symbolic.clone())
    }

    fn is_resolved(&self, symbol: SymbolRef) -> bool {
        self.resolved.read().contains(&symbol)
    }

    fn resolve(&self, symbol: SymbolRef) -> Result<Descriptor, LinkageError> {
        let entry = self
            .entry(symbol)
            .ok_or(LinkageError::UnknownSymbol(symbol))?;
        let descriptor = entry.linkage.clone()?;
        self.resolved.write().insert(symbol);
        Ok(descriptor)
    }

    fn requires_initialization(&self, descriptor: &Descriptor) -> bool {
        !self.initialized.read().contains(&descriptor.holder)
    }

    fn select_virtual(&self, descriptor: &Descriptor, receiver: TypeTag) -> Option<MethodId> {
        let method = descriptor.method()?;
        match self.overrides.get(&(method, receiver)) {
            Some(&target) => Some(target),
            None if receiver == descriptor.holder => Some(method),
            None => None,
        }
    }
}
