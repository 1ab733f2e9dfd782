//! Persistent binding-scope chains.
//!
//! Walking a closure body pushes one scope per nested closure. Scopes are
//! immutable once pushed, so a handle taken at any point stays a valid
//! snapshot of "what is bound here" for later queries.

use smallvec::SmallVec;

use crate::VarId;

/// Handle of one scope in a [`ScopeChain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ScopeId(u32);

struct ScopeNode {
    vars: SmallVec<[VarId; 2]>,
    parent: Option<ScopeId>,
}

/// Arena of scopes linked to their parents.
#[derive(Default)]
pub struct ScopeChain {
    nodes: Vec<ScopeNode>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a scope binding `vars` inside `parent`.
    pub fn push(&mut self, parent: Option<ScopeId>, vars: &[VarId]) -> ScopeId {
        let id = u32::try_from(self.nodes.len())
            .unwrap_or_else(|_| panic!("scope count exceeds u32::MAX"));
        self.nodes.push(ScopeNode {
            vars: SmallVec::from_slice(vars),
            parent,
        });
        ScopeId(id)
    }

    /// Whether `var` is bound in `scope` or any of its ancestors.
    pub fn binds(&self, scope: Option<ScopeId>, var: VarId) -> bool {
        let mut current = scope;
        while let Some(ScopeId(index)) = current {
            let node = &self.nodes[index as usize];
            if node.vars.contains(&var) {
                return true;
            }
            current = node.parent;
        }
        false
    }
}
