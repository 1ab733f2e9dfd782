//! The per-method pipeline and the table of translated methods.
//!
//! ```text
//! Method ─▶ translate_blocks ─▶ convert ─▶ lower ─▶ TranslatedMethod
//!               (HCIR)           (closed)   (LCIR)
//! ```
//!
//! With [`TranslateConfig::verify`] set, the structural verifiers run after
//! every stage and a failure names the stage that produced the bad graph.

use std::sync::Arc;

use cps_bytecode::{Method, MethodId, NoProfile, ReceiverProfile, SymbolTable};
use cps_ir::verify::{verify_closed, verify_hcir, verify_lcir, verify_unique_bindings};
use cps_ir::{ClosureId, TermArena, VarId, VerifyError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rayon::prelude::*;

use crate::closure::{convert, ConversionStats};
use crate::config::TranslateConfig;
use crate::error::{Result, Stage, TranslateError};
use crate::lower::lower;
use crate::translate::translate_blocks;

/// A method lowered to LCIR.
#[derive(Debug)]
pub struct TranslatedMethod {
    pub method: MethodId,
    pub arena: TermArena,
    /// Root closure `(params.., cc, ce)`.
    pub root: ClosureId,
    pub stats: ConversionStats,
    /// Number of operators lowered.
    pub lowered: usize,
}

impl TranslatedMethod {
    /// Parameters of the root closure, continuations last.
    pub fn params(&self) -> &[VarId] {
        &self.arena.closure(self.root).params
    }
}

/// Runs the pipeline against one symbol table.
#[derive(Clone, Copy)]
pub struct Translator<'a> {
    symbols: &'a dyn SymbolTable,
    profile: &'a dyn ReceiverProfile,
    config: TranslateConfig,
}

impl<'a> Translator<'a> {
    pub fn new(symbols: &'a dyn SymbolTable) -> Self {
        Translator {
            symbols,
            profile: &NoProfile,
            config: TranslateConfig::default(),
        }
    }

    #[must_use]
    pub fn with_profile(mut self, profile: &'a dyn ReceiverProfile) -> Self {
        self.profile = profile;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: TranslateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TranslateConfig {
        &self.config
    }

    /// Translate, convert, and lower one method.
    pub fn translate(&self, method: &Method) -> Result<TranslatedMethod> {
        let id = method.id;
        let (mut arena, root) = translate_blocks(method, self.symbols, &self.config)?;
        self.check(id, Stage::Translation, || verify_hcir(&arena, root))?;

        let stats = convert(&mut arena, root);
        self.check(id, Stage::Conversion, || {
            verify_hcir(&arena, root)?;
            verify_closed(&arena, root)?;
            verify_unique_bindings(&arena, root)
        })?;

        let lowered = lower(
            &mut arena,
            root,
            self.symbols,
            self.profile,
            &self.config,
            id,
        )?;
        self.check(id, Stage::Lowering, || {
            verify_lcir(&arena, root)?;
            verify_closed(&arena, root)
        })?;

        tracing::debug!(
            method = %id,
            name = %method.name,
            blocks = stats.blocks,
            lowered,
            "translated method"
        );
        Ok(TranslatedMethod {
            method: id,
            arena,
            root,
            stats,
            lowered,
        })
    }

    fn check(
        &self,
        method: MethodId,
        stage: Stage,
        verify: impl FnOnce() -> Result<(), VerifyError>,
    ) -> Result<()> {
        if !self.config.verify {
            return Ok(());
        }
        verify().map_err(|source| {
            tracing::error!(%method, %stage, %source, "verification failed");
            TranslateError::Verify {
                method,
                stage,
                source,
            }
        })
    }

    /// Translate `methods` in parallel into `table`.
    ///
    /// A failure affects only its own method; all failures are returned,
    /// ordered by method id.
    pub fn translate_all(&self, methods: &[Method], table: &MethodTable) -> Vec<TranslateError> {
        let mut errors: Vec<TranslateError> = methods
            .par_iter()
            .filter_map(|method| {
                self.translate(method)
                    .and_then(|translated| table.register(translated).map(|_| ()))
                    .err()
            })
            .collect();
        errors.sort_by_key(TranslateError::method);
        tracing::debug!(
            methods = methods.len(),
            failed = errors.len(),
            "translated method batch"
        );
        errors
    }
}

/// Translate one method with default options and no profile.
pub fn translate(method: &Method, symbols: &dyn SymbolTable) -> Result<TranslatedMethod> {
    Translator::new(symbols).translate(method)
}

/// Concurrent map from method identity to its translation.
///
/// Each method is registered at most once.
#[derive(Debug, Default)]
pub struct MethodTable {
    methods: DashMap<MethodId, Arc<TranslatedMethod>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a translation; fails if the method is already present.
    pub fn register(&self, translated: TranslatedMethod) -> Result<Arc<TranslatedMethod>> {
        match self.methods.entry(translated.method) {
            Entry::Occupied(_) => Err(TranslateError::Duplicate {
                method: translated.method,
            }),
            Entry::Vacant(slot) => {
                let translated = Arc::new(translated);
                slot.insert(Arc::clone(&translated));
                Ok(translated)
            }
        }
    }

    pub fn get(&self, method: MethodId) -> Option<Arc<TranslatedMethod>> {
        self.methods.get(&method).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, method: MethodId) -> bool {
        self.methods.contains_key(&method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
