//! Translation options.

/// Switches for the optional parts of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TranslateConfig {
    /// Push the constant value of an already-resolved, already-initialized
    /// static final field instead of emitting a field read.
    pub fold_static_constants: bool,
    /// Guard virtual calls with a receiver type check when the profile
    /// names a dominant receiver.
    pub devirtualize: bool,
    /// Run the structural verifiers between stages.
    pub verify: bool,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        TranslateConfig {
            fold_static_constants: true,
            devirtualize: true,
            verify: cfg!(debug_assertions),
        }
    }
}

impl TranslateConfig {
    /// Everything on, including verification in release builds.
    pub fn strict() -> Self {
        TranslateConfig {
            verify: true,
            ..Self::default()
        }
    }

    /// No optional rewrites; the output depends only on the symbol table's
    /// resolution state.
    pub fn plain() -> Self {
        TranslateConfig {
            fold_static_constants: false,
            devirtualize: false,
            verify: true,
        }
    }
}
