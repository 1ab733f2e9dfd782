//! Bytecode front end producing CPS-IR.
//!
//! Turns one decoded [`Method`](cps_bytecode::Method) into a closed,
//! lowered term graph in three stages:
//!
//! - **[`translate`](mod@translate)** — abstract interpretation of each
//!   source block over a slot-tracking frame and stack, emitting
//!   high-level CPS-IR
//! - **[`closure`]** — closure conversion: free variables of every block
//!   become explicit parameters, unreachable bindings are pruned, and every
//!   variable ends up with a single binder
//! - **[`lower`]** — operator lowering into resolution, initialization,
//!   check, and access snippets
//!
//! [`Translator`] runs the stages with optional verification between them;
//! [`MethodTable`] collects results from parallel translation.
//!
//! # Tracing
//!
//! Set `RUST_LOG=cps_front=debug` and call [`init_tracing`] to see per-stage
//! summaries; `trace` adds per-block and per-call detail.

pub mod closure;
mod config;
mod driver;
mod error;
mod layout;
pub mod lower;
mod slots;
pub mod translate;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

pub use closure::{convert, ConversionStats};
pub use config::TranslateConfig;
pub use driver::{translate, MethodTable, TranslatedMethod, Translator};
pub use error::{Malformed, Result, Stage, TranslateError};

static TRACING_INIT: Once = Once::new();

/// Initialize a tracing subscriber from `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
