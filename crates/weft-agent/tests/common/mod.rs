//! Shared fixtures: a small class builder and a bytecode interpreter that
//! executes rewritten methods against a recording correlation store.

// Not every integration binary uses every fixture helper.
#![allow(dead_code)]

pub mod builder;
pub mod vm;

/// Host class whose static `raise` the interpreter intercepts to throw a
/// fresh exception object; lets fixtures fail without carrying
/// object-construction bytecode.
pub const BOOM_CLASS: &str = "fixture/Boom";
pub const BOOM_ERROR_CLASS: &str = "fixture/BoomError";

/// Routes engine diagnostics into the captured test output when `RUST_LOG`
/// is set. Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
