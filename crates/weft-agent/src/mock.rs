use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::{ClassFileTransformer, Instrumentation, RetransformError};

/// Deterministic, in-memory hosting-runtime test double.
///
/// Holds "loaded" class images, runs registered transformers the way the
/// real runtime would (on definition and on retransformation, always from
/// the pristine original bytes), and records every call the engine makes.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    originals: HashMap<String, Vec<u8>>,
    current: HashMap<String, Vec<u8>>,
    transformers: Vec<Arc<dyn ClassFileTransformer>>,
    unmodifiable: BTreeSet<String>,
    search_path: Vec<PathBuf>,
    retransform_requests: Vec<String>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a class: stores the original bytes and runs them through the
    /// registered transformers, as a class load would.
    pub fn define_class(&self, name: &str, bytes: Vec<u8>) {
        let mut state = self.state.lock();
        let transformed = run_transformers(&state.transformers, name, &bytes);
        state.originals.insert(name.to_string(), bytes.clone());
        state.current.insert(name.to_string(), transformed.unwrap_or(bytes));
    }

    /// The class's current (possibly instrumented) definition.
    pub fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().current.get(name).cloned()
    }

    pub fn mark_unmodifiable(&self, name: &str) {
        self.state.lock().unmodifiable.insert(name.to_string());
    }

    pub fn search_path(&self) -> Vec<PathBuf> {
        self.state.lock().search_path.clone()
    }

    pub fn transformer_count(&self) -> usize {
        self.state.lock().transformers.len()
    }

    /// Every retransformation request issued so far, in order, including
    /// ones that failed.
    pub fn retransform_requests(&self) -> Vec<String> {
        self.state.lock().retransform_requests.clone()
    }
}

impl Instrumentation for MockRuntime {
    fn append_to_search_path(&self, path: &Path) -> io::Result<()> {
        self.state.lock().search_path.push(path.to_path_buf());
        Ok(())
    }

    fn add_transformer(&self, transformer: Arc<dyn ClassFileTransformer>) {
        self.state.lock().transformers.push(transformer);
    }

    fn loaded_class_names(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.originals.keys().cloned().collect();
        names.sort();
        names
    }

    fn retransform_class(&self, class_name: &str) -> Result<(), RetransformError> {
        let mut state = self.state.lock();
        state.retransform_requests.push(class_name.to_string());
        let Some(original) = state.originals.get(class_name).cloned() else {
            return Err(RetransformError::ClassNotFound(class_name.to_string()));
        };
        if state.unmodifiable.contains(class_name) {
            return Err(RetransformError::NotModifiable(class_name.to_string()));
        }
        let transformed = run_transformers(&state.transformers, class_name, &original);
        state.current.insert(class_name.to_string(), transformed.unwrap_or(original));
        Ok(())
    }
}

fn run_transformers(
    transformers: &[Arc<dyn ClassFileTransformer>],
    name: &str,
    bytes: &[u8],
) -> Option<Vec<u8>> {
    let mut result: Option<Vec<u8>> = None;
    for transformer in transformers {
        let input = result.as_deref().unwrap_or(bytes);
        if let Some(next) = transformer.transform(name, input) {
            result = Some(next);
        }
    }
    result
}
