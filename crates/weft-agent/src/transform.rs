use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::registry::{CapturePointRow, Registry, RegistryHandle};
use crate::rewrite;
use crate::runtime::{ClassFileTransformer, Instrumentation};

/// Parsed activation options: a `;`-delimited string where the token
/// `debug` enables diagnostics and any other token is the path to the
/// support library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOptions {
    pub debug: bool,
    pub support_library: Option<PathBuf>,
}

impl AgentOptions {
    pub fn parse(options: &str) -> Self {
        let mut parsed = Self::default();
        for token in options.split(';') {
            if token.is_empty() {
                continue;
            }
            if token == "debug" {
                parsed.debug = true;
            } else {
                parsed.support_library = Some(PathBuf::from(token));
            }
        }
        parsed
    }
}

/// The activated engine: owns the published registry and drives
/// retransformation through the hosting runtime.
pub struct CaptureAgent {
    runtime: Arc<dyn Instrumentation>,
    registry: Arc<RegistryHandle>,
}

impl CaptureAgent {
    /// Parses `options`, wires the transformer into `runtime` and performs
    /// the startup sweep over already-loaded registry classes.
    ///
    /// Returns `Ok(None)` when no support-library path was supplied: the
    /// facility disables itself without registering anything, which is a
    /// graceful no-op for the host process, not an error.
    pub fn activate(
        options: &str,
        runtime: Arc<dyn Instrumentation>,
    ) -> anyhow::Result<Option<Arc<CaptureAgent>>> {
        Self::activate_with_registry(options, runtime, Registry::builtin())
    }

    pub fn activate_with_registry(
        options: &str,
        runtime: Arc<dyn Instrumentation>,
        initial: Registry,
    ) -> anyhow::Result<Option<Arc<CaptureAgent>>> {
        let opts = AgentOptions::parse(options);
        let Some(library) = opts.support_library else {
            info!("no support library path supplied, capture instrumentation stays off");
            return Ok(None);
        };
        runtime.append_to_search_path(&library)?;

        let registry = Arc::new(RegistryHandle::new(initial));
        let transformer = CaptureTransformer {
            registry: registry.clone(),
            debug: opts.debug,
            dump_dir: opts.debug.then(|| PathBuf::from(".")),
        };
        runtime.add_transformer(Arc::new(transformer));

        let agent = Arc::new(CaptureAgent { runtime, registry });
        agent.startup_sweep();
        if opts.debug {
            debug!("capture agent ready");
        }
        Ok(Some(agent))
    }

    pub fn registry(&self) -> Arc<RegistryHandle> {
        self.registry.clone()
    }

    /// Replaces the active capture-point set in one atomic swap, then
    /// retransforms the union of previously and newly affected classes so
    /// stale instrumentation is removed and new instrumentation added in
    /// one redefinition pass per class.
    pub fn replace_capture_points(&self, rows: &[CapturePointRow]) {
        let old = self.registry.get();
        let mut affected: BTreeSet<String> =
            old.capture_class_names().map(str::to_string).collect();
        affected.extend(rows.iter().map(|row| row.class_name.clone()));

        self.registry.replace(old.with_capture_rows(rows));

        for class_name in &affected {
            if let Err(err) = self.runtime.retransform_class(class_name) {
                // Loud, but the rest of the batch still goes through.
                error!(class = %class_name, %err, "retransformation failed");
            }
        }
    }

    /// JSON entry point for an attached debugger; see [`CapturePointRow`]
    /// for the row schema.
    pub fn replace_capture_points_json(&self, payload: &str) -> serde_json::Result<()> {
        let rows: Vec<CapturePointRow> = serde_json::from_str(payload)?;
        self.replace_capture_points(&rows);
        Ok(())
    }

    /// Retransforms already-loaded classes that have registry entries.
    /// Never a full-population sweep.
    fn startup_sweep(&self) {
        let registry = self.registry.get();
        for class_name in self.runtime.loaded_class_names() {
            if !registry.contains_class(&class_name) {
                continue;
            }
            if let Err(err) = self.runtime.retransform_class(&class_name) {
                warn!(class = %class_name, %err, "startup retransformation failed");
            }
        }
    }
}

/// The per-class-load callback. Stateless apart from the registry read;
/// safe for concurrent invocation across loader threads.
pub struct CaptureTransformer {
    registry: Arc<RegistryHandle>,
    debug: bool,
    dump_dir: Option<PathBuf>,
}

impl CaptureTransformer {
    pub fn new(registry: Arc<RegistryHandle>) -> Self {
        Self { registry, debug: false, dump_dir: None }
    }

    /// Enables verbose diagnostics and per-class dumps into `dump_dir`.
    pub fn with_debug_dump(registry: Arc<RegistryHandle>, dump_dir: PathBuf) -> Self {
        Self { registry, debug: true, dump_dir: Some(dump_dir) }
    }

    fn dump(&self, class_name: &str, bytes: &[u8]) {
        let Some(dir) = &self.dump_dir else { return };
        let file = format!("instrumented_{}.class", class_name.replace('/', "_"));
        if let Err(err) = fs::write(dir.join(&file), bytes) {
            // Best effort only; diagnostics must never fail a transform.
            warn!(%file, %err, "failed to dump instrumented class");
        }
    }
}

impl ClassFileTransformer for CaptureTransformer {
    fn transform(&self, class_name: &str, class_bytes: &[u8]) -> Option<Vec<u8>> {
        let registry = self.registry.get();
        let captures = registry.capture_points(class_name);
        let inserts = registry.insert_points(class_name);
        if captures.is_empty() && inserts.is_empty() {
            return None;
        }
        match rewrite::instrument_class(class_bytes, captures, inserts) {
            Ok(Some(bytes)) => {
                if self.debug {
                    self.dump(class_name, &bytes);
                }
                Some(bytes)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(class = %class_name, %err, "instrumentation failed, class left unchanged");
                None
            }
        }
    }
}
