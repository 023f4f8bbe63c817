// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: the parsed Program must be set before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete callback after each pass for immediate display.

use std::time::Instant;

use crate::ast::Program;
use crate::const_prop::{ConstPropConfig, ConstPropStats};
use crate::diag::{DiagLevel, Diagnostic};
use crate::graph::StreamGraph;
use crate::pass::{descriptor, required_passes, PassId};
use crate::verify::GraphCert;

// ── Options ────────────────────────────────────────────────────────────────

/// Everything the passes read besides the program.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Top-level stream; `None` picks the last stream nobody instantiates.
    pub top: Option<String>,
    pub config: ConstPropConfig,
    /// Leave the graph as elaborated.
    pub skip_const_prop: bool,
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds and cache-key use.
///
/// `source_hash`: SHA-256 of the raw `.str` source text.
/// `config_fingerprint`: SHA-256 of the compact JSON of the pass configuration.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub config_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the config fingerprint (64 characters).
    pub fn config_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.config_fingerprint)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"config_fingerprint\": \"{}\",\n  \"manifest_schema_version\": 1,\n  \"compiler_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.config_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from source text and pass options.
///
/// The fingerprint covers the configuration and whether the pass runs, but
/// not `verbose`, which never changes the output.
pub fn compute_provenance(source: &str, options: &PipelineOptions) -> Provenance {
    let config = ConstPropConfig {
        verbose: false,
        ..options.config.clone()
    };
    let canonical = serde_json::json!({
        "const_prop": !options.skip_const_prop,
        "config": config,
        "top": options.top,
    })
    .to_string();

    Provenance {
        source_hash: sha256(source.as_bytes()),
        config_fingerprint: sha256(canonical.as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compilation state ──────────────────────────────────────────────────────

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub program: Program,
    pub graph: Option<StreamGraph>,
    pub stats: Option<ConstPropStats>,
    pub cert: Option<GraphCert>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            graph: None,
            stats: None,
            cert: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

// ── Helper: check diagnostics for errors ───────────────────────────────────

fn has_error_diags(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

/// Per-pass post-processing: callback, accumulate, verbose, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: std::time::Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_error_diags(&diags);
    state.diagnostics.extend(diags);
    if verbose {
        eprintln!(
            "sgc: {} complete, {:.1}ms ({})",
            pass_id,
            elapsed.as_secs_f64() * 1000.0,
            descriptor(pass_id).invariants
        );
    }
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → verbose → error check.
///
/// Preconditions: `state.program` is set.
/// Postconditions: artifacts for all passes in `required_passes(terminal)` are populated,
///   or `state.has_error` is true. With `skip_const_prop`, `state.stats` stays `None`.
/// Failure modes: any pass producing error-level diagnostics.
/// Side effects: calls `on_pass_complete` after each pass for immediate diagnostic display.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &PipelineOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let verbose = options.config.verbose;

    for pass_id in required_passes(terminal) {
        if options.skip_const_prop && descriptor(pass_id).skippable {
            if verbose {
                eprintln!("sgc: {} skipped", pass_id);
            }
            continue;
        }
        match pass_id {
            PassId::Elaborate => {
                let t = Instant::now();
                let result = crate::elaborate::elaborate(&state.program, options.top.as_deref());
                let elapsed = t.elapsed();
                if verbose {
                    eprintln!("sgc: elaborated {} nodes", result.graph.nodes.len());
                }
                state.graph = Some(result.graph);
                finish_pass(
                    state,
                    PassId::Elaborate,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
            PassId::ConstProp => {
                let Some(graph) = state.graph.as_mut() else {
                    continue;
                };
                let t = Instant::now();
                let result = crate::const_prop::propagate_and_unroll(graph, &options.config);
                let elapsed = t.elapsed();
                if verbose {
                    eprintln!(
                        "sgc: {} activations, {} cycles, {} loops unrolled, {} fields resolved",
                        result.stats.nodes_visited,
                        result.stats.cycles,
                        result.stats.unrolled_loops,
                        result.stats.fields_resolved
                    );
                }
                state.stats = Some(result.stats);
                finish_pass(
                    state,
                    PassId::ConstProp,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
            PassId::Verify => {
                let Some(graph) = state.graph.as_ref() else {
                    continue;
                };
                let t = Instant::now();
                let result = crate::verify::verify_graph(graph);
                let elapsed = t.elapsed();
                state.cert = Some(result.cert);
                finish_pass(
                    state,
                    PassId::Verify,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::codes;
    use crate::pass::StageCert;

    fn state_for(source: &str) -> CompilationState {
        let parsed = crate::parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        CompilationState::new(parsed.program.unwrap())
    }

    const SOURCE: &str = "
        filter A(int k) { work push k { push(k); } }
        pipeline P() { init { for (int i = 0; i < 3; i++) add A(i); } }";

    #[test]
    fn full_pipeline_populates_all_artifacts() {
        let mut state = state_for(SOURCE);
        let mut seen = Vec::new();
        run_pipeline(&mut state, PassId::Verify, &PipelineOptions::default(), |p, _| {
            seen.push(p)
        })
        .unwrap();
        assert_eq!(seen, vec![PassId::Elaborate, PassId::ConstProp, PassId::Verify]);
        assert!(!state.has_error);
        assert_eq!(state.stats.as_ref().unwrap().unrolled_loops, 1);
        assert!(state.cert.as_ref().unwrap().all_pass());
        assert!(state.diagnostics.is_empty());
    }

    #[test]
    fn skipping_const_prop_leaves_symbolic_fields() {
        let mut state = state_for(SOURCE);
        let options = PipelineOptions {
            skip_const_prop: true,
            ..PipelineOptions::default()
        };
        run_pipeline(&mut state, PassId::Verify, &options, |_, _| {}).unwrap();
        assert!(state.stats.is_none());
        assert!(state
            .diagnostics
            .iter()
            .all(|d| d.code == Some(codes::W0300)));
        assert_eq!(state.diagnostics.len(), 1);
    }

    #[test]
    fn elaboration_error_stops_pipeline() {
        let mut state = state_for("pipeline P() { init { add Missing(); } }");
        let err = run_pipeline(&mut state, PassId::Verify, &PipelineOptions::default(), |_, _| {})
            .unwrap_err();
        assert_eq!(err.failing_pass, PassId::Elaborate);
        assert!(state.has_error);
        assert!(state.stats.is_none());
        assert!(state.cert.is_none());
    }

    #[test]
    fn arity_error_fails_const_prop() {
        let mut state = state_for(
            "filter A(int k) { work push k { push(k); } }
             pipeline P() { init { add A(); } }",
        );
        let err = run_pipeline(&mut state, PassId::Verify, &PipelineOptions::default(), |_, _| {})
            .unwrap_err();
        assert_eq!(err.failing_pass, PassId::ConstProp);
        assert_eq!(state.diagnostics[0].code, Some(codes::E0100));
    }

    #[test]
    fn provenance_is_stable_and_config_sensitive() {
        let options = PipelineOptions::default();
        let a = compute_provenance(SOURCE, &options);
        let b = compute_provenance(SOURCE, &options);
        assert_eq!(a.source_hash, b.source_hash);
        assert_eq!(a.config_fingerprint, b.config_fingerprint);
        assert_eq!(a.source_hash_hex().len(), 64);

        let verbose = PipelineOptions {
            config: ConstPropConfig {
                verbose: true,
                ..ConstPropConfig::default()
            },
            ..PipelineOptions::default()
        };
        assert_eq!(
            compute_provenance(SOURCE, &verbose).config_fingerprint,
            a.config_fingerprint
        );

        let limited = PipelineOptions {
            config: ConstPropConfig {
                unroll_limit: 8,
                ..ConstPropConfig::default()
            },
            ..PipelineOptions::default()
        };
        assert_ne!(
            compute_provenance(SOURCE, &limited).config_fingerprint,
            a.config_fingerprint
        );
    }

    #[test]
    fn provenance_json_shape() {
        let json = compute_provenance(SOURCE, &PipelineOptions::default()).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["manifest_schema_version"], 1);
        assert_eq!(value["compiler_version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(value["source_hash"].as_str().unwrap().len(), 64);
    }
}
