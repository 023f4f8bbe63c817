// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the compiler's semantic passes (parse is outside the runner),
// their dependency edges, and the artifacts they produce. Used by the pipeline
// runner to compute the passes a terminal pass needs and which of them the
// user may switch off.

use std::collections::HashSet;
use std::fmt;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass. Parsing happens before the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Elaborate,
    ConstProp,
    Verify,
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(descriptor(*self).name)
    }
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Graph,     // StreamGraph
    PassStats, // ConstPropStats
    Cert,      // GraphCert
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Later passes still run on the input artifact when this one is off.
    pub skippable: bool,
    /// Postcondition summary, printed in verbose mode.
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Elaborate => PassDescriptor {
            name: "elaborate",
            inputs: &[],
            outputs: &[ArtifactId::Graph],
            skippable: false,
            invariants: "instance tree, names resolved, child lists mirror init",
        },
        PassId::ConstProp => PassDescriptor {
            name: "const_prop",
            inputs: &[PassId::Elaborate],
            outputs: &[ArtifactId::Graph, ArtifactId::PassStats],
            skippable: true,
            invariants: "every reachable node at its local fixpoint",
        },
        PassId::Verify => PassDescriptor {
            name: "verify",
            inputs: &[PassId::ConstProp],
            outputs: &[ArtifactId::Cert],
            skippable: false,
            invariants: "C1-C3 obligations checked",
        },
    }
}

// ── Stage certificates ─────────────────────────────────────────────────────

/// Machine-checkable evidence that a pass met its postconditions.
pub trait StageCert {
    /// True when every obligation holds.
    fn all_pass(&self) -> bool;
    /// Each obligation's name and whether it holds.
    fn obligations(&self) -> Vec<(&'static str, bool)>;
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 3] = [PassId::Elaborate, PassId::ConstProp, PassId::Verify];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_verify_includes_all() {
        assert_eq!(
            required_passes(PassId::Verify),
            vec![PassId::Elaborate, PassId::ConstProp, PassId::Verify]
        );
    }

    #[test]
    fn required_passes_const_prop_skips_verify() {
        let passes = required_passes(PassId::ConstProp);
        assert_eq!(passes, vec![PassId::Elaborate, PassId::ConstProp]);
        assert!(!passes.contains(&PassId::Verify));
    }

    #[test]
    fn required_passes_elaborate_is_minimal() {
        assert_eq!(required_passes(PassId::Elaborate), vec![PassId::Elaborate]);
    }

    #[test]
    fn only_const_prop_is_skippable() {
        let skippable: Vec<PassId> = ALL_PASSES
            .into_iter()
            .filter(|p| descriptor(*p).skippable)
            .collect();
        assert_eq!(skippable, vec![PassId::ConstProp]);
    }

    #[test]
    fn display_uses_descriptor_name() {
        assert_eq!(PassId::ConstProp.to_string(), "const_prop");
        assert_eq!(format!("{}", PassId::Verify), "verify");
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            for dep in desc.inputs {
                let dep_passes = required_passes(*pass);
                let dep_pos = dep_passes.iter().position(|p| p == dep);
                let self_pos = dep_passes.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
