// layout.rs — Tile-grid layout data and its DOT exporter
//
// The downstream scheduler places filters on a fixed 2-D grid of tiles and
// runs them in three phases. This module holds that data and renders it:
// one rank group per grid row, one record per tile listing the filters it
// runs in each phase with their multiplicities, one edge per adjacency.
// Choosing the placement is the caller's job.
//
// Preconditions: filters come from a graph whose rates are literal (see
//                `resolved_filters`).
// Postconditions: `emit_layout_dot` output depends only on the grid contents.
// Failure modes: out-of-grid assignments and symbolic rates (`LayoutError`).
// Side effects: none.

use std::fmt::{self, Write};

use crate::graph::{FieldRef, NodeKind, StreamGraph};
use crate::id::NodeId;
use crate::ir::Expr;

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    OutOfGrid {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    SymbolicRate {
        node: NodeId,
        name: String,
        field: FieldRef,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::OutOfGrid {
                x,
                y,
                width,
                height,
            } => write!(f, "tile ({x}, {y}) is outside the {width}x{height} grid"),
            LayoutError::SymbolicRate { node, name, field } => {
                write!(f, "{field} of '{name}' ({node}) is not a literal")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

// ── Grid ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    PrimePump,
    Steady,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Init, Phase::PrimePump, Phase::Steady];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Init => "Init",
            Phase::PrimePump => "Prime Pump",
            Phase::Steady => "Steady",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Init => 0,
            Phase::PrimePump => 1,
            Phase::Steady => 2,
        }
    }
}

/// A filter occupying a tile in one phase, run `mult` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFilter {
    pub node: NodeId,
    pub name: String,
    pub mult: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub number: usize,
    pub x: usize,
    pub y: usize,
    /// Adjacent tile numbers.
    pub neighbors: Vec<usize>,
    phases: [Vec<ScheduledFilter>; 3],
}

impl Tile {
    pub fn filters(&self, phase: Phase) -> &[ScheduledFilter] {
        &self.phases[phase.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    width: usize,
    height: usize,
    /// Row-major: tile `y * width + x`.
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// A `width` x `height` mesh where each tile is adjacent to the tiles
    /// north, east, south and west of it.
    pub fn mesh(width: usize, height: usize) -> Self {
        let mut tiles = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let mut neighbors = Vec::new();
                if y > 0 {
                    neighbors.push((y - 1) * width + x);
                }
                if x + 1 < width {
                    neighbors.push(y * width + x + 1);
                }
                if y + 1 < height {
                    neighbors.push((y + 1) * width + x);
                }
                if x > 0 {
                    neighbors.push(y * width + x - 1);
                }
                tiles.push(Tile {
                    number: y * width + x,
                    x,
                    y,
                    neighbors,
                    phases: Default::default(),
                });
            }
        }
        TileGrid {
            width,
            height,
            tiles,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tile(&self, x: usize, y: usize) -> Option<&Tile> {
        if x < self.width && y < self.height {
            self.tiles.get(y * self.width + x)
        } else {
            None
        }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Schedule `filter` on tile (x, y) for `phase`, after anything already
    /// there.
    pub fn assign(
        &mut self,
        x: usize,
        y: usize,
        phase: Phase,
        filter: ScheduledFilter,
    ) -> Result<(), LayoutError> {
        if x >= self.width || y >= self.height {
            return Err(LayoutError::OutOfGrid {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        self.tiles[y * self.width + x].phases[phase.index()].push(filter);
        Ok(())
    }
}

// ── Graph input ─────────────────────────────────────────────────────────────

/// A reachable filter with literal rates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilter {
    pub node: NodeId,
    pub name: String,
    pub pop: i64,
    pub peek: i64,
    pub push: i64,
}

/// Reachable filters in pre-order. Fails on the first rate that is not an
/// integer literal.
pub fn resolved_filters(graph: &StreamGraph) -> Result<Vec<ResolvedFilter>, LayoutError> {
    let mut out = Vec::new();
    for id in graph.reachable() {
        let node = graph.node(id);
        let NodeKind::Filter { rates } = &node.kind else {
            continue;
        };
        let literal = |field: FieldRef, expr: &Expr| {
            expr.as_literal()
                .and_then(|lit| lit.as_int())
                .ok_or_else(|| LayoutError::SymbolicRate {
                    node: id,
                    name: node.name.clone(),
                    field,
                })
        };
        out.push(ResolvedFilter {
            node: id,
            name: format!("{}_{}", node.name, id.0),
            pop: literal(FieldRef::Pop, &rates.pop)?,
            peek: literal(FieldRef::Peek, &rates.peek)?,
            push: literal(FieldRef::Push, &rates.push)?,
        });
    }
    Ok(out)
}

// ── Exporter ────────────────────────────────────────────────────────────────

/// Emit the layout as a DOT graph of tiles.
pub fn emit_layout_dot(grid: &TileGrid) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph LayoutDotGraph {{").unwrap();
    writeln!(buf, "size = \"8, 10.5\";").unwrap();
    writeln!(buf, "node [shape=box];").unwrap();
    writeln!(buf, "nodesep=.5;\nranksep=\"2.0 equally\";").unwrap();

    for y in 0..grid.height {
        writeln!(buf, "{{rank = same;").unwrap();
        for x in 0..grid.width {
            writeln!(buf, "tile{};", grid.tiles[y * grid.width + x].number).unwrap();
        }
        writeln!(buf, "}}").unwrap();
    }

    // Column-major, as the rank groups already fix the rows.
    for x in 0..grid.width {
        for y in 0..grid.height {
            let tile = &grid.tiles[y * grid.width + x];
            write!(
                buf,
                "tile{}[ label = \"TILE {}({}, {})\\n",
                tile.number, tile.number, tile.x, tile.y
            )
            .unwrap();
            for phase in Phase::ALL {
                write!(buf, "{}:\\n", phase.label()).unwrap();
                for f in tile.filters(phase) {
                    write!(buf, "{}({})\\n", f.name, f.mult).unwrap();
                }
            }
            writeln!(buf, "\"];").unwrap();
            for n in &tile.neighbors {
                writeln!(buf, "tile{} -> tile{};", tile.number, n).unwrap();
            }
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::const_prop::{propagate_and_unroll, ConstPropConfig};
    use crate::elaborate::elaborate;
    use crate::parser;

    fn filter(node: u32, name: &str, mult: u64) -> ScheduledFilter {
        ScheduledFilter {
            node: NodeId(node),
            name: name.to_string(),
            mult,
        }
    }

    #[test]
    fn mesh_neighbors() {
        let grid = TileGrid::mesh(3, 2);
        assert_eq!(grid.tiles().len(), 6);
        assert_eq!(grid.tile(0, 0).unwrap().neighbors, vec![1, 3]);
        assert_eq!(grid.tile(1, 1).unwrap().neighbors, vec![1, 5, 3]);
        assert_eq!(grid.tile(2, 0).unwrap().neighbors, vec![5, 1]);
        assert!(grid.tile(3, 0).is_none());
    }

    #[test]
    fn assignment_outside_grid_fails() {
        let mut grid = TileGrid::mesh(2, 2);
        let err = grid.assign(2, 0, Phase::Steady, filter(0, "F", 1)).unwrap_err();
        assert_eq!(err.to_string(), "tile (2, 0) is outside the 2x2 grid");
    }

    #[test]
    fn exporter_matches_expected_text() {
        let mut grid = TileGrid::mesh(2, 1);
        grid.assign(0, 0, Phase::Init, filter(1, "Source_1", 1)).unwrap();
        grid.assign(0, 0, Phase::Steady, filter(1, "Source_1", 4)).unwrap();
        grid.assign(1, 0, Phase::PrimePump, filter(2, "Sink_2", 2)).unwrap();
        grid.assign(1, 0, Phase::Steady, filter(2, "Sink_2", 4)).unwrap();

        let expected = concat!(
            "digraph LayoutDotGraph {\n",
            "size = \"8, 10.5\";\n",
            "node [shape=box];\n",
            "nodesep=.5;\n",
            "ranksep=\"2.0 equally\";\n",
            "{rank = same;\n",
            "tile0;\n",
            "tile1;\n",
            "}\n",
            "tile0[ label = \"TILE 0(0, 0)\\nInit:\\nSource_1(1)\\nPrime Pump:\\nSteady:\\nSource_1(4)\\n\"];\n",
            "tile0 -> tile1;\n",
            "tile1[ label = \"TILE 1(1, 0)\\nInit:\\nPrime Pump:\\nSink_2(2)\\nSteady:\\nSink_2(4)\\n\"];\n",
            "tile1 -> tile0;\n",
            "}\n",
        );
        assert_eq!(emit_layout_dot(&grid), expected);
    }

    #[test]
    fn filters_of_propagated_graph_are_literal() {
        let parsed = parser::parse(
            "filter A(int k) { work pop k push 1 { push(pop()); } }
             pipeline P() { init { for (int i = 1; i <= 2; i++) add A(i); } }",
        );
        let mut g = elaborate(&parsed.program.unwrap(), None).graph;
        let err = resolved_filters(&g).unwrap_err();
        assert!(matches!(err, LayoutError::SymbolicRate { field: FieldRef::Pop, .. }));

        propagate_and_unroll(&mut g, &ConstPropConfig::default());
        let filters = resolved_filters(&g).unwrap();
        let pops: Vec<i64> = filters.iter().map(|f| f.pop).collect();
        assert_eq!(pops, vec![1, 2]);
        assert_eq!(filters[0].name, "A_1");
    }
}
