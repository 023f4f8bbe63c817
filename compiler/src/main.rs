use clap::Parser;
use std::path::{Path, PathBuf};

use sgc::const_prop::{ConstPropConfig, RecursionStrategy};
use sgc::diag::line_col;
use sgc::pass::PassId;
use sgc::pipeline::{compute_provenance, run_pipeline, CompilationState, PipelineOptions};

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// Propagated graph as annotated source
    Graph,
    /// Graphviz DOT
    Dot,
    /// Graph as JSON
    Json,
    /// Provenance metadata
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "sgc",
    version,
    about = "Stream Graph Compiler — constant propagation and loop unrolling for .str stream programs"
)]
struct Cli {
    /// Input .str source file
    source: PathBuf,

    /// Output file path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Top-level stream (default: the last stream nothing instantiates)
    #[arg(long)]
    top: Option<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Graph)]
    emit: EmitStage,

    /// Pass configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How composites recurse into their children
    #[arg(long, value_enum)]
    strategy: Option<RecursionStrategy>,

    /// Largest loop trip count that is unrolled
    #[arg(long)]
    unroll_limit: Option<usize>,

    /// Skip constant propagation and unrolling
    #[arg(long)]
    no_const_prop: bool,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn load_config(path: &Path) -> Result<ConstPropConfig, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("sgc: source = {}", cli.source.display());
        eprintln!("sgc: emit   = {:?}", cli.emit);
    }

    // ── Configuration ──
    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("sgc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => ConstPropConfig::default(),
    };
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(limit) = cli.unroll_limit {
        config.unroll_limit = limit;
    }
    config.verbose |= cli.verbose;
    let options = PipelineOptions {
        top: cli.top.clone(),
        config,
        skip_const_prop: cli.no_const_prop,
    };

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("sgc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    if let EmitStage::BuildInfo = cli.emit {
        write_output(cli.output.as_deref(), &compute_provenance(&source, &options).to_json());
        return;
    }

    // ── Parse ──
    let parse_result = sgc::parser::parse(&source);
    if !parse_result.errors.is_empty() {
        for err in &parse_result.errors {
            let (line, col) = line_col(&source, err.span().start);
            eprintln!("sgc: {}:{}:{}: parse error: {}", cli.source.display(), line, col, err);
        }
        std::process::exit(1);
    }
    let Some(program) = parse_result.program else {
        eprintln!("sgc: parse failed with no output");
        std::process::exit(1);
    };
    if cli.verbose {
        eprintln!("sgc: parsed {} stream declarations", program.decls.len());
    }

    // ── Passes ──
    let mut state = CompilationState::new(program);
    state.provenance = Some(compute_provenance(&source, &options));
    let path = cli.source.display().to_string();
    let result = run_pipeline(&mut state, PassId::Verify, &options, |_, diags| {
        for diag in diags {
            eprintln!("sgc: {}", diag.render(&source, &path));
        }
    });
    if let Err(e) = result {
        if cli.verbose {
            eprintln!("sgc: {} failed", e.failing_pass);
        }
        std::process::exit(1);
    }
    let Some(graph) = state.graph.as_ref() else {
        eprintln!("sgc: no stream graph produced");
        std::process::exit(1);
    };

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::Graph => sgc::print::print_graph(graph),
        EmitStage::Dot => sgc::dot::emit_dot(graph),
        EmitStage::Json => match serde_json::to_string_pretty(graph) {
            Ok(json) => json + "\n",
            Err(e) => {
                eprintln!("sgc: error: {}", e);
                std::process::exit(2);
            }
        },
        EmitStage::BuildInfo => unreachable!("handled before parsing"),
    };
    write_output(cli.output.as_deref(), &text);
}

fn write_output(path: Option<&Path>, text: &str) {
    match path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("sgc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
        None => print!("{}", text),
    }
}
