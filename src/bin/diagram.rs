use clap::Parser;
use std::path::PathBuf;

use mdpress::diagram::BuiltinDiagramEngine;
use mdpress::extension::normalize_diagram;
use mdpress::fonts::CosmicTextMeasure;

/// Standalone diagram renderer
#[derive(Parser, Debug)]
#[command(name = "mdpress-diagram")]
#[command(version)]
#[command(about = "Render a Mermaid pie chart or flowchart to SVG", long_about = None)]
struct Args {
    /// Input .mmd file (use "-" for stdin)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output SVG file path
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Padding around the diagram in pixels
    #[arg(long, default_value_t = 20.0)]
    padding: f32,
}

fn main() -> Result<(), String> {
    let args = Args::parse();

    if !args.padding.is_finite() || args.padding < 0.0 {
        return Err(format!("Invalid --padding value: {}", args.padding));
    }

    let source = if args.input.to_str() == Some("-") {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
            .map_err(|e| format!("Failed to read from stdin: {}", e))?;
        buffer
    } else {
        std::fs::read_to_string(&args.input)
            .map_err(|e| format!("Failed to read input file: {}", e))?
    };

    let source = normalize_diagram(&source);
    if source.is_empty() {
        return Err("Input contains no diagram".to_string());
    }

    let engine =
        BuiltinDiagramEngine::with_measure(CosmicTextMeasure::new()).with_padding(args.padding);
    let svg = engine
        .render_sync("diagram", &source)
        .map_err(|e| format!("Failed to render diagram: {}", e))?;

    std::fs::write(&args.output, svg).map_err(|e| format!("Failed to write SVG: {}", e))?;
    eprintln!("SVG saved to: {}", args.output.display());
    Ok(())
}
