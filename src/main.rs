use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use mdpress::diagram::{BuiltinDiagramEngine, DiagramStyle};
use mdpress::fonts::CosmicTextMeasure;
use mdpress::postprocess::{DiagramPostProcessor, DiagramSession};
use mdpress::{Pipeline, RendererOptions, Template};

/// Markdown to inline-styled HTML for article editors
#[derive(Parser, Debug)]
#[command(name = "mdpress")]
#[command(version)]
#[command(about = "Render Markdown to inline-styled HTML with math, diagrams and templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a markdown file to HTML
    Render(RenderArgs),
    /// List the built-in templates
    Templates,
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Input markdown file (use "-" for stdin)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Renderer options file (.toml, .yaml, .yml or .json)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Built-in template name or path to a template .toml file
    #[arg(short, long, value_name = "TEMPLATE")]
    template: Option<String>,

    /// Syntax highlighting theme for code blocks
    #[arg(long, value_name = "NAME")]
    code_theme: Option<String>,

    /// Render Mermaid placeholders to inline SVG
    #[arg(long)]
    diagrams: bool,

    /// Wrap the fragment in a complete HTML document
    #[arg(long)]
    standalone: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), String> {
    let cli = Cli::parse();

    match cli.command {
        Command::Render(args) => {
            init_logging(args.verbose);
            render(args)
        }
        Command::Templates => {
            init_logging(false);
            list_templates()
        }
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "mdpress", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("MDPRESS_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_input(input: &Path) -> Result<String, String> {
    if input.to_str() == Some("-") {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
            .map_err(|e| format!("Failed to read from stdin: {}", e))?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input).map_err(|e| format!("Failed to read input file: {}", e))
    }
}

fn load_template(name: &str) -> Result<Template, String> {
    let path = Path::new(name);
    let is_file = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_file {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read template file: {}", e))?;
        Template::from_toml_str(&content).map_err(|e| e.to_string())
    } else {
        Template::from_builtin(name).map_err(|e| e.to_string())
    }
}

fn render(args: RenderArgs) -> Result<(), String> {
    let markdown = read_input(&args.input)?;

    let mut options = match &args.config {
        Some(path) => RendererOptions::load(path).map_err(|e| e.to_string())?,
        None => RendererOptions::default(),
    };
    if let Some(theme) = args.code_theme {
        options.code_theme = Some(theme);
    }

    let pipeline = Pipeline::default();
    let (mut html, base) = match args.template.as_deref() {
        Some(name) => {
            let template = load_template(name)?;
            tracing::debug!(template = %template.id, "rendering with template");
            let base = template.options.base.overlay(&options.base);
            (pipeline.render_template(&markdown, &template, &options), base)
        }
        None => (pipeline.render(&markdown, &options), options.base.clone()),
    };

    if args.diagrams {
        let engine = BuiltinDiagramEngine::with_measure(CosmicTextMeasure::new())
            .with_style(DiagramStyle::from_base(&base));
        let processor = DiagramPostProcessor::new(engine);
        let session = DiagramSession::new();
        html = futures::executor::block_on(processor.process(&session, &html))
            .map_err(|e| e.to_string())?;
    }

    if args.standalone {
        html = standalone_document(&html);
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, html).map_err(|e| format!("Failed to write HTML: {}", e))?;
            eprintln!("HTML saved to: {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(html.as_bytes())
                .and_then(|_| stdout.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))?;
        }
    }
    Ok(())
}

fn standalone_document(fragment: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         </head>\n<body>\n{}\n</body>\n</html>\n",
        fragment
    )
}

fn list_templates() -> Result<(), String> {
    let templates = Template::builtins().map_err(|e| e.to_string())?;
    for template in templates {
        println!("{:<15} {}: {}", template.id, template.name, template.description);
    }
    Ok(())
}
