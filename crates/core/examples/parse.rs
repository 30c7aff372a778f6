use std::{fs, path::PathBuf};

use clap::Parser;
use restyle::{NodeData, NodeId, ParseOptions, Root};

#[derive(Parser, Debug)]
#[command(name = "parse")]
#[command(about = "Parse a stylesheet and print its tree", long_about = None)]
struct Args {
    /// Path to the stylesheet to parse
    input: PathBuf,

    /// Print the serialized JSON form instead of the default dump format
    #[arg(long, short)]
    json: bool,

    /// Log parser and source map events to stderr
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(std::io::stderr)
            .init();
    }

    let source = fs::read_to_string(&args.input)?;
    let opts = ParseOptions {
        from: Some(args.input.display().to_string()),
        ..ParseOptions::default()
    };
    let root = restyle::parse(&source, &opts)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&root.to_json()?)?);
    } else {
        dump_tree(&root, root.id(), 0);
    }

    Ok(())
}

fn dump_tree(root: &Root, id: NodeId, depth: usize) {
    let indent = "  ".repeat(depth);
    let Some(node) = root.get(id) else {
        return;
    };

    let range = node
        .source
        .as_ref()
        .and_then(|s| Some((s.start?, s.end?)))
        .map(|(start, end)| {
            format!(
                " [{}..{}] ({}:{})..({}:{})",
                start.offset, end.offset, start.line, start.column, end.line, end.column
            )
        })
        .unwrap_or_default();

    let label = match node.data() {
        NodeData::Root => String::new(),
        NodeData::Rule { selector } => format!(" {selector:?}"),
        NodeData::AtRule { name, params } => format!(" @{name} {params:?}"),
        NodeData::Decl {
            prop,
            value,
            important,
        } => {
            let important = if *important { " !important" } else { "" };
            format!(" {prop}: {}{important}", truncate(value, 80))
        }
        NodeData::Comment { text } => format!(" {:?}", truncate(text, 80)),
    };

    println!("{indent}{kind}{label}{range}", kind = node.kind());

    for &child in node.children() {
        dump_tree(root, child, depth + 1);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.replace('\n', "\\n");
    }

    // Try to truncate on a UTF-8 boundary.
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", s[..end].replace('\n', "\\n"))
}
