use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use funding_template_tree::tree::{get_all_calculations, roots};
use funding_template_tree::{
    Document, EditorConfig, SqliteTemplateStorage, TemplateContent, TemplateStorage,
};

const USAGE: &str = "Usage:
  template-tree inspect <template.json>
  template-tree roundtrip <template.json>
  template-tree calculations <template.json> [--all]
  template-tree save <template.json> <template-id>
  template-tree load <template-id> [version]

Options:
  --config <cfg.json>   editor configuration (suffixes, database, author, log filter)";

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = match take_option(&mut args, "--config")? {
        Some(path) => EditorConfig::from_file(path)?,
        None => EditorConfig::default(),
    };

    init_logging(&config);

    let command = args.first().map(String::as_str);
    let rest = args.get(1..).unwrap_or_default();
    match (command, rest) {
        (Some("inspect"), [path]) => run_inspect(Path::new(path), &config),
        (Some("roundtrip"), [path]) => run_roundtrip(Path::new(path), &config),
        (Some("calculations"), [path, rest @ ..]) => {
            let include_clones = rest.iter().any(|a| a == "--all");
            run_calculations(Path::new(path), include_clones, &config)
        }
        (Some("save"), [path, template_id]) => run_save(Path::new(path), template_id, &config),
        (Some("load"), [template_id]) => run_load(template_id, None, &config),
        (Some("load"), [template_id, version]) => {
            let version = version
                .parse::<u32>()
                .with_context(|| format!("Invalid version: {}", version))?;
            run_load(template_id, Some(version), &config)
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn init_logging(config: &EditorConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Remove `name <value>` from the argument list
fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(anyhow!("{} needs a value", name));
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn read_template(path: &Path) -> Result<TemplateContent> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file: {:?}", path))?;
    TemplateContent::from_json(&json).context("Failed to parse template JSON")
}

fn load_document(path: &Path, config: &EditorConfig) -> Result<(TemplateContent, Document)> {
    let content = read_template(path)?;
    let mut suffixes = config.suffix_source();
    let document = Document::from_template(&content, suffixes.as_mut())?;
    Ok((content, document))
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_inspect(path: &Path, config: &EditorConfig) -> Result<()> {
    let (_, document) = load_document(path, config)?;

    println!("🌳 Template: {:?}", path);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Entries:          {}", document.entries().len());
    println!("Nodes:            {}", document.node_count());
    println!("Next template id: {}", document.next_template_id());

    println!("\n📂 Entries");
    for entry in document.entries() {
        println!(
            "  [{}] {} ({}) - {} nodes",
            entry.key,
            entry.root.id,
            entry.root.name(),
            entry.root.count()
        );
    }

    let cloned: Vec<_> = document
        .index()
        .families()
        .filter(|(_, members)| members.len() > 1)
        .collect();

    println!("\n🔗 Clone families: {}", cloned.len());
    for (stem, members) in cloned {
        let ids: Vec<&str> = members.iter().map(|m| m.as_str()).collect();
        println!("  {} → {}", stem, ids.join(", "));
    }

    Ok(())
}

fn run_roundtrip(path: &Path, config: &EditorConfig) -> Result<()> {
    let (content, document) = load_document(path, config)?;
    let back = document.to_template();

    if back.funding_lines == content.funding_lines {
        println!("✅ Round trip OK: {} funding lines", content.funding_lines.len());
        Ok(())
    } else {
        eprintln!("❌ Round trip mismatch for {:?}", path);
        std::process::exit(1);
    }
}

fn run_calculations(path: &Path, include_clones: bool, config: &EditorConfig) -> Result<()> {
    let (_, document) = load_document(path, config)?;

    let mut wtr = csv::Writer::from_writer(io::stdout());
    for summary in get_all_calculations(roots(document.entries()), include_clones) {
        wtr.serialize(summary)?;
    }
    wtr.flush()?;

    Ok(())
}

fn run_save(path: &Path, template_id: &str, config: &EditorConfig) -> Result<()> {
    let (content, _) = load_document(path, config)?;
    let mut storage = SqliteTemplateStorage::open(config.database_path())?;

    let info = storage.save(template_id, &content, &config.author)?;
    println!(
        "💾 Saved {} version {} ({})",
        info.template_id, info.version, info.content_hash
    );

    Ok(())
}

fn run_load(template_id: &str, version: Option<u32>, config: &EditorConfig) -> Result<()> {
    let storage = SqliteTemplateStorage::open(config.database_path())?;
    let content = storage.load(template_id, version)?;

    // Reject stored content the editor could not open
    let mut suffixes = config.suffix_source();
    Document::from_template(&content, suffixes.as_mut())?;

    println!("{}", content.to_json_pretty()?);
    Ok(())
}
