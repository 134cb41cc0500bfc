//! PERSONA MIND - Chat Entry Point
//!
//! Ask a persona one question (`--prompt`) or talk to several in an
//! interactive loop, adding new personas from the encyclopedia on the fly.

use anyhow::Result;
use clap::Parser;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use persona_mind::demiurge::{normalize_traits, AnswererState, PersonaHandle, PersonaRegistry};
use persona_mind::initiation::{self, SystemConfig, DEFAULT_CONFIG_PATH};
use persona_mind::totems::ConversationLog;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with historical and fictional personas", long_about = None)]
struct Args {
    /// Path to system.toml (created with defaults if missing)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// List personas and whether their index is ready
    #[arg(long)]
    list: bool,

    /// Persona to talk to (defaults to the first one)
    #[arg(long)]
    persona: Option<String>,

    /// Question to ask
    #[arg(long)]
    prompt: Option<String>,

    /// Interactive mode - keep running for multiple questions
    #[arg(long)]
    interactive: bool,

    /// Override the indexes directory
    #[arg(long)]
    indexes: Option<PathBuf>,

    /// Override the personas directory
    #[arg(long)]
    personas_dir: Option<PathBuf>,

    /// Run local models on CPU rather than on GPU.
    #[arg(long)]
    cpu: bool,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,

    /// Enable tracing (generates a trace-timestamp.json file).
    #[arg(long)]
    tracing: bool,
}

fn state_label(state: &AnswererState) -> &'static str {
    match state {
        AnswererState::Ready => "✅ ready",
        AnswererState::Uninitialized => "⏳ not indexed",
        AnswererState::Unavailable(_) => "⚠️ no index",
    }
}

fn print_personas(registry: &PersonaRegistry) {
    println!("\n🎭 Personas:");
    for name in registry.persona_names() {
        if let Some(handle) = registry.handle(&name) {
            let kind = if handle.is_dynamic() { " (dynamic)" } else { "" };
            println!(
                "  {} {}{} - {}",
                handle.emoji(),
                handle.name(),
                kind,
                state_label(&handle.state())
            );
            if !handle.description().is_empty() {
                println!("      {}", handle.description());
            }
        }
    }
}

fn ask_and_print(handle: &PersonaHandle, question: &str, log: &mut ConversationLog) {
    println!("\n🤔 Thinking...");
    let answer = handle.ask(question);
    println!("\n{} {}: {}", handle.emoji(), handle.name(), answer);
    log.record_exchange(question, &answer);
}

/// `/add name | description | trait; trait`
fn parse_add_command(rest: &str) -> Option<(String, String, Vec<String>)> {
    let mut parts = rest.splitn(3, '|').map(str::trim);
    let name = parts.next().filter(|n| !n.is_empty())?.to_string();
    let description = parts.next().unwrap_or_default().to_string();
    let traits = normalize_traits(&parts.next().unwrap_or_default().replace(';', "\n"));
    Some((name, description, traits))
}

fn interactive(registry: &PersonaRegistry, mut current: PersonaHandle, initial: Option<&str>) -> Result<()> {
    let mut logs: HashMap<String, ConversationLog> = HashMap::new();

    println!("\n🗣️ Interactive mode - type 'quit' to exit");
    println!("Commands: /personas, /switch <name>, /add <name> | <description> | <trait; trait>, /clear");
    println!("========================================");
    println!("{} Talking to {}", current.emoji(), current.name());

    if let Some(question) = initial {
        let log = logs
            .entry(current.name().to_string())
            .or_insert_with(|| ConversationLog::new(current.name()));
        ask_and_print(&current, question, log);
    }

    loop {
        print!("\n📝 You: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }

        if input == "/personas" {
            print_personas(registry);
            continue;
        }

        if let Some(name) = input.strip_prefix("/switch ") {
            match registry.handle(name.trim()) {
                Some(handle) => {
                    current = handle;
                    println!("{} Now talking to {}", current.emoji(), current.name());
                }
                None => println!("❓ Unknown persona: {}", name.trim()),
            }
            continue;
        }

        if let Some(rest) = input.strip_prefix("/add ") {
            let Some((name, description, traits)) = parse_add_command(rest) else {
                println!("Usage: /add <name> | <description> | <trait; trait>");
                continue;
            };
            println!("📖 Searching the encyclopedia for {name}...");
            let outcome = registry.register_dynamic_persona(&name, &description, &traits);
            if outcome.success {
                println!("✅ {}", outcome.message);
                if let Some(handle) = registry.handle(&name) {
                    current = handle;
                    logs.remove(&name);
                    println!("{} Now talking to {}", current.emoji(), current.name());
                }
            } else {
                println!("❌ {}", outcome.message);
            }
            continue;
        }

        if input == "/clear" {
            if let Some(log) = logs.get_mut(current.name()) {
                log.clear();
            }
            println!("🧹 Conversation with {} cleared", current.name());
            continue;
        }

        let log = logs
            .entry(current.name().to_string())
            .or_insert_with(|| ConversationLog::new(current.name()));
        ask_and_print(&current, input, log);
    }

    println!("👋 Goodbye!");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = initiation::init_logging(args.verbose, args.tracing);

    ctrlc::set_handler(|| {
        println!("\n👋 Goodbye!");
        std::process::exit(0);
    })?;

    println!("🏛️ PERSONA MIND - Initializing...");

    let mut config = SystemConfig::load(&args.config)?;
    if let Some(indexes) = args.indexes {
        config.paths.indexes_root = indexes;
    }
    if let Some(dir) = args.personas_dir {
        config.paths.personas_dir = Some(dir);
    }
    if args.cpu {
        config.embedding.force_cpu = true;
        config.generation.force_cpu = true;
    }

    let embedder = initiation::build_embedder(&config)?;
    let generator = initiation::build_generator(&config)?;
    let reference = initiation::build_reference_source(&config)?;
    let registry = initiation::build_registry(&config, embedder, generator, reference)?;

    if args.list {
        print_personas(&registry);
        return Ok(());
    }

    let persona_name = match args.persona {
        Some(name) => name,
        None => registry
            .persona_names()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no personas configured"))?,
    };
    let Some(handle) = registry.handle(&persona_name) else {
        anyhow::bail!(
            "unknown persona '{persona_name}', available: {}",
            registry.persona_names().join(", ")
        );
    };

    if let AnswererState::Unavailable(reason) = handle.state() {
        println!("⚠️ {} has no usable index ({reason})", handle.name());
        println!("   Run persona-indexer to build it.");
    }

    if args.interactive {
        return interactive(&registry, handle, args.prompt.as_deref());
    }

    let Some(prompt) = args.prompt else {
        eprintln!("Error: --prompt is required (or use --interactive / --list)");
        std::process::exit(1);
    };

    let mut log = ConversationLog::new(handle.name());
    ask_and_print(&handle, &prompt, &mut log);
    Ok(())
}
