/// Content Linter — validates authored events before they ship.
///
/// Usage: content_linter <content_path> [--config <path>] [--state-actions]
///
/// `--state-actions` checks calls against the built-in state module
/// (flags, counters, messages). `--config` additionally checks labels
/// against the configured vocabulary.

use std::path::Path;
use std::process;

use text_event_toolkit::core::config::ToolkitConfig;
use text_event_toolkit::core::content::ContentLibrary;
use text_event_toolkit::core::registry::ActionRegistry;
use text_event_toolkit::core::state::StateModule;
use text_event_toolkit::core::validate::{self, Severity};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: content_linter <content_path> [--config <path>] [--state-actions]");
        process::exit(0);
    }

    let content_path = &args[1];
    let mut config_path = None;
    let mut state_actions = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--state-actions" => state_actions = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(2);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(ref path) => match ToolkitConfig::load_from_ron(Path::new(path)) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => None,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                config
                    .as_ref()
                    .map(|c| c.logging)
                    .unwrap_or_default()
                    .level_filter()
                    .into(),
            ),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = Path::new(content_path);
    if !path.exists() {
        eprintln!("ERROR: Path '{}' does not exist", content_path);
        process::exit(1);
    }
    let library = match ContentLibrary::load_from_ron(path) {
        Ok(library) => library,
        Err(e) => {
            eprintln!("ERROR: Failed to load content: {}", e);
            process::exit(1);
        }
    };
    println!("Loaded {} events", library.len());

    let registry = if state_actions {
        match ActionRegistry::scan(&[&StateModule::new()], None, None) {
            Ok(registry) => Some(registry),
            Err(e) => {
                eprintln!("ERROR: Failed to build registry: {}", e);
                process::exit(1);
            }
        }
    } else {
        None
    };

    let diagnostics = validate::validate_library(&library, registry.as_ref());
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    for d in &diagnostics {
        match d.severity {
            Severity::Error => errors.push(d.to_string()),
            Severity::Warning => warnings.push(d.to_string()),
        }
    }

    if let Some(ref config) = config {
        for def in library.events() {
            for label in &def.labels {
                if !config.labels.contains(label) {
                    warnings.push(format!(
                        "warning: event {}: label '{}' is not in the configured vocabulary",
                        def.id, label
                    ));
                }
            }
        }
    }

    let unlabeled = library.events().iter().filter(|d| d.labels.is_empty()).count();
    if unlabeled > 0 {
        warnings.push(format!(
            "warning: {} event(s) have no labels and are only reachable by unfiltered draws",
            unlabeled
        ));
    }

    println!("\n=== Content Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("{}", warning);
    }

    for error in &errors {
        println!("{}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}
