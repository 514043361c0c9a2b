/// Preview — interactive terminal player for authored events.
///
/// Usage: preview <content_path> [--config <path>] [--seed <n>]
///
/// Content is played against the built-in state module, so flags and
/// counters set by actions persist for the whole session.
///
/// Commands:
///   random [label ...]   — draw a random event (any of the labels)
///   play <id>            — start a specific event, ignoring bans
///   <n>                  — take choice n of the running event
///   (empty line)         — acknowledge the outcome being shown
///   list                 — list event titles (add 'all' for debug events)
///   flag <name> [on|off] — show or set a flag
///   counter <name> [n]   — show or set a counter
///   reset                — end running events and clear bans
///   help                 — list commands
///   quit                 — exit

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::rc::Rc;

use text_event_toolkit::core::config::ToolkitConfig;
use text_event_toolkit::core::content::ContentLibrary;
use text_event_toolkit::core::event::TextEvent;
use text_event_toolkit::core::playthrough::{Playthrough, Stage, Step};
use text_event_toolkit::core::registry::ActionRegistry;
use text_event_toolkit::core::state::StateModule;
use text_event_toolkit::core::toolkit::TextEventToolkit;
use text_event_toolkit::schema::event::EventId;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let content_path = args[1].clone();
    let mut config_path = None;
    let mut seed: u64 = 42;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(ref path) => match ToolkitConfig::load_from_ron(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => ToolkitConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.logging.level_filter().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let library = match ContentLibrary::load_from_ron(Path::new(&content_path)) {
        Ok(library) => library,
        Err(e) => {
            eprintln!("ERROR: Failed to load content: {}", e);
            std::process::exit(1);
        }
    };

    let state = StateModule::new();
    let registry = match ActionRegistry::scan(
        &[&state],
        config.action_module.as_deref(),
        config.predicate_module.as_deref(),
    ) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("ERROR: Failed to build registry: {}", e);
            std::process::exit(1);
        }
    };

    let mut toolkit = match TextEventToolkit::builder()
        .seed(seed)
        .with_library(library)
        .with_registry(registry)
        .with_config(config)
        .build()
    {
        Ok(toolkit) => toolkit,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} events", toolkit.library().len());
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let mut play: Option<Playthrough> = None;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();

        if line.is_empty() {
            if let Some(ref mut p) = play {
                if p.stage() == Stage::ShowingOutcome {
                    p.acknowledge();
                    show(p, &state);
                }
            }
            continue;
        }

        if let Ok(index) = line.parse::<usize>() {
            match play {
                Some(ref mut p) => {
                    take_choice(p, index, &state);
                    if p.is_finished() {
                        println!("(event over)\n");
                        play = None;
                    }
                }
                None => println!("No event is running. Try 'random' or 'play <id>'."),
            }
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => {
                print_help();
            }
            "random" => {
                let event = if parts.len() > 1 {
                    toolkit.create_random_with_label(&parts[1..])
                } else {
                    toolkit.create_random()
                };
                match event {
                    Some(event) => play = Some(start(event, &state)),
                    None => println!("Nothing to draw (see the log for why)."),
                }
            }
            "play" => {
                let Some(id) = parts.get(1).and_then(|s| s.parse::<u32>().ok()) else {
                    println!("Usage: play <id>");
                    continue;
                };
                match toolkit.create_from_id(EventId(id)) {
                    Some(event) => play = Some(start(event, &state)),
                    None => println!("Event {} could not be started.", id),
                }
            }
            "list" => {
                let include_debug = parts.get(1) == Some(&"all");
                for title in toolkit.library().titles_with_ids(include_debug) {
                    println!("  {}", title);
                }
                if !toolkit.banned().is_empty() {
                    let mut banned: Vec<u32> = toolkit.banned().iter().map(|id| id.0).collect();
                    banned.sort_unstable();
                    println!("  banned: {:?}", banned);
                }
            }
            "flag" => match parts.len() {
                2 => println!("{} = {}", parts[1], state.flag(parts[1])),
                3 => {
                    state.set_flag(parts[1], matches!(parts[2], "on" | "true" | "1"));
                    println!("{} = {}", parts[1], state.flag(parts[1]));
                }
                _ => println!("Usage: flag <name> [on|off]"),
            },
            "counter" => match parts.len() {
                2 => println!("{} = {}", parts[1], state.counter(parts[1])),
                3 => match parts[2].parse::<i64>() {
                    Ok(value) => {
                        state.set_counter(parts[1], value);
                        println!("{} = {}", parts[1], value);
                    }
                    Err(_) => println!("Not a number: {}", parts[2]),
                },
                _ => println!("Usage: counter <name> [value]"),
            },
            "reset" => {
                toolkit.reset();
                play = None;
                println!("Session reset.");
            }
            _ => {
                println!("Unknown command: {}. Type 'help' for commands.", cmd);
            }
        }
    }
}

fn start(event: Rc<TextEvent>, state: &StateModule) -> Playthrough {
    println!("\n=== {} ===", event.title());
    if !event.body().is_empty() {
        println!("{}", event.body());
    }
    let play = Playthrough::start(event);
    print_messages(state);
    show(&play, state);
    play
}

fn take_choice(play: &mut Playthrough, index: usize, state: &StateModule) {
    if index == 0 {
        println!("Choices are numbered from 1.");
        return;
    }
    match play.choose(index - 1) {
        Step::Outcome { outcome, post_text } => {
            print_messages(state);
            println!("\n{}", outcome.text());
            if let Some(post) = post_text {
                println!("{}", post);
            }
            println!("[{}]", outcome.acknowledgment_text());
        }
        Step::Ended => print_messages(state),
        Step::Ignored => println!("No such choice."),
    }
}

fn show(play: &Playthrough, state: &StateModule) {
    print_messages(state);
    for (n, choice) in play.offered_choices().iter().enumerate() {
        if choice.hover_text().is_empty() {
            println!("  {}. {}", n + 1, choice.text());
        } else {
            println!("  {}. {} ({})", n + 1, choice.text(), choice.hover_text());
        }
    }
}

fn print_messages(state: &StateModule) {
    for message in state.take_messages() {
        println!("  * {}", message);
    }
}

fn print_usage() {
    println!("Usage: preview <content_path> [--config <path>] [--seed <n>]");
}

fn print_help() {
    println!("Commands:");
    println!("  random [label ...]    Draw a random event (any of the labels)");
    println!("  play <id>             Start a specific event, ignoring bans");
    println!("  <n>                   Take choice n of the running event");
    println!("  (empty line)          Acknowledge the outcome being shown");
    println!("  list [all]            List event titles");
    println!("  flag <name> [on|off]  Show or set a flag");
    println!("  counter <name> [n]    Show or set a counter");
    println!("  reset                 End running events and clear bans");
    println!("  help                  Show this help");
    println!("  quit                  Exit");
}
