/// Caravan example — a short journey drawn from the road and town pools.
///
/// Each leg draws a random event, then an automatic traveller picks among
/// the offered choices with a seeded rng. Gold and supplies live in the
/// built-in state module, so gated choices such as paying the toll appear
/// or vanish as the journey goes on.
///
/// Run with: cargo run --example caravan

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

use text_event_toolkit::core::config::ToolkitConfig;
use text_event_toolkit::core::content::ContentLibrary;
use text_event_toolkit::core::playthrough::{Playthrough, Step};
use text_event_toolkit::core::registry::ActionRegistry;
use text_event_toolkit::core::state::StateModule;
use text_event_toolkit::core::toolkit::TextEventToolkit;

const LEGS: usize = 8;

fn main() {
    let config = ToolkitConfig::load_from_ron(Path::new("content/toolkit.ron"))
        .expect("Failed to load toolkit config");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.logging.level_filter().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let library = ContentLibrary::load_from_ron(Path::new("content/caravan/events.ron"))
        .expect("Failed to load caravan events");

    let state = StateModule::new();
    state.set_counter("gold", 5);
    state.set_counter("supplies", 3);

    let registry =
        ActionRegistry::scan(&[&state], None, None).expect("Failed to build registry");

    let mut toolkit = TextEventToolkit::builder()
        .seed(1849)
        .with_library(library)
        .with_registry(registry)
        .with_config(config)
        .build()
        .expect("Failed to build toolkit");

    let mut traveller = StdRng::seed_from_u64(7);

    println!("=== The Caravan ===\n");

    for leg in 1..=LEGS {
        // Every third leg ends in a town.
        let event = if leg % 3 == 0 {
            toolkit.create_random_with_label(&["town"])
        } else {
            toolkit.create_random_with_label(&["road"])
        };
        let Some(event) = event else {
            println!("Leg {}: the road is quiet.\n", leg);
            continue;
        };

        println!("Leg {}: {}", leg, event.title());
        println!("  {}", event.body());

        let mut play = Playthrough::start(event);
        report(&state);

        while !play.is_finished() {
            let offered = play.offered_choices();
            if offered.is_empty() {
                play.acknowledge();
                continue;
            }
            let index = traveller.gen_range(0..offered.len());
            println!("  > {}", offered[index].text());

            match play.choose_with(index, &mut traveller) {
                Step::Outcome { outcome, post_text } => {
                    println!("  {}", outcome.text());
                    if let Some(post) = post_text {
                        println!("  {}", post);
                    }
                    report(&state);
                    play.acknowledge();
                }
                Step::Ended => report(&state),
                Step::Ignored => break,
            }
        }

        println!(
            "  [gold {}, supplies {}]\n",
            state.counter("gold"),
            state.counter("supplies")
        );
    }

    println!("Banned after use: {} event(s)", toolkit.banned().len());
    println!("Carrying a lantern: {}", state.flag("has_lantern"));
}

fn report(state: &StateModule) {
    for message in state.take_messages() {
        println!("  * {}", message);
    }
}
