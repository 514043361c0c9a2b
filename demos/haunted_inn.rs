/// Haunted Inn example — one deeply nested event played several nights over.
///
/// Demonstrates how finality travels up from a nested choice, and how the
/// event hub sees every event that is entered. The second event is banned
/// after use, so it only ever shows up once.
///
/// Run with: cargo run --example haunted_inn

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use text_event_toolkit::core::choice::ChoiceSelected;
use text_event_toolkit::core::config::LogVerbosity;
use text_event_toolkit::core::content::ContentLibrary;
use text_event_toolkit::core::event::TextEvent;
use text_event_toolkit::core::playthrough::{Playthrough, Step};
use text_event_toolkit::core::registry::ActionRegistry;
use text_event_toolkit::core::state::StateModule;
use text_event_toolkit::core::toolkit::TextEventToolkit;

const NIGHTS: usize = 4;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(LogVerbosity::default().level_filter().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let library = ContentLibrary::load_from_ron(Path::new("content/haunted_inn/events.ron"))
        .expect("Failed to load inn events");

    let state = StateModule::new();
    let registry =
        ActionRegistry::scan(&[&state], None, None).expect("Failed to build registry");

    let mut toolkit = TextEventToolkit::builder()
        .seed(1313)
        .with_library(library)
        .with_registry(registry)
        .build()
        .expect("Failed to build toolkit");

    let entered = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&entered);
    toolkit
        .hub()
        .on_any_event_entered()
        .subscribe(move |_: &Rc<TextEvent>| counter.set(counter.get() + 1));

    let mut guest = StdRng::seed_from_u64(31);

    println!("=== The Crooked Lantern Inn ===\n");

    for night in 1..=NIGHTS {
        let Some(event) = toolkit.create_random_with_label(&["inn"]) else {
            println!("Night {}: nothing stirs.\n", night);
            continue;
        };
        println!("Night {}: {}", night, event.title());
        println!("  {}", event.body());

        event
            .on_final_choice()
            .subscribe(|reached: &ChoiceSelected| {
                println!("  (the night ends with \"{}\")", reached.choice.text());
            });

        let mut play = Playthrough::start(event);
        while !play.is_finished() {
            let offered = play.offered_choices();
            if offered.is_empty() {
                play.acknowledge();
                continue;
            }
            let index = guest.gen_range(0..offered.len());
            println!("  > {}", offered[index].text());
            match play.choose_with(index, &mut guest) {
                Step::Outcome { outcome, .. } => {
                    println!("  {}", outcome.text());
                    println!("  [{}]", outcome.acknowledgment_text());
                    play.acknowledge();
                }
                Step::Ended => {}
                Step::Ignored => break,
            }
            for message in state.take_messages() {
                println!("  * {}", message);
            }
        }
        println!();
    }

    println!("Events entered: {}", entered.get());
    println!("Slept upstairs: {}", state.flag("slept_upstairs"));
    println!("Fear: {}", state.counter("fear"));
}
