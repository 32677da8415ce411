//! A signup form bound to a reactive model, with live validation
//!
//! Run with `RUST_LOG=attrmodel=debug` to see materialization and routing.

use attrmodel::{Model, ModelResult, Validations};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> ModelResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== Signup Form ===\n");

    let rules = Validations::from_json(json!({
        "name": { "length": { "minimum": 3, "maximum": 24 } },
        "email": { "presence": true },
    }))?;
    let form = Model::new(json!({ "name": "", "email": "" })).with_validations(rules);

    println!("1. Rendering the form whenever what it shows changes");
    let _render = form.observe({
        let form = form.clone();
        move || {
            let name = form.get("name").as_str().unwrap_or_default().to_string();
            let city = form.get("address").get("city");
            let city = city.as_str().unwrap_or("(none)");
            println!("   [render] name={name:?} city={city}");
        }
    });

    println!("\n2. Showing errors only for touched fields");
    let _errors = form.observe({
        let form = form.clone();
        move || {
            for (field, messages) in form.marked_errors() {
                println!("   [errors] {field}: {}", messages.join(", "));
            }
        }
    });

    println!("\n3. Logging every change on the record");
    let _log = form.on_change(|event| {
        let key = event.key().map(ToString::to_string).unwrap_or_default();
        println!("   [changed] {key} {:?}", event.args());
    });

    println!("\n4. Typing a short name, then touching the field");
    form.set("name", "Al")?;
    form.mark_field("name");

    println!("\n5. Fixing the name");
    form.set("name", "Alan Turing")?;

    println!("\n6. Writing through an address that does not exist yet");
    form.get("address").set("city", "Wilmslow")?;

    println!("\n7. Appending phone numbers to a missing list");
    form.get("phones").append("+44 1625 000000")?;

    println!("\n8. Reading through absent data never fails");
    let missing = form.get("employer").get("department").get("head");
    println!("   is_nil: {}", missing.is_nil());
    if let Err(err) = missing.force() {
        println!("   forced: {err}");
    }

    println!("\n9. Submitting");
    form.mark_field("email");
    println!("   all errors: {:?}", form.errors());
    println!("   payload: {}", form.to_json());

    Ok(())
}
