use anyhow::{Context, Result, anyhow, bail};
use gentle_primers::{
    about,
    engine::{Engine, Operation, PrimerEngine, TemplateSource, Workflow},
    options::DesignOptions,
};
use serde::Serialize;
use std::{env, fs};
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!(
        "Usage:\n  \
  gentle_primers_cli --version\n  \
  gentle_primers_cli capabilities\n  \
  gentle_primers_cli op '<operation-json>'\n  \
  gentle_primers_cli workflow '<workflow-json>'\n  \
  gentle_primers_cli design-file PATH ['<options-json>']\n\n  \
  Tip: pass @file.json instead of inline JSON; set RUST_LOG=debug for search details"
    );
}

fn load_json_arg(value: &str) -> Result<String> {
    if let Some(path) = value.strip_prefix('@') {
        fs::read_to_string(path).with_context(|| format!("Could not read JSON file '{path}'"))
    } else {
        Ok(value.to_string())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn required_arg<'a>(args: &'a [String], idx: usize, what: &str) -> Result<&'a str> {
    match args.get(idx) {
        Some(arg) => Ok(arg),
        None => {
            usage();
            bail!("Missing {what}")
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        bail!("Missing command");
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let command = args[1].as_str();
    let mut engine = PrimerEngine::new();
    match command {
        "capabilities" => print_json(&PrimerEngine::capabilities()),
        "op" => {
            let json = load_json_arg(required_arg(&args, 2, "operation JSON")?)?;
            let op: Operation = serde_json::from_str(&json).context("Invalid operation JSON")?;
            let result = engine.apply(op)?;
            print_json(&result)
        }
        "workflow" => {
            let json = load_json_arg(required_arg(&args, 2, "workflow JSON")?)?;
            let workflow: Workflow = serde_json::from_str(&json).context("Invalid workflow JSON")?;
            let results = engine.apply_workflow(workflow)?;
            print_json(&results)
        }
        "design-file" => {
            let path = required_arg(&args, 2, "template path")?;
            let options = match args.get(3) {
                Some(arg) => {
                    let json = load_json_arg(arg)?;
                    Some(serde_json::from_str::<DesignOptions>(&json).context("Invalid options JSON")?)
                }
                None => None,
            };
            let result = engine
                .apply(Operation::Design {
                    template: TemplateSource::File {
                        path: path.to_string(),
                        circular: None,
                    },
                    options,
                })
                .map_err(|e| anyhow!(e).context(format!("Could not design primers for '{path}'")))?;
            print_json(&result)
        }
        _ => {
            usage();
            bail!("Unknown command '{command}'")
        }
    }
}
