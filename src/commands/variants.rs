//! `variants` command

use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::config::{self, Variant};
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let dir = paths::config_dir()?;
    let files = config::discover(&dir)?;

    ui::header("Variants");
    if ctx.verbose > 0 {
        ui::kv("Config dir", &dir.display().to_string());
        ui::kv("State dir", &paths::state_dir()?.display().to_string());
        println!();
    }

    if files.is_empty() {
        ui::dim(&format!("No *.toml files in {}", dir.display()));
        return Ok(());
    }

    for file in files {
        match Variant::load(&file) {
            Ok(variant) => {
                let description = variant.config.description.clone().unwrap_or_default();
                let validity = match variant.config.graph() {
                    Ok(graph) => format!("{} resources", graph.len()).normal(),
                    Err(e) => format!("invalid: {e}").red(),
                };
                println!(
                    "  {:<20} {:<16} {}",
                    variant.name.bold(),
                    validity,
                    description.dimmed()
                );
            }
            Err(e) => ui::error(&format!("{}: {e:#}", file.display())),
        }
    }
    Ok(())
}
