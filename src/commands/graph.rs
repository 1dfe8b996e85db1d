//! `validate` and `graph` commands

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{EdgeKind, Graph, resolver};
use serde_json::json;

use crate::Context;
use crate::cli::SourceArgs;
use crate::config;
use crate::ui;

pub fn validate(ctx: &Context, args: SourceArgs) -> Result<()> {
    let variant = config::select(args.source.variant.as_deref(), args.source.file.as_deref())?;

    match variant.config.graph() {
        Ok(graph) => {
            if args.json {
                let out = json!({
                    "variant": variant.name,
                    "valid": true,
                    "nodes": graph.len(),
                    "edges": graph.edges().len(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if !ctx.quiet {
                ui::success(&format!(
                    "{} is valid: {} nodes, {} edges",
                    variant.name.bold(),
                    graph.len(),
                    graph.edges().len()
                ));
            }
            Ok(())
        }
        Err(e) => {
            if args.json {
                let out = json!({
                    "variant": variant.name,
                    "valid": false,
                    "error": e,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                ui::error(&e.to_string());
            }
            bail!("{} failed validation", variant.name)
        }
    }
}

pub fn graph(ctx: &Context, args: SourceArgs) -> Result<()> {
    let variant = config::select(args.source.variant.as_deref(), args.source.file.as_deref())?;
    let graph = variant.config.graph()?;
    let levels = resolver::levels(&graph)?;

    if args.json {
        let ids = |indices: &[usize]| -> Vec<String> {
            indices.iter().map(|&i| graph.node(i).id.to_string()).collect()
        };
        let edges: Vec<_> = graph
            .edges()
            .iter()
            .map(|e| {
                json!({
                    "dependent": graph.node(e.dependent).id,
                    "dependency": graph.node(e.dependency).id,
                    "kind": e.kind,
                })
            })
            .collect();
        let out = json!({
            "variant": variant.name,
            "order": resolver::resolve(&graph)?,
            "levels": levels.iter().map(|l| ids(l.as_slice())).collect::<Vec<_>>(),
            "edges": edges,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    ui::header(&format!("Resource Graph: {}", variant.name));
    if graph.is_empty() {
        ui::dim("No resources declared");
        return Ok(());
    }

    for (wave, level) in levels.iter().enumerate() {
        ui::section(&format!("Wave {}", wave + 1));
        for &idx in level {
            println!("  {}", graph.node(idx).id);
            if ctx.verbose > 0 {
                print_dependencies(&graph, idx);
            }
        }
    }
    Ok(())
}

fn print_dependencies(graph: &Graph, idx: usize) {
    for edge in graph.edges().iter().filter(|e| e.dependent == idx) {
        let kind = match edge.kind {
            EdgeKind::Explicit => "depends_on",
            EdgeKind::Reference => "reference",
        };
        println!(
            "    {} {} {}",
            "←".dimmed(),
            graph.node(edge.dependency).id,
            format!("({kind})").dimmed()
        );
    }
}
