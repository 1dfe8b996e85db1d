//! `state` subcommands

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use declarative::{NodeId, StateStore};
use dialoguer::Confirm;

use crate::Context;
use crate::cli::{Source, SourceArgs, StateCommand};
use crate::engine::Session;
use crate::state::FileStateStore;
use crate::{config, paths, ui};

pub fn run(ctx: &Context, cmd: StateCommand) -> Result<()> {
    match cmd {
        StateCommand::List(args) => list(ctx, args),
        StateCommand::Show { source, node } => show(&open_store(&source)?, &node),
        StateCommand::Rm { source, node, yes } => remove(ctx, &open_store(&source)?, &node, yes),
    }
}

/// State of a variant without building its graph
fn open_store(source: &Source) -> Result<FileStateStore> {
    let name = config::select_name(source.variant.as_deref(), source.file.as_deref())?;
    let store = FileStateStore::new(paths::variant_state_dir(&name)?);
    log::debug!("Opened state for '{}' in {}", name, store.dir().display());
    Ok(store)
}

fn parse_node(node: &str) -> Result<NodeId> {
    node.parse::<NodeId>()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Invalid node address '{node}' (expected type.name)"))
}

fn list(ctx: &Context, args: SourceArgs) -> Result<()> {
    let session = Session::open(args.source.variant.as_deref(), args.source.file.as_deref())?;
    let ids = session.store.ids()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    ui::header(&format!("Recorded State: {}", session.variant.name));
    if ids.is_empty() {
        ui::dim("No recorded nodes");
        return Ok(());
    }

    for id in &ids {
        let stored = session.store.load(id)?;
        let declared = session.graph.index_of(id).is_some();
        let marker = if declared {
            "●".green()
        } else {
            "○".yellow()
        };
        let updated = stored
            .map(|s| s.last_updated.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("  {} {:<40} {}", marker, id.to_string(), updated.dimmed());
    }

    if !ctx.quiet {
        let orphans = ids.iter().filter(|id| session.graph.index_of(id).is_none()).count();
        if orphans > 0 {
            println!();
            ui::warn(&format!(
                "{orphans} recorded nodes are no longer declared and will be deleted on apply"
            ));
        }
    }
    Ok(())
}

fn show(store: &FileStateStore, node: &str) -> Result<()> {
    let id = parse_node(node)?;
    let Some(stored) = store.load(&id)? else {
        bail!("No recorded state for {id}");
    };
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}

fn remove(ctx: &Context, store: &FileStateStore, node: &str, yes: bool) -> Result<()> {
    let id = parse_node(node)?;
    if store.get(&id)?.is_none() {
        bail!("No recorded state for {id}");
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Forget {id}? The resource itself is not deleted"))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  {} Aborted", "✗".red());
            return Ok(());
        }
    }

    store.remove(&id)?;
    if !ctx.quiet {
        ui::success(&format!("Removed {id} from state"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node() {
        assert_eq!(
            parse_node("workspace.w").unwrap(),
            NodeId::new("workspace", "w")
        );
        assert!(parse_node("workspace").is_err());
    }

    #[test]
    fn test_show_and_remove_need_no_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileStateStore::new(tmp.path().to_path_buf());
        let id = NodeId::new("workspace", "w");
        store.put(&id, declarative::NodeRecord::default()).unwrap();

        let ctx = Context {
            verbose: 0,
            quiet: true,
        };
        show(&store, "workspace.w").unwrap();
        remove(&ctx, &store, "workspace.w", true).unwrap();
        assert!(store.get(&id).unwrap().is_none());
        assert!(show(&store, "workspace.w").is_err());
    }
}
