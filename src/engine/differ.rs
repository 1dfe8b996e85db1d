//! Plan and report display

use colored::Colorize;
use declarative::{
    Action, ApplyReport, AttributeChange, NodeError, NodeStatus, Plan, PlanEntry, Value,
    group_by_type,
};
use similar::{ChangeTag, TextDiff};

use crate::ui::{action_symbol, status_symbol};

/// Display a plan grouped by resource type
pub fn display_plan(plan: &Plan, verbose: bool) {
    if !plan.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Execution Plan".bold()
    );
    println!("│");

    for (resource_type, entries) in group_by_type(&plan.entries) {
        let changing: Vec<&&PlanEntry> = entries
            .iter()
            .filter(|e| verbose || e.action.is_change())
            .collect();
        if changing.is_empty() {
            continue;
        }

        println!("│ {}", resource_type.bold());
        for entry in changing {
            println!(
                "│   {} {:<30} {}",
                action_symbol(entry.action),
                entry.node.name,
                entry.action.to_string().dimmed()
            );
            if entry.action != Action::Delete {
                for change in &entry.diff {
                    display_change(change);
                }
            }
        }
        println!("│");
    }

    let summary = plan.summary();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Plan: {} to create, {} to update, {} to delete, {} unchanged",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.deletes.to_string().red(),
        summary.unchanged
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn display_change(change: &AttributeChange) {
    let after = match &change.after {
        Some(value) if change.known_after_apply() => {
            format!("{} (known after apply)", value.render()).dimmed().to_string()
        }
        Some(value) => value.render(),
        None => "(removed)".red().to_string(),
    };

    match (&change.before, &change.after) {
        (Some(Value::String(from)), Some(Value::String(to)))
            if from.contains('\n') || to.contains('\n') =>
        {
            println!("│       {}:", change.attribute);
            for line in text_diff(from, to) {
                println!("│         {line}");
            }
        }
        (Some(before), _) => {
            println!(
                "│       {}: {} → {}",
                change.attribute,
                before.render().dimmed(),
                after
            );
        }
        (None, _) => println!("│       {}: {}", change.attribute, after),
    }
}

/// Line diff of multi-line string values
pub fn text_diff(from: &str, to: &str) -> Vec<String> {
    TextDiff::from_lines(from, to)
        .iter_all_changes()
        .map(|change| {
            let line = change.value().trim_end_matches('\n');
            match change.tag() {
                ChangeTag::Delete => format!("- {line}").red().to_string(),
                ChangeTag::Insert => format!("+ {line}").green().to_string(),
                ChangeTag::Equal => format!("  {line}"),
            }
        })
        .collect()
}

/// Display the per-node outcome of an apply or destroy
pub fn display_report(report: &ApplyReport) {
    println!();
    for entry in &report.entries {
        if entry.status == NodeStatus::Applied && entry.action == Some(Action::NoOp) {
            continue;
        }
        let action = entry.action.map(|a| a.to_string()).unwrap_or_default();
        println!(
            "  {} {:<40} {} {}",
            status_symbol(entry.status),
            entry.node.to_string(),
            entry.status,
            action.dimmed()
        );
    }

    if !report.failures.is_empty() {
        println!();
        println!("  {}", "Failures:".red().bold());
        for failure in &report.failures {
            println!("    • {failure}");
            if let NodeError::Conflict(conflict) = failure {
                println!(
                    "      {}",
                    "recorded state diverges from actual state; reconcile manually".dimmed()
                );
                if let Some(actual) = &conflict.actual {
                    for (key, value) in actual {
                        println!("      actual {key} = {}", value.render());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_diff_marks_changed_lines() {
        colored::control::set_override(false);
        let lines = text_diff("a\nb\n", "a\nc\n");
        assert_eq!(lines, vec!["  a", "- b", "+ c"]);
    }
}
