//! Execution engine - strata executor with UI integration

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use declarative::{
    Action, ApplyReport, CancellationToken, ExecuteOptions, ExecuteSummary, NodeId, NodeStatus,
    Plan, ProgressCallback, ReportEntry,
};

use crate::ui::{action_symbol, status_symbol};

use super::Session;
use super::differ::{display_plan, display_report};

/// Options for apply and destroy
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Don't make changes, just show the plan
    pub dry_run: bool,
    /// Number of nodes applied concurrently
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Stop starting new nodes after the first failure
    pub fail_fast: bool,
    /// Print the report as JSON instead of a summary
    pub json: bool,
    /// Show unchanged nodes too
    pub verbose: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
            fail_fast: false,
            json: false,
            verbose: false,
        }
    }
}

/// Progress bar fed by the reconciliation driver
struct BarProgress {
    pb: ProgressBar,
    fail_fast: Option<CancellationToken>,
}

impl BarProgress {
    fn new(total: usize, hidden: bool, fail_fast: Option<CancellationToken>) -> Self {
        let pb = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        let template = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("=>-"));
        }
        Self { pb, fail_fast }
    }
}

impl ProgressCallback for BarProgress {
    fn on_wave_start(&mut self, nodes: &[NodeId]) {
        log::debug!("Starting wave of {} nodes", nodes.len());
        self.pb.set_message(format!("{} in flight", nodes.len()));
    }

    fn on_node_planned(&mut self, node: &NodeId, action: Action) {
        log::debug!("{node}: planned {action}");
        self.pb.set_message(format!("{} {}", action_symbol(action), node));
    }

    fn on_node_complete(&mut self, entry: &ReportEntry) {
        self.pb
            .set_message(format!("{} {}", status_symbol(entry.status), entry.node));
        self.pb.inc(1);

        if entry.status == NodeStatus::Failed
            && let Some(token) = &self.fail_fast
            && !token.is_cancelled()
        {
            // stderr keeps `--json` output on stdout parseable
            self.pb.suspend(|| {
                eprintln!(
                    "  {} {} failed; not starting further nodes (--fail-fast)",
                    "✗".red(),
                    entry.node
                );
            });
            token.cancel();
        }
    }
}

/// Plan, confirm and reconcile a session's graph
pub fn apply(session: &mut Session, opts: &ApplyOptions) -> Result<ApplyReport> {
    let plan = declarative::plan(&session.graph, &session.store)?;
    run(session, opts, &plan, "Apply", |session, exec, progress, cancel| {
        declarative::reconcile(
            &mut session.graph,
            &session.store,
            &session.provider,
            exec,
            progress,
            cancel,
        )
    })
}

/// Plan, confirm and tear down every recorded node
pub fn destroy(session: &mut Session, opts: &ApplyOptions) -> Result<ApplyReport> {
    let plan = declarative::plan_teardown(&session.graph, &session.store)?;
    run(session, opts, &plan, "Destroy", |session, exec, progress, cancel| {
        declarative::teardown(
            &mut session.graph,
            &session.store,
            &session.provider,
            exec,
            progress,
            cancel,
        )
    })
}

fn run<F>(
    session: &mut Session,
    opts: &ApplyOptions,
    plan: &Plan,
    verb: &str,
    execute: F,
) -> Result<ApplyReport>
where
    F: FnOnce(
        &mut Session,
        &ExecuteOptions,
        &mut BarProgress,
        &CancellationToken,
    ) -> declarative::Result<ApplyReport>,
{
    if opts.json {
        if opts.dry_run {
            println!("{}", serde_json::to_string_pretty(plan)?);
        }
    } else {
        display_plan(plan, opts.verbose);
    }

    if !plan.has_changes() {
        let report = ApplyReport::default();
        if opts.json && !opts.dry_run {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        return Ok(report);
    }

    if opts.dry_run {
        if !opts.json {
            println!();
            println!("  {} Dry run - no changes made", "ℹ".blue());
        }
        return Ok(ApplyReport::default());
    }

    if !opts.yes && !confirm_proceed(verb)? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ApplyReport::default());
    }

    let cancel = CancellationToken::new();
    let mut progress = BarProgress::new(
        plan.entries.len(),
        opts.json,
        opts.fail_fast.then(|| cancel.clone()),
    );
    let exec = ExecuteOptions {
        jobs: opts.jobs.max(1),
    };

    let report = execute(session, &exec, &mut progress, &cancel)?;
    progress.pb.finish_and_clear();

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_report(&report);
        print_summary(verb, &report.summary());
    }
    Ok(report)
}

/// Confirm with user
fn confirm_proceed(verb: &str) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(format!("{verb} these changes?"))
        .default(false)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(verb: &str, summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} {} complete!", "✓".green().bold(), verb);
    } else {
        println!("  {} {} finished with errors", "⚠".yellow().bold(), verb);
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.deleted > 0 {
        println!("    • {} resources deleted", summary.deleted);
    }
    if summary.unchanged > 0 {
        println!("    • {} resources unchanged", summary.unchanged);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
    if summary.blocked > 0 {
        println!("    • {} {} blocked", summary.blocked, "resources".yellow());
    }
    if summary.cancelled > 0 {
        println!("    • {} resources cancelled", summary.cancelled);
    }
}
