//! `apply` and `destroy` commands

use anyhow::{Result, bail};

use crate::Context;
use crate::cli::{ApplyArgs, DestroyArgs};
use crate::engine::{self, ApplyOptions, Session};
use crate::ui;

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let mut session = Session::open(args.source.variant.as_deref(), args.source.file.as_deref())?;
    if !args.json && !ctx.quiet {
        ui::header(&format!("Applying {}", session.variant.name));
    }

    let opts = ApplyOptions {
        dry_run: args.dry_run,
        jobs: args.jobs,
        yes: args.yes,
        fail_fast: args.fail_fast,
        json: args.json,
        verbose: ctx.verbose > 0,
    };
    let report = engine::apply(&mut session, &opts)?;

    if !report.is_success() {
        let summary = report.summary();
        bail!(
            "apply did not converge: {} failed, {} blocked, {} cancelled",
            summary.failed,
            summary.blocked,
            summary.cancelled
        );
    }
    Ok(())
}

pub fn destroy(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let mut session = Session::open(args.source.variant.as_deref(), args.source.file.as_deref())?;
    if !ctx.quiet {
        ui::header(&format!("Destroying {}", session.variant.name));
    }

    let opts = ApplyOptions {
        jobs: args.jobs,
        yes: args.yes,
        verbose: ctx.verbose > 0,
        ..ApplyOptions::default()
    };
    let report = engine::destroy(&mut session, &opts)?;

    if !report.is_success() {
        let summary = report.summary();
        bail!(
            "destroy incomplete: {} failed, {} blocked, {} cancelled",
            summary.failed,
            summary.blocked,
            summary.cancelled
        );
    }
    Ok(())
}
