//! `plan` command

use anyhow::Result;

use crate::Context;
use crate::cli::PlanArgs;
use crate::engine::{Session, differ};

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::open(args.source.variant.as_deref(), args.source.file.as_deref())?;
    let plan = declarative::plan(&session.graph, &session.store)?
        .filter_by_target(args.target.as_deref());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        differ::display_plan(&plan, ctx.verbose > 0);
    }
    Ok(())
}
