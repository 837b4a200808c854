use std::path::PathBuf;

use kgrader_core::action::{self, Target};

use super::{GlobalArgs, JudgeArgs, SubcmdResult};
use crate::util;

#[derive(Debug, clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub judge: JudgeArgs,

    /// Judge the reference solution instead
    #[arg(long, conflicts_with = "dir")]
    pub reference: bool,

    /// Working dir with the sources [default: current dir]
    #[arg(short = 'C', long)]
    pub dir: Option<PathBuf>,
}

pub async fn exec(args: &Args, global_args: &GlobalArgs) -> SubcmdResult {
    let cfg = global_args.load_config()?;
    let problem = args.judge.problem(&cfg)?;
    let opts = args.judge.options(&cfg);
    let work_dir = if args.reference {
        args.judge.reference_dir(&cfg)
    } else {
        util::work_dir(args.dir.as_deref())
    };

    let report = action::evaluate(
        &Target {
            config: &cfg,
            problem: &problem,
            work_dir: &work_dir,
        },
        &opts,
    )
    .await?;
    Ok(report.all_accepted())
}
