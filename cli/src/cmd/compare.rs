use std::path::PathBuf;

use kgrader_core::action::{self, Target};

use super::{GlobalArgs, JudgeArgs, SubcmdResult};
use crate::util;

#[derive(Debug, clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub judge: JudgeArgs,

    /// Working dir with the sources [default: current dir]
    #[arg(short = 'C', long)]
    pub dir: Option<PathBuf>,
}

pub async fn exec(args: &Args, global_args: &GlobalArgs) -> SubcmdResult {
    let cfg = global_args.load_config()?;
    let problem = args.judge.problem(&cfg)?;
    let opts = args.judge.options(&cfg);
    let work_dir = util::work_dir(args.dir.as_deref());
    let reference_dir = args.judge.reference_dir(&cfg);

    let report = action::compare(
        &Target {
            config: &cfg,
            problem: &problem,
            work_dir: &work_dir,
        },
        &reference_dir,
        &opts,
    )
    .await?;
    Ok(report.all_matched())
}
