use std::path::PathBuf;

use kgrader_core::action::{self, Target};

use super::{GlobalArgs, SubcmdResult};
use crate::util;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Input fed to stdin; looked up in `<problem>_data/` if not found as given
    #[arg(default_value = "1.in")]
    pub input: PathBuf,

    #[arg(short, long)]
    pub problem: Option<String>,

    /// Working dir with the sources [default: current dir]
    #[arg(short = 'C', long)]
    pub dir: Option<PathBuf>,
}

pub async fn exec(args: &Args, global_args: &GlobalArgs) -> SubcmdResult {
    let cfg = global_args.load_config()?;
    let problem = args
        .problem
        .clone()
        .or_else(|| cfg.problem.clone())
        .unwrap_or_default();
    let work_dir = util::work_dir(args.dir.as_deref());

    let status = action::run_one(
        &Target {
            config: &cfg,
            problem: &problem,
            work_dir: &work_dir,
        },
        &args.input,
    )
    .await?;
    if !status.success() {
        log::warn!("Program exited with {}", status);
    }
    Ok(status.success())
}
