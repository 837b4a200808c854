pub mod compare;
pub mod evaluate;
pub mod init;
pub mod run;
pub mod summary;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use kgrader_core::{testing::JudgeOptions, Config};

use crate::util;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct GlobalArgs {
    #[command(subcommand)]
    pub subcmd: Subcommand,

    /// Config file [default: nearest kgrader.toml in the current dir or its ancestors]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show debug logs
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Show warnings and errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Build and judge against every fixture
    #[command(alias("e"))]
    Evaluate(evaluate::Args),

    /// Build this and the reference solution and compare their outputs
    #[command(alias("c"))]
    Compare(compare::Args),

    /// Build and run once on one input
    #[command(alias("r"))]
    Run(run::Args),

    /// Best verdict per student from a Kattis export
    Summary(summary::Args),

    /// Write an example kgrader.toml
    Init(init::Args),
}

/// `Ok(false)` means the command ran but the solution did not pass.
pub type SubcmdResult = anyhow::Result<bool>;

impl GlobalArgs {
    pub async fn exec_subcmd(&self) -> SubcmdResult {
        use Subcommand::*;
        match &self.subcmd {
            Evaluate(args) => evaluate::exec(args, self).await,
            Compare(args) => compare::exec(args, self).await,
            Run(args) => run::exec(args, self).await,
            Summary(args) => summary::exec(args, self),
            Init(args) => init::exec(args, self),
        }
    }

    pub fn load_config(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => Config::from_toml_file(path.clone()),
            None => Config::from_file_finding_in_ancestors(util::current_dir()),
        }
    }
}

/// Options shared by the pipelines that judge fixtures.
#[derive(Debug, clap::Args)]
pub struct JudgeArgs {
    /// Problem name; fixtures are read from `<problem>_data/`
    #[arg()]
    pub problem: Option<String>,

    /// Time limit per run in milliseconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Stop at the first failure
    #[arg(long, overrides_with = "no_fail_fast")]
    pub fail_fast: bool,

    /// Run every fixture even after a failure
    #[arg(long, overrides_with = "fail_fast")]
    pub no_fail_fast: bool,

    /// Print diffs and buffers of failed fixtures
    #[arg(long, overrides_with = "no_diff")]
    pub diff: bool,

    /// Print only the verdict lines and the summary
    #[arg(long, overrides_with = "diff")]
    pub no_diff: bool,

    /// Number of fixtures run at the same time
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Working dir of the reference solution
    #[arg(long)]
    pub reference_dir: Option<PathBuf>,
}

fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl JudgeArgs {
    pub fn problem(&self, cfg: &Config) -> anyhow::Result<String> {
        self.problem
            .clone()
            .or_else(|| cfg.problem.clone())
            .context("No problem given (pass one, or set `problem` in kgrader.toml)")
    }

    pub fn options(&self, cfg: &Config) -> JudgeOptions {
        let mut opts = cfg.judge.to_options();
        if let Some(ms) = self.timeout {
            opts.time_limit = Duration::from_millis(ms);
        }
        if let Some(v) = flag_pair(self.fail_fast, self.no_fail_fast) {
            opts.fail_fast = v;
        }
        if let Some(v) = flag_pair(self.diff, self.no_diff) {
            opts.verbose = v;
        }
        if let Some(jobs) = self.jobs {
            opts.jobs = jobs.max(1);
        }
        opts
    }

    pub fn reference_dir(&self, cfg: &Config) -> PathBuf {
        match &self.reference_dir {
            Some(dir) => dir.clone(),
            None => cfg.reference_dir(),
        }
    }
}
