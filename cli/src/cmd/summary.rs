use std::path::PathBuf;

use anyhow::Context as _;
use kgrader_core::{action, style};

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Kattis export (JSON)
    pub export_file: PathBuf,

    /// Problem to summarize [default: `problem` in kgrader.toml]
    pub problem: Option<String>,

    /// Only count submissions of this assignment
    #[arg(short, long)]
    pub assignment: Option<String>,

    /// Usernames to report on [default: every student]
    #[arg(long, num_args = 1..)]
    pub only: Vec<String>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn exec(args: &Args, global_args: &GlobalArgs) -> SubcmdResult {
    let problem = match &args.problem {
        Some(p) => p.clone(),
        None => global_args
            .load_config()?
            .problem
            .context("No problem given (pass one, or set `problem` in kgrader.toml)")?,
    };

    let summary = action::summarize_export(
        &args.export_file,
        &problem,
        args.assignment.as_deref(),
        &args.only,
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        style::print_export_summary(&summary);
    }
    Ok(true)
}
