mod cmd;
mod util;

use std::io::Write as _;

use clap::Parser;
use colored::Colorize as _;
use kgrader_core::style::ColorTheme as _;
use log::LevelFilter;

use crate::cmd::GlobalArgs;

fn init_logger(args: &GlobalArgs) {
    let level = if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .format(|buf, record| {
            let level = record.level();
            writeln!(
                buf,
                "{} {}",
                format!("[{}]", level).color(level.color()).bold(),
                record.args()
            )
        })
        .init();
}

#[tokio::main]
async fn main() {
    let app = GlobalArgs::parse();
    init_logger(&app);
    match app.exec_subcmd().await {
        Ok(true) => (),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:?}", e);
            std::process::exit(1);
        }
    }
}
