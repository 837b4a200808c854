use std::{
    collections::{HashMap, HashSet},
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tokio::process::Command;

use super::runner::ProcessRunner;
use crate::config::BuildConfig;
use crate::str_interp::{interp, InterpError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub compile: Option<String>,
    pub run: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid command template: {0}")]
    Template(#[from] InterpError),

    #[error(transparent)]
    Fs(#[from] fsutil::Error),

    #[error("Failed to spawn '{shell} -c {cmd}': {source}")]
    Spawn {
        shell: String,
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("Compile error: exitcode={code}")]
    Failed { code: i32 },

    #[error("Failed to compile: process terminated by signal")]
    Signaled,
}

#[derive(Debug, thiserror::Error)]
pub enum SourcePatternError {
    #[error(transparent)]
    Glob(#[from] glob::PatternError),

    #[error("Source pattern '{0}' must match file names, not paths")]
    NotAFileName(String),
}

/// Glob over the file names directly inside a working dir, e.g. `*.java`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct SourcePattern(glob::Pattern);

impl SourcePattern {
    pub fn parse(pattern: &str) -> Result<Self, SourcePatternError> {
        if pattern.contains('/') {
            return Err(SourcePatternError::NotAFileName(pattern.to_owned()));
        }
        Ok(Self(glob::Pattern::new(pattern)?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Matching files of `work_dir`, sorted. Subdirectories are not searched.
    pub fn select(&self, work_dir: &Path) -> fsutil::Result<Vec<PathBuf>> {
        fsutil::files_matching_glob(work_dir, &self.0)
    }
}

impl TryFrom<String> for SourcePattern {
    type Error = SourcePatternError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

/// Compiles the sources of one working dir and hands out a runner for the
/// resulting program.
#[derive(Debug, Clone)]
pub struct BuildDriver {
    shell: PathBuf,
    work_dir: PathBuf,
    cmd: TestCommand,
    keep_artifacts: bool,
}

/// Files created in the working dir by a build. Removed on drop unless kept.
#[derive(Debug, Default)]
#[must_use]
pub struct BuildArtifacts {
    files: Vec<PathBuf>,
    keep: bool,
}

impl BuildDriver {
    pub fn new(
        cfg: &BuildConfig,
        work_dir: impl Into<PathBuf>,
        problem: &str,
    ) -> Result<Self, BuildError> {
        let work_dir = work_dir.into();
        let sources = cfg.sources.select(&work_dir)?;
        if sources.is_empty() {
            log::warn!(
                "No file in {} matches '{}'",
                work_dir.to_string_lossy(),
                cfg.sources.as_str()
            );
        }
        let cmd = Self::interpolate_command(cfg.command(), &work_dir, &sources, problem)?;
        Ok(Self {
            shell: cfg.shell.clone(),
            work_dir,
            cmd,
            keep_artifacts: cfg.keep_artifacts,
        })
    }

    pub fn keep_artifacts(mut self, keep: bool) -> Self {
        self.keep_artifacts = keep;
        self
    }

    pub fn interpolate_command(
        mut cmd: TestCommand,
        work_dir: &Path,
        sources: &[PathBuf],
        problem: &str,
    ) -> Result<TestCommand, InterpError> {
        let sources = sources
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| shell_quote(&name.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ");

        let mut vars: HashMap<&'static str, &OsStr> = HashMap::new();
        vars.insert("sources", sources.as_ref());
        vars.insert("workDir", work_dir.as_os_str());
        vars.insert("problem", problem.as_ref());

        cmd.compile = cmd.compile.map(|fmt| interp(&fmt, &vars)).transpose()?;
        cmd.run = interp(&cmd.run, &vars)?;
        Ok(cmd)
    }

    pub fn get_command(&self) -> &TestCommand {
        &self.cmd
    }

    pub fn get_work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Runs the compile command in the working dir, with the compiler's own
    /// output going to the terminal. A non-zero exit is fatal.
    ///
    /// Whatever the build leaves behind in the working dir (also on failure)
    /// is tracked by the returned guard.
    pub async fn build(&self) -> Result<BuildArtifacts, BuildError> {
        let Some(cmd) = &self.cmd.compile else {
            log::debug!("No compile command; nothing to build");
            return Ok(BuildArtifacts::default());
        };

        let before: HashSet<PathBuf> = fsutil::list_files(&self.work_dir)?.into_iter().collect();

        log::info!("Compiling in {}", self.work_dir.to_string_lossy());
        log::info!("{}", cmd);
        let status = Command::new(&self.shell)
            .args(["-c", cmd])
            .current_dir(&self.work_dir)
            .status()
            .await
            .map_err(|source| BuildError::Spawn {
                shell: self.shell.to_string_lossy().into_owned(),
                cmd: cmd.to_owned(),
                source,
            })?;

        let artifacts = BuildArtifacts {
            files: fsutil::list_files(&self.work_dir)?
                .into_iter()
                .filter(|path| !before.contains(path))
                .collect(),
            keep: self.keep_artifacts,
        };
        log::debug!("Build produced {} files", artifacts.files.len());

        match status.code() {
            Some(0) => Ok(artifacts),
            Some(code) => Err(BuildError::Failed { code }),
            None => Err(BuildError::Signaled),
        }
    }

    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(&self.cmd.run, &self.work_dir).shell(&self.shell)
    }
}

impl BuildArtifacts {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for BuildArtifacts {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in &self.files {
            match fsutil::remove_file(path) {
                Ok(()) => log::trace!("Removed {}", path.to_string_lossy()),
                // already gone is fine
                Err(fsutil::Error::SingleIO(_, _, e)) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("{}", e),
            }
        }
    }
}

fn shell_quote(s: &str) -> String {
    let is_plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+'));
    if is_plain {
        s.to_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cfg(sources: &str, compile: &str, run: &str) -> BuildConfig {
        BuildConfig {
            sources: SourcePattern::parse(sources).unwrap(),
            compile: Some(compile.to_owned()),
            run: run.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn interpolates_sorted_sources() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "my notes.txt", "skip.md"] {
            fsutil::write(dir.path().join(name), "").unwrap();
        }
        let driver = BuildDriver::new(
            &cfg("*.txt", "cat #{sources} > #{problem}.sh", "sh #{problem}.sh"),
            dir.path(),
            "hello",
        )
        .unwrap();
        assert_eq!(
            driver.get_command(),
            &TestCommand {
                compile: Some("cat a.txt b.txt 'my notes.txt' > hello.sh".to_owned()),
                run: "sh hello.sh".to_owned(),
            }
        );
    }

    #[derive(Debug, Deserialize)]
    struct Sources {
        sources: SourcePattern,
    }

    #[test]
    fn source_pattern_from_toml() {
        let w: Sources = toml::from_str(r#"sources = "*.[ch]pp""#).unwrap();
        assert_eq!(w.sources.as_str(), "*.[ch]pp");

        let dir = tempfile::tempdir().unwrap();
        for name in ["main.cpp", "util.hpp", "Main.java"] {
            fsutil::write(dir.path().join(name), "").unwrap();
        }
        let names: Vec<_> = w
            .sources
            .select(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["main.cpp", "util.hpp"]);
    }

    #[test]
    fn source_pattern_rejects_broken_globs_and_paths() {
        assert!(toml::from_str::<Sources>(r#"sources = "[a""#).is_err());
        assert!(matches!(
            SourcePattern::parse("src/*.java"),
            Err(SourcePatternError::NotAFileName(_))
        ));
    }

    #[test]
    fn rejects_unknown_variable() {
        let dir = tempfile::tempdir().unwrap();
        let err = BuildDriver::new(&cfg("*.c", "gcc #{file}", "./a.out"), dir.path(), "p")
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Template(InterpError::UndefinedVar(..))
        ));
    }

    #[tokio::test]
    async fn build_then_run_and_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        fsutil::write(dir.path().join("prog.txt"), "echo built\n").unwrap();

        let driver =
            BuildDriver::new(&cfg("*.txt", "cp #{sources} prog.sh", "sh prog.sh"), dir.path(), "p")
                .unwrap();
        let artifacts = driver.build().await.unwrap();
        assert_eq!(artifacts.files(), [dir.path().join("prog.sh")]);

        let res = driver.runner().run(b"").await.unwrap();
        assert_eq!(res.stdout, b"built\n");

        drop(artifacts);
        assert!(!dir.path().join("prog.sh").exists());
        assert!(dir.path().join("prog.txt").exists());
    }

    #[tokio::test]
    async fn keeps_artifacts_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let driver = BuildDriver::new(&cfg("*", "touch out.bin", "true"), dir.path(), "p")
            .unwrap()
            .keep_artifacts(true);
        drop(driver.build().await.unwrap());
        assert!(dir.path().join("out.bin").exists());
    }

    #[tokio::test]
    async fn failed_build_is_fatal_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let driver = BuildDriver::new(&cfg("*", "touch half.o; exit 3", "true"), dir.path(), "p")
            .unwrap();
        let err = driver.build().await.unwrap_err();
        assert!(matches!(err, BuildError::Failed { code: 3 }));
        assert!(!dir.path().join("half.o").exists());
    }

    #[tokio::test]
    async fn no_compile_step_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg("*", "", "true");
        c.compile = Some("  ".to_owned());
        let driver = BuildDriver::new(&c, dir.path(), "p").unwrap();
        assert_eq!(driver.get_command().compile, None);
        assert!(driver.build().await.unwrap().files().is_empty());
    }
}
