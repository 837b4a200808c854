use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::time::Duration;

use anyhow::Context as _;
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::testing::{FixtureLayout, JudgeOptions, ProcessRunner, SourcePattern, TestCommand};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub source_config_file: Option<PathBuf>,
    #[serde(default)]
    pub problem: Option<String>,
    #[serde(default)]
    pub fixture: FixtureLayout,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub shell: PathBuf,
    pub sources: SourcePattern,
    pub compile: Option<String>,
    pub run: String,
    pub reference_dir: PathBuf,
    pub keep_artifacts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub timeout_ms: u64,
    pub fail_fast: bool,
    pub verbose: bool,
    pub output_limit_bytes: usize,
    pub stderr_capture_max_bytes: usize,
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            shell: ProcessRunner::DEFAULT_SHELL.into(),
            sources: SourcePattern::parse("*.java").unwrap(),
            compile: Some("javac #{sources}".to_owned()),
            run: "java Main".to_owned(),
            reference_dir: PathBuf::from("__original__"),
            keep_artifacts: false,
        }
    }
}

impl BuildConfig {
    /// The command templates; an empty `compile` means there is no build step.
    pub fn command(&self) -> TestCommand {
        TestCommand {
            compile: self
                .compile
                .as_ref()
                .filter(|cmd| !cmd.trim().is_empty())
                .cloned(),
            run: self.run.clone(),
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        let opts = JudgeOptions::default();
        Self {
            timeout_ms: opts.time_limit.as_millis() as u64,
            fail_fast: opts.fail_fast,
            verbose: opts.verbose,
            output_limit_bytes: opts.output_limit_bytes,
            stderr_capture_max_bytes: opts.stderr_capture_max_bytes,
            jobs: opts.jobs,
        }
    }
}

impl JudgeConfig {
    pub fn to_options(&self) -> JudgeOptions {
        JudgeOptions {
            time_limit: Duration::from_millis(self.timeout_ms),
            fail_fast: self.fail_fast,
            verbose: self.verbose,
            output_limit_bytes: self.output_limit_bytes,
            stderr_capture_max_bytes: self.stderr_capture_max_bytes,
            jobs: self.jobs.max(1),
        }
    }
}

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

impl Config {
    pub const FILENAME: &str = "kgrader.toml";

    pub fn example_toml() -> String {
        let file = Asset::get(Self::FILENAME).unwrap();
        std::str::from_utf8(file.data.as_ref()).unwrap().to_owned()
    }

    pub fn from_toml(s: &str) -> StdResult<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(filepath: PathBuf) -> anyhow::Result<Self> {
        let toml = fsutil::read_to_string(&filepath).context("Cannot read a file")?;
        let mut cfg = Self::from_toml(&toml)
            .with_context(|| format!("Invalid config TOML: {:?}", filepath))?;
        cfg.source_config_file = Some(filepath);
        Ok(cfg)
    }

    /// Find config file ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> Option<PathBuf> {
        cur_dir
            .as_ref()
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
    }

    /// Loads the nearest config file, or the built-in defaults if there is none.
    pub fn from_file_finding_in_ancestors(cur_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        match Self::find_file_in_ancestors(&cur_dir) {
            Some(path) => {
                log::debug!("Using config {}", path.to_string_lossy());
                Self::from_toml_file(path)
            }
            None => {
                log::info!(
                    "No '{}' found in {:?} or its ancestors; using defaults",
                    Self::FILENAME,
                    cur_dir.as_ref()
                );
                Ok(Self::default())
            }
        }
    }

    /// Directory that relative paths in the config are resolved against.
    pub fn base_dir(&self) -> &Path {
        self.source_config_file
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(Path::new("."))
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.base_dir().join(path)
        }
    }

    pub fn fixture_layout(&self) -> FixtureLayout {
        FixtureLayout {
            root: self.resolve(&self.fixture.root),
            ..self.fixture.clone()
        }
    }

    pub fn reference_dir(&self) -> PathBuf {
        self.resolve(&self.build.reference_dir)
    }
}
