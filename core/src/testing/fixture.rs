use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;

/// One test case: an input payload and the output it is expected to produce.
#[async_trait]
pub trait Fixture: Send + Sync {
    fn name(&self) -> &str;
    async fn read_input(&self) -> anyhow::Result<Vec<u8>>;
    async fn read_answer(&self) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsFixture {
    name: String,
    input_path: PathBuf,
    answer_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnMemoryFixture<B: AsRef<[u8]>> {
    pub name: String,
    pub input: B,
    pub answer: B,
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("No expected-output file for input '{input}' (looked for '{answer}')")]
    MissingAnswer { input: PathBuf, answer: PathBuf },

    #[error("Cannot scan fixture dir: {0}")]
    Scan(#[from] fsutil::Error),
}

/// Where fixtures live and how input/answer files are told apart.
///
/// Fixtures of problem `p` are the files under `<root>/<p>_data/` (at any
/// depth) ending in `.<input_ext>`; each needs a sibling with the same stem
/// ending in `.<answer_ext>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FixtureLayout {
    pub root: PathBuf,
    pub input_ext: String,
    pub answer_ext: String,
}

impl Default for FixtureLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            input_ext: "in".to_owned(),
            answer_ext: "ans".to_owned(),
        }
    }
}

impl FixtureLayout {
    pub fn data_dir(&self, problem: &str) -> PathBuf {
        self.root.join(format!("{}_data", problem))
    }

    /// Returns `Ok(None)` when `path` is not an input file.
    pub fn find_by_input_file_path(
        &self,
        data_dir: &Path,
        path: &Path,
    ) -> Result<Option<FsFixture>, FixtureError> {
        if path.extension().map_or(true, |ext| ext != self.input_ext.as_str()) {
            return Ok(None);
        }
        let answer = path.with_extension(&self.answer_ext);
        if !answer.is_file() {
            return Err(FixtureError::MissingAnswer {
                input: path.to_owned(),
                answer,
            });
        }
        let rel = path.strip_prefix(data_dir).unwrap_or(path).with_extension("");
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Ok(Some(FsFixture::new(name, path, answer)))
    }

    /// Scans the data dir of `problem`. Every call rescans, so the result
    /// reflects the directory as it is now. Sorted by path.
    pub fn enumerate(&self, problem: &str) -> Result<Vec<FsFixture>, FixtureError> {
        let data_dir = self.data_dir(problem);
        let mut fixtures = Vec::new();
        for path in fsutil::walk_files(&data_dir)? {
            if let Some(f) = self.find_by_input_file_path(&data_dir, &path)? {
                fixtures.push(f);
            }
        }
        log::debug!(
            "Found {} fixtures in {}",
            fixtures.len(),
            data_dir.to_string_lossy()
        );
        Ok(fixtures)
    }
}

impl FsFixture {
    pub fn new(
        name: impl Into<String>,
        input: impl Into<PathBuf>,
        answer: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            input_path: input.into(),
            answer_path: answer.into(),
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn answer_path(&self) -> &Path {
        &self.answer_path
    }
}

#[async_trait]
impl Fixture for FsFixture {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_input(&self) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(&self.input_path).await.with_context(|| {
            format!(
                "Failed to read fixture input {}",
                self.input_path.to_string_lossy()
            )
        })
    }

    async fn read_answer(&self) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(&self.answer_path).await.with_context(|| {
            format!(
                "Failed to read fixture answer {}",
                self.answer_path.to_string_lossy()
            )
        })
    }
}

impl<B> OnMemoryFixture<B>
where
    B: AsRef<[u8]>,
{
    pub fn new(name: impl Into<String>, input: impl Into<B>, answer: impl Into<B>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            answer: answer.into(),
        }
    }
}

#[async_trait]
impl<B> Fixture for OnMemoryFixture<B>
where
    B: AsRef<[u8]> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_input(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.input.as_ref().to_vec())
    }

    async fn read_answer(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.answer.as_ref().to_vec())
    }
}
