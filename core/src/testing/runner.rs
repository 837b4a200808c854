use std::{
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use anyhow::Context as _;
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    process::{Child, Command},
};

use super::result::{RunOutcome, Termination};

/// Runs a built program once per input, feeding stdin and capturing stdout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: PathBuf,
    cmd: String,
    work_dir: PathBuf,
    time_limit: Duration,
    output_limit_bytes: usize,
    stderr_capture_max_bytes: usize,
}

enum Interrupt {
    OutputLimit,
    Io(io::Error),
}

impl From<io::Error> for Interrupt {
    fn from(e: io::Error) -> Self {
        Interrupt::Io(e)
    }
}

impl ProcessRunner {
    pub const DEFAULT_SHELL: &str = "/bin/sh";
    pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_millis(500);
    pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 64 << 20;
    pub const DEFAULT_STDERR_CAPTURE_MAX_BYTES: usize = 64 << 10;

    pub fn new(cmd: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: Self::DEFAULT_SHELL.into(),
            cmd: cmd.into(),
            work_dir: work_dir.into(),
            time_limit: Self::DEFAULT_TIME_LIMIT,
            output_limit_bytes: Self::DEFAULT_OUTPUT_LIMIT_BYTES,
            stderr_capture_max_bytes: Self::DEFAULT_STDERR_CAPTURE_MAX_BYTES,
        }
    }

    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn output_limit_bytes(mut self, limit: usize) -> Self {
        self.output_limit_bytes = limit;
        self
    }

    pub fn stderr_capture_max_bytes(mut self, limit: usize) -> Self {
        self.stderr_capture_max_bytes = limit;
        self
    }

    pub fn get_command(&self) -> &str {
        &self.cmd
    }

    pub fn get_work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn get_time_limit(&self) -> Duration {
        self.time_limit
    }

    fn spawn(&self, stdout: Stdio, stderr: Stdio) -> anyhow::Result<Child> {
        Command::new(&self.shell)
            .args(["-c", &self.cmd])
            .current_dir(&self.work_dir)
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to spawn '{} -c {}' in {}",
                    self.shell.to_string_lossy(),
                    self.cmd,
                    self.work_dir.to_string_lossy(),
                )
            })
    }

    /// Runs the program with `input` on stdin until it exits, the time limit
    /// elapses, or stdout outgrows the output ceiling. In the latter two
    /// cases the child is killed together with everything it forked.
    ///
    /// Errors are harness failures (cannot spawn, broken pipes on our side),
    /// never properties of the program under test.
    pub async fn run(&self, input: &[u8]) -> anyhow::Result<RunOutcome> {
        let mut proc = self.spawn(Stdio::piped(), Stdio::piped())?;
        let mut group = ProcessGroup::of(&proc);
        let mut stdin = proc.stdin.take().context("Failed to open stdin")?;
        let mut stdout = proc.stdout.take().context("Failed to open stdout")?;
        let mut stderr = proc.stderr.take().context("Failed to open stderr")?;

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let output_limit = self.output_limit_bytes;
        let stderr_limit = self.stderr_capture_max_bytes as u64;

        let start_at = tokio::time::Instant::now();
        let res = tokio::time::timeout(self.time_limit, async {
            let fut_stdin = async move {
                let res = stdin.write_all(input).await;
                drop(stdin); // NOTE: the child sees EOF only once this is closed
                match res {
                    // the program may exit without reading all of its input
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    res => res.map_err(Interrupt::from),
                }
            };
            let fut_stdout = async {
                (&mut stdout)
                    .take(output_limit as u64 + 1)
                    .read_to_end(&mut stdout_buf)
                    .await?;
                if stdout_buf.len() > output_limit {
                    return Err(Interrupt::OutputLimit);
                }
                Ok(())
            };
            let fut_stderr = async {
                (&mut stderr)
                    .take(stderr_limit)
                    .read_to_end(&mut stderr_buf)
                    .await?;
                tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await?;
                Ok::<_, Interrupt>(())
            };
            let fut_exit_status = async { proc.wait().await.map_err(Interrupt::from) };
            tokio::try_join!(fut_stdin, fut_stdout, fut_stderr, fut_exit_status)
        })
        .await;

        let elapsed = start_at.elapsed();

        let termination = match res {
            Err(_) => {
                kill(&mut proc, &mut group, "TLE").await;
                Termination::TimedOut
            }
            Ok(Err(Interrupt::OutputLimit)) => {
                kill(&mut proc, &mut group, "OLE").await;
                stdout_buf.truncate(output_limit);
                Termination::OutputLimitExceeded
            }
            Ok(Err(Interrupt::Io(e))) => {
                kill(&mut proc, &mut group, "broken").await;
                return Err(e).context("Failed to communicate with subprocess");
            }
            Ok(Ok((_, _, _, status))) => termination_of(status),
        };

        Ok(RunOutcome {
            termination,
            stdout: stdout_buf,
            stderr: stderr_buf,
            elapsed,
            saved_stdout: None,
        })
    }

    /// Same as [`run`](Self::run), then persists the captured stdout to `dest`.
    pub async fn run_and_save(&self, input: &[u8], dest: &Path) -> anyhow::Result<RunOutcome> {
        let mut outcome = self.run(input).await?;
        tokio::fs::write(dest, &outcome.stdout)
            .await
            .with_context(|| format!("Failed to save stdout to {}", dest.to_string_lossy()))?;
        outcome.saved_stdout = Some(dest.to_owned());
        Ok(outcome)
    }

    /// Runs once with the terminal attached to stdout/stderr. No time limit.
    pub async fn run_attached(&self, input: &[u8]) -> anyhow::Result<ExitStatus> {
        let mut proc = self.spawn(Stdio::inherit(), Stdio::inherit())?;
        let _group = ProcessGroup::of(&proc);
        let mut stdin = proc.stdin.take().context("Failed to open stdin")?;
        match stdin.write_all(input).await {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                return Err(e).context("Failed to pass input to stdin")
            }
            _ => (),
        }
        drop(stdin);
        proc.wait().await.context("Failed to wait for subprocess")
    }
}

/// The process group a child leads. Whatever is still in it is killed on
/// drop, so subshells and pipelines do not outlive the run.
struct ProcessGroup(Option<Pid>);

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self(child.id().map(|id| Pid::from_raw(id as i32)))
    }

    fn kill(&mut self, why: &str) {
        let Some(pgid) = self.0.take() else {
            return;
        };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => (),
            Err(e) => log::warn!("Failed to kill {} process group {}: {}", why, pgid, e),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill("leftover");
    }
}

async fn kill(proc: &mut Child, group: &mut ProcessGroup, why: &str) {
    group.kill(why);
    // reaps the shell itself
    proc.kill()
        .await
        .unwrap_or_else(|e| log::warn!("Failed to kill {} process: {:#}", why, e));
}

fn termination_of(status: ExitStatus) -> Termination {
    match status.code() {
        Some(code) => Termination::Exited(code),
        None => Termination::Signaled,
    }
}
