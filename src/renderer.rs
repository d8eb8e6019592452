use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
};
use tracing::{debug, error, info, warn};

use crate::{error::RenderError, jobs::JobStore, ticker::Ticker};

/// Everything the renderer needs to produce one video.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub job_id: String,
    pub ticker_path: PathBuf,
    pub video_path: PathBuf,
    pub frame_step: u32,
}

impl RenderJob {
    /// Ticker and video live side by side in `work_dir`, named after the job.
    pub fn new(work_dir: &Path, job_id: &str, frame_step: u32) -> Self {
        Self {
            job_id: job_id.to_owned(),
            ticker_path: work_dir.join(format!("{job_id}.json")),
            video_path: work_dir.join(format!("{job_id}.mp4")),
            frame_step,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub video_path: PathBuf,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &RenderJob) -> Result<RenderOutput, RenderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    pub blender_path: PathBuf,
    pub script_path: PathBuf,
    pub use_xvfb: bool,
    pub python_path: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            blender_path: PathBuf::from("/usr/bin/blender"),
            script_path: PathBuf::from("render/blender_script.py"),
            use_xvfb: true,
            python_path: None,
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Runs Blender headless with the scene script:
///
/// `[xvfb-run -a] blender --background --python <script> -- <ticker> <job_id> <frame_step>`
#[derive(Debug, Clone)]
pub struct BlenderRenderer {
    settings: RendererSettings,
}

impl BlenderRenderer {
    pub fn new(settings: RendererSettings) -> Self {
        Self { settings }
    }

    pub fn command_line(&self, job: &RenderJob) -> (OsString, Vec<OsString>) {
        let mut args: Vec<OsString> = vec![
            self.settings.blender_path.clone().into(),
            "--background".into(),
            "--python".into(),
            self.settings.script_path.clone().into(),
            "--".into(),
            job.ticker_path.clone().into(),
            job.job_id.clone().into(),
            job.frame_step.to_string().into(),
        ];

        if self.settings.use_xvfb {
            args.insert(0, "-a".into());
            ("xvfb-run".into(), args)
        } else {
            let program = args.remove(0);
            (program, args)
        }
    }
}

#[async_trait]
impl Renderer for BlenderRenderer {
    async fn render(&self, job: &RenderJob) -> Result<RenderOutput, RenderError> {
        let (program, args) = self.command_line(job);
        debug!(job_id = %job.job_id, ?program, ?args, "running renderer");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(python_path) = &self.settings.python_path {
            cmd.env("PYTHONPATH", python_path);
        }

        // Own process group, so a timeout takes down xvfb-run, Xvfb and Blender together.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RenderError::Spawn {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let run = async {
            tokio::join!(
                child.wait(),
                read_pipe(stdout_pipe),
                read_pipe(stderr_pipe)
            )
        };
        let outcome = tokio::time::timeout(self.settings.timeout, run).await;
        let (status, stdout, stderr) = match outcome {
            Ok(finished) => finished,
            Err(_) => {
                warn!(job_id = %job.job_id, "renderer timed out, killing process group");
                kill_process_tree(&mut child).await;
                return Err(RenderError::Timeout(self.settings.timeout.as_secs()));
            }
        };
        let status = status.map_err(|source| RenderError::Io {
            path: program.to_string_lossy().into_owned(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        debug!(job_id = %job.job_id, %stdout, "renderer stdout");
        debug!(job_id = %job.job_id, %stderr, "renderer stderr");

        if !status.success() {
            return Err(RenderError::Exit {
                status: status.to_string(),
                stderr: tail(&stderr, 2000).to_owned(),
            });
        }

        if !tokio::fs::try_exists(&job.video_path).await.unwrap_or(false) {
            return Err(RenderError::NoOutput(job.video_path.display().to_string()));
        }

        Ok(RenderOutput {
            video_path: job.video_path.clone(),
            stdout,
            stderr,
        })
    }
}

/// Writes the ticker as JSON for the renderer script to pick up.
pub async fn write_ticker(path: &Path, ticker: &Ticker) -> Result<(), RenderError> {
    let io_error = |source| RenderError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let data = serde_json::to_vec(ticker)?;
    tokio::fs::write(path, data).await.map_err(io_error)
}

/// Renders one job to completion, records the outcome in `store` and removes
/// the ticker file.
pub async fn process_job(store: JobStore, renderer: Arc<dyn Renderer>, job: RenderJob) {
    info!(job_id = %job.job_id, frame_step = job.frame_step, "render started");

    match renderer.render(&job).await {
        Ok(output) => {
            info!(job_id = %job.job_id, video = %output.video_path.display(), "render finished");
            store.complete(&job.job_id, output.video_path).await;
        }
        Err(e) => {
            error!(job_id = %job.job_id, "render failed: {e}");
            store.fail(&job.job_id, e.to_string()).await;
        }
    }

    if let Err(e) = tokio::fs::remove_file(&job.ticker_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(job_id = %job.job_id, "failed to remove ticker file: {e}");
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            warn!("failed to read renderer output: {e}");
        }
    }
    buf
}

#[cfg(unix)]
async fn kill_process_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: killpg only sends a signal. The group id is the pid of a child
        // spawned as its own group leader and not yet reaped.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            warn!(pid, "killpg failed: {}", std::io::Error::last_os_error());
        }
    }
    if let Err(e) = child.kill().await {
        warn!("failed to reap renderer: {e}");
    }
}

#[cfg(not(unix))]
async fn kill_process_tree(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("failed to kill renderer: {e}");
    }
}

fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text.trim();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].trim()
}
