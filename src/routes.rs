use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::{
    auth::require_api_token,
    config::Config,
    error::ApiError,
    jobs::{JobStatus, JobStore},
    models::{JobCreated, JobStatusBody, Message, RenderRequest},
    renderer::{process_job, write_ticker, BlenderRenderer, RenderJob, Renderer},
    ticker::Ticker,
};

#[derive(Clone)]
pub struct AppState {
    pub api_token: Arc<str>,
    pub jobs: JobStore,
    pub renderer: Arc<dyn Renderer>,
    pub work_dir: PathBuf,
    pub envelope_width: f64,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_token: config.api_token.as_str().into(),
            jobs: JobStore::new(),
            renderer: Arc::new(BlenderRenderer::new(config.renderer.clone())),
            work_dir: config.work_dir.clone(),
            envelope_width: config.envelope_width,
        }
    }
}

pub fn create_routes(state: AppState) -> Router {
    let protected = Router::new()
        .route("/render", post(render))
        .route("/status/:job_id", get(status))
        .route("/result/:job_id", get(result))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ));

    Router::new()
        .route("/", get(index))
        .merge(protected)
        .with_state(state)
}

async fn index() -> Json<Message> {
    Json(Message {
        message: "Word ticker renderer is running".to_owned(),
    })
}

// The body is parsed by hand so malformed payloads get a 400 with our error shape.
async fn render(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JobCreated>, ApiError> {
    let request = RenderRequest::from_slice(&body)?;
    let ticker = Ticker::from_named_entities(&request.naments, state.envelope_width)?;

    let job_id = state.jobs.create().await;
    info!(
        %job_id,
        mentions = request.naments.len(),
        lanes = ticker.lanes().len(),
        frames = ticker.frame_count(),
        "received render request"
    );

    let job = RenderJob::new(&state.work_dir, &job_id, request.frame_step);
    if let Err(e) = write_ticker(&job.ticker_path, &ticker).await {
        // The client never sees this id, so it must not linger in the registry.
        state.jobs.remove(&job_id).await;
        return Err(e.into());
    }

    tokio::spawn(process_job(state.jobs.clone(), state.renderer.clone(), job));

    Ok(Json(JobCreated { job_id }))
}

async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusBody>, ApiError> {
    let job = state.jobs.get(&job_id).await.ok_or(ApiError::JobNotFound)?;
    Ok(Json(JobStatusBody { status: job.status }))
}

async fn result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = state.jobs.get(&job_id).await.ok_or(ApiError::JobNotFound)?;
    match job.status {
        JobStatus::Processing => return Err(ApiError::NotFinished),
        JobStatus::Failed => {
            return Err(ApiError::RenderFailed(
                job.error.unwrap_or_else(|| "unknown error".to_owned()),
            ))
        }
        JobStatus::Done => {}
    }

    let video_path = job.video_path.ok_or(ApiError::VideoMissing)?;
    let video = match tokio::fs::read(&video_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ApiError::VideoMissing),
        Err(e) => return Err(ApiError::Internal(format!("failed to read video: {e}"))),
    };

    let filename = video_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{job_id}.mp4"));
    info!(%job_id, bytes = video.len(), "sending video");

    let headers = [
        (CONTENT_TYPE, "video/mp4".to_owned()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    Ok((headers, video).into_response())
}
