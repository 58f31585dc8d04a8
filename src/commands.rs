//! HTTP routes. Each handler is thin glue around the ingest store or the
//! dataset builder; blocking file and image work runs on the blocking pool.

use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use log::{error, info, warn};
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeFile;

use crate::error::{BuildError, Error, StoreError};
use crate::state::AppState;

/// Largest accepted request body. A 300x300 canvas encodes to well under this.
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

pub const SHAPE_FIELD: &str = "shape";
pub const IMAGE_FIELD: &str = "myImage";
pub const BACKGROUND_FILE_NAME: &str = "fondo.jpg";

const URLENCODED: &str = "application/x-www-form-urlencoded";

const INDEX_HTML: &str = include_str!("../assets/index.html");

pub fn router(state: AppState) -> Router
{
    let data = state.builder.config().clone();
    let background = state.assets_dir.join(BACKGROUND_FILE_NAME);

    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/prepare", get(prepare))
        .route_service("/X.npy", ServeFile::new(data.samples_path()))
        .route_service("/y.npy", ServeFile::new(data.labels_path()))
        .route_service("/fondo.jpg", ServeFile::new(background))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .with_state(state)
}

async fn index() -> Html<&'static str>
{
    Html(INDEX_HTML)
}

/// Upload fields as they arrive in a urlencoded body.
#[derive(Debug, Deserialize)]
struct UploadForm
{
    shape: Option<String>,
    #[serde(rename = "myImage")]
    my_image: Option<String>,
}

/// Stores one drawing with the fields `shape` (label) and `myImage` (data
/// URI), then sends the browser back to the drawing page.
///
/// The fields may come as multipart form data, which is what the drawing
/// page sends, or as a urlencoded form.
async fn upload(State(state): State<AppState>, request: Request) -> Result<Response, Error>
{
    let (shape, image) = if is_urlencoded(&request)
    {
        let Form(form) = Form::<UploadForm>::from_request(request, &())
            .await
            .map_err(|e| Error::BadRequest(e.body_text()))?;
        (form.shape, form.my_image)
    }
    else
    {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| Error::BadRequest(e.body_text()))?;
        read_multipart(multipart).await?
    };

    let shape = shape.ok_or_else(|| Error::BadRequest(format!("missing field {:?}", SHAPE_FIELD)))?;
    let image = image.ok_or_else(|| Error::BadRequest(format!("missing field {:?}", IMAGE_FIELD)))?;

    let ingest = state.ingest.clone();
    tokio::task::spawn_blocking(move || ingest.store_payload(&shape, &image))
        .await
        .map_err(|e| anyhow::anyhow!("Upload task failed: {:?}", e))??;

    Ok((StatusCode::FOUND, [(header::LOCATION, "/")]).into_response())
}

fn is_urlencoded(request: &Request) -> bool
{
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(URLENCODED))
}

async fn read_multipart(mut multipart: Multipart) -> Result<(Option<String>, Option<String>), Error>
{
    let mut shape = None;
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        let value = field.text().await.map_err(|e| Error::BadRequest(e.to_string()))?;
        match name.as_deref()
        {
            Some(SHAPE_FIELD) => shape = Some(value),
            Some(IMAGE_FIELD) => image = Some(value),
            _ => {},
        }
    }
    Ok((shape, image))
}

/// Rebuilds both dataset arrays from everything stored so far.
async fn prepare(State(state): State<AppState>) -> Result<String, Error>
{
    let builder = state.builder.clone();
    let dataset = tokio::task::spawn_blocking(move || builder.build())
        .await
        .map_err(|e| anyhow::anyhow!("Build task failed: {:?}", e))??;

    info!("Prepared dataset with {} samples", dataset.len());
    Ok(format!(
        "Dataset prepared successfully! {} samples ({})",
        dataset.len(),
        dataset.summary()
    ))
}

impl Error
{
    pub fn status_code(&self) -> StatusCode
    {
        match self
        {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Store(StoreError::IOFailure(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Store(_) => StatusCode::BAD_REQUEST,
            Error::Build(BuildError::EmptyDataset) => StatusCode::NOT_FOUND,
            Error::Build(e) if e.is_bad_sample() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error
{
    fn into_response(self) -> Response
    {
        let status = self.status_code();
        if status.is_server_error()
        {
            error!("{:?}", self);
        }
        else
        {
            warn!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}
