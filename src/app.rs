use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::db::{Database, SurveyRecord};
use crate::downloader::{self, ExportFormat};
use crate::error::{AppError, Result};
use crate::loader::{self, Grid};
use crate::login::{self, CurrentUser, SessionStore};
use crate::mailer::Mailer;
use crate::reconcile;
use crate::render::Renderer;
use crate::schema;
use crate::storage::{self, ResponseStore};
use crate::submission::Submission;
use crate::templates::{TemplateStore, canonical_survey_id};

/// Everything a handler needs, built once at start-up.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub templates: TemplateStore,
    pub responses: Box<dyn ResponseStore>,
    pub renderer: Renderer,
    pub sessions: SessionStore,
    pub mailer: Option<Mailer>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        config.ensure_dirs()?;
        let db = Database::open(config.database_path())?;
        let responses = storage::open_store(&config, &db);
        let mailer = Mailer::from_config(&config.mail)?;
        if mailer.is_none() {
            log::warn!("No SMTP host configured; sharing surveys by email is disabled");
        }

        Ok(AppState {
            templates: TemplateStore::new(config.upload_dir()),
            sessions: SessionStore::new(Duration::from_secs(config.session_hours * 60 * 60)),
            renderer: Renderer::new()?,
            responses,
            mailer,
            db,
            config,
        })
    }

    fn display_offset(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.config.display_offset_minutes)
    }
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    survey_id: String,
    survey_url: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Deserialize)]
struct DownloadQuery {
    #[serde(default)]
    format: ExportFormat,
}

#[derive(Deserialize)]
struct ShareRequest {
    email: String,
    survey_id: String,
}

#[derive(Serialize)]
struct DashboardEntry {
    id: String,
    filename: String,
    created_at: String,
    url: String,
    responses: usize,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(dashboard))
        .route("/upload", post(upload_survey))
        .route("/download/:survey_id", get(download_responses))
        .route("/share_email", post(share_survey))
        .route("/surveys/:survey_id/delete", post(delete_survey))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    Router::new()
        .route(
            "/login",
            get(login::serve_login_page).post(login::handle_login),
        )
        .route(
            "/signup",
            get(login::serve_signup_page).post(login::handle_signup),
        )
        .route("/logout", get(login::handle_logout))
        .route("/survey/:survey_id", get(show_survey))
        .route("/submit/:survey_id", post(submit_survey))
        .merge(protected)
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state)
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = build_router(state);

    let listener = TcpListener::bind(&bind).await?;
    log::info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|h| h.to_str().ok())
}

/// Load a survey's template grid, telling "no such survey" apart from
/// "file is there but unreadable".
fn load_template(state: &AppState, survey_id: &str) -> Result<Grid> {
    let path = state
        .templates
        .locate(survey_id)?
        .ok_or_else(|| AppError::TemplateNotFound(survey_id.to_string()))?;
    loader::load_grid(path)
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<Html<String>> {
    let host = request_host(&headers);
    let mut entries = Vec::new();
    for survey in state.db.surveys_for_owner(&username)? {
        entries.push(DashboardEntry {
            url: state.config.survey_url(host, &survey.id),
            responses: state.responses.count(&survey.id)?,
            id: survey.id,
            filename: survey.filename,
            created_at: survey.created_at,
        });
    }

    let page = state.renderer.render(
        "dashboard",
        &serde_json::json!({
            "title": "Your surveys",
            "username": username,
            "surveys": entries,
        }),
    )?;
    Ok(Html(page))
}

async fn upload_survey(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::UploadRejected(e.to_string()))?
    {
        if field.name() != Some("surveyFile") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::UploadRejected(e.to_string()))?;
        upload = Some((filename, bytes.to_vec()));
    }

    let (filename, contents) =
        upload.ok_or_else(|| AppError::UploadRejected("No file uploaded".to_string()))?;
    let (survey_id, extension) = state.templates.save(&filename, &contents)?;

    let record = SurveyRecord {
        id: survey_id.clone(),
        owner: username,
        filename,
        extension,
        created_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    if let Err(e) = state.db.register_survey(&record) {
        state.templates.delete(&survey_id)?;
        return Err(e);
    }

    Ok(Json(UploadResponse {
        message: "File uploaded!".to_string(),
        survey_url: state.config.survey_url(request_host(&headers), &survey_id),
        survey_id,
    }))
}

async fn show_survey(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<String>,
) -> Response {
    let rendered = canonical_survey_id(&survey_id).and_then(|survey_id| {
        let grid = load_template(&state, &survey_id)?;
        let fields = schema::infer_fields(state.config.layout, &grid);
        let title = state
            .db
            .find_survey(&survey_id)?
            .map(|survey| survey.filename)
            .unwrap_or_else(|| "Survey".to_string());
        state.renderer.render(
            "survey",
            &serde_json::json!({
                "title": title,
                "survey_id": survey_id,
                "fields": fields,
            }),
        )
    });

    match rendered {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                log::error!("Could not render survey {}: {}", survey_id, e);
            }
            let title = if status == StatusCode::NOT_FOUND {
                "Survey not found"
            } else {
                "Something went wrong"
            };
            (
                status,
                Html(state.renderer.error_page(title, &e.public_message())),
            )
                .into_response()
        }
    }
}

async fn submit_survey(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<String>,
    Json(submission): Json<Submission>,
) -> Result<Json<MessageResponse>> {
    let survey_id = canonical_survey_id(&survey_id)?;
    if state.templates.locate(&survey_id)?.is_none() {
        return Err(AppError::TemplateNotFound(survey_id));
    }

    storage::record_submission(
        state.responses.as_ref(),
        &survey_id,
        submission,
        Utc::now(),
    )?;
    log::info!("Stored response for survey {}", survey_id);

    Ok(Json(MessageResponse {
        message: "Data saved!".to_string(),
    }))
}

/// Reconcile the template with every stored response of a survey.
pub fn export_grid(state: &AppState, survey_id: &str) -> Result<Grid> {
    let path = state
        .templates
        .locate(survey_id)?
        .ok_or_else(|| AppError::TemplateMissing(survey_id.to_string()))?;
    let template = loader::load_grid(path)?;
    let layout = schema::resolve_layout(state.config.layout, &template);
    let responses = state.responses.list(survey_id)?;
    Ok(reconcile::reconcile(
        &template,
        layout,
        &responses,
        state.display_offset(),
    ))
}

async fn download_responses(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(survey_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let survey_id = canonical_survey_id(&survey_id)?;
    if state.db.owned_survey(&survey_id, &username)?.is_none() {
        return Err(AppError::TemplateNotFound(survey_id));
    }

    let grid = export_grid(&state, &survey_id)?;
    let contents = downloader::render_export(&grid, query.format)?;
    downloader::store_export(
        &state.config.export_dir(),
        &survey_id,
        query.format,
        &contents,
    )?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, query.format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                query.format.file_name(&survey_id)
            ),
        )
        .body(Body::from(contents))
        .map_err(|e| AppError::Export(e.to_string()))?;
    Ok(response)
}

async fn share_survey(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(request): Json<ShareRequest>,
) -> Result<Json<MessageResponse>> {
    let survey_id = canonical_survey_id(&request.survey_id)?;
    let survey = state
        .db
        .owned_survey(&survey_id, &username)?
        .ok_or(AppError::TemplateNotFound(survey_id))?;
    let mailer = state
        .mailer
        .clone()
        .ok_or_else(|| AppError::EmailDeliveryFailure("Email is not configured".to_string()))?;

    let url = state.config.survey_url(request_host(&headers), &survey.id);
    let email = request.email;
    tokio::task::spawn_blocking(move || mailer.send_survey_link(&email, &survey.filename, &url))
        .await
        .map_err(|e| AppError::EmailDeliveryFailure(e.to_string()))??;

    Ok(Json(MessageResponse {
        message: "Email sent!".to_string(),
    }))
}

/// Delete a survey together with its responses, template and exports.
pub fn remove_survey(state: &AppState, survey_id: &str) -> Result<()> {
    state.responses.delete_for_survey(survey_id)?;
    state.templates.delete(survey_id)?;
    downloader::delete_exports(&state.config.export_dir(), survey_id)?;
    state.db.delete_survey(survey_id)?;
    log::info!("Deleted survey {}", survey_id);
    Ok(())
}

async fn delete_survey(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(survey_id): Path<String>,
) -> Result<Redirect> {
    let survey_id = canonical_survey_id(&survey_id)?;
    if state.db.owned_survey(&survey_id, &username)?.is_none() {
        return Err(AppError::TemplateNotFound(survey_id));
    }
    remove_survey(&state, &survey_id)?;
    Ok(Redirect::to("/"))
}
