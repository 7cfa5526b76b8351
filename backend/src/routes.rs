use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::{StatusCode, header};
use actix_web::{HttpResponse, web};
use log::{error, info, warn};
use serde::Deserialize;
use std::path::PathBuf;

use crate::pages;
use crate::pipeline::{DiagnosisService, MSG_FAILED, PipelineError};
use crate::session::{DoctorAnnotation, Session, SessionService, SessionState};
use crate::storage::local::UPLOADS_MOUNT;

#[derive(Debug, Deserialize)]
pub struct ValidationForm {
    #[serde(default)]
    pub validasi: Option<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, uploads_dir: Option<PathBuf>) {
    cfg.service(
        web::resource("/")
            .route(web::get().to(upload_form))
            .route(web::post().to(submit_upload)),
    )
    .service(
        web::resource("/hasil")
            .route(web::get().to(show_result))
            .route(web::post().to(annotate_result)),
    )
    .service(
        web::resource("/validasi")
            .route(web::get().to(show_validation))
            .route(web::post().to(submit_validation)),
    );

    if let Some(dir) = uploads_dir {
        cfg.service(Files::new(UPLOADS_MOUNT, dir));
    }
}

fn html(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Redirects to `location` and stores `state` in the session cookie.
fn redirect_with_state(
    sessions: &SessionService,
    state: &SessionState,
    location: &str,
    on_error: impl FnOnce() -> String,
) -> HttpResponse {
    match sessions.cookie(state) {
        Ok(cookie) => HttpResponse::SeeOther()
            .insert_header((header::LOCATION, location))
            .cookie(cookie)
            .finish(),
        Err(e) => {
            error!("Failed to encode session: {}", e);
            html(StatusCode::INTERNAL_SERVER_ERROR, on_error())
        }
    }
}

async fn upload_form() -> HttpResponse {
    html(StatusCode::OK, pages::upload_page(None))
}

fn upload_failed(err: PipelineError) -> HttpResponse {
    if err.is_rejection() {
        warn!("Upload rejected: {}", err);
    } else {
        error!("Upload failed: {}", err);
    }
    html(err.status_code(), pages::upload_page(Some(err.user_message())))
}

async fn submit_upload(
    service: web::Data<DiagnosisService>,
    sessions: web::Data<SessionService>,
    session: Session,
    payload: Multipart,
) -> HttpResponse {
    let upload = match service.stage(payload).await {
        Ok(upload) => upload,
        Err(e) => return upload_failed(e),
    };

    let analysis = match service.analyze(upload).await {
        Ok(analysis) => analysis,
        Err(e) => return upload_failed(e),
    };

    info!(
        "Analysis complete: {} stored at {}",
        analysis.result.label, analysis.stored.url
    );

    let mut state = session.0;
    state.record_result(analysis.result, analysis.stored.url.clone());
    match sessions.cookie(&state) {
        Ok(cookie) => HttpResponse::SeeOther()
            .insert_header((header::LOCATION, "/hasil"))
            .cookie(cookie)
            .finish(),
        Err(e) => {
            error!("Failed to encode session: {}", e);
            // Nothing will ever display the stored image.
            if let Err(e) = service.discard(&analysis.stored).await {
                warn!("Failed to discard upload {}: {}", analysis.stored.key, e);
            }
            html(
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::upload_page(Some(MSG_FAILED)),
            )
        }
    }
}

async fn show_result(session: Session) -> HttpResponse {
    let state = session.0;
    if !state.has_result() {
        return redirect("/");
    }
    html(StatusCode::OK, pages::result_page(&state, None))
}

/// Applies the submitted annotation; `Err` carries the page to re-render.
fn apply_annotation(
    state: &mut SessionState,
    form: &ValidationForm,
) -> Result<(), &'static str> {
    let raw = form.validasi.as_deref().unwrap_or("");
    let annotation = DoctorAnnotation::parse(raw).map_err(|e| {
        warn!("Rejected doctor validation: {}", e);
        "Please enter a validation of at most 500 characters."
    })?;
    state.annotate(annotation).map_err(|_| MSG_FAILED)?;
    info!("Doctor validation recorded");
    Ok(())
}

async fn annotate_result(
    sessions: web::Data<SessionService>,
    session: Session,
    form: web::Form<ValidationForm>,
) -> HttpResponse {
    let mut state = session.0;
    if !state.has_result() {
        return redirect("/");
    }

    if let Err(message) = apply_annotation(&mut state, &form) {
        return html(StatusCode::BAD_REQUEST, pages::result_page(&state, Some(message)));
    }

    redirect_with_state(&sessions, &state, "/validasi", || {
        pages::result_page(&state, Some(MSG_FAILED))
    })
}

async fn show_validation(session: Session) -> HttpResponse {
    let state = session.0;
    if !state.has_result() {
        return redirect("/");
    }
    html(StatusCode::OK, pages::validation_page(&state, None))
}

async fn submit_validation(
    sessions: web::Data<SessionService>,
    session: Session,
    form: web::Form<ValidationForm>,
) -> HttpResponse {
    let mut state = session.0;
    if !state.has_result() {
        return redirect("/");
    }

    if let Err(message) = apply_annotation(&mut state, &form) {
        return html(
            StatusCode::BAD_REQUEST,
            pages::validation_page(&state, Some(message)),
        );
    }

    redirect_with_state(&sessions, &state, "/validasi", || {
        pages::validation_page(&state, Some(MSG_FAILED))
    })
}
