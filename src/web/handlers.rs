use actix_web::{web, HttpRequest, HttpResponse, Responder};
use futures_util::stream;
use log::{debug, error, info, warn};
use serde_json::json;
use tera::Context;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::document;
use crate::model::{self, CompletionError};
use crate::session::MAX_EXCERPT_CHARS;
use crate::web::models::{
    ChatRequest, HistoryResponse, PreviewResponse, SessionQuery, UploadResponse,
};
use crate::AppState;

pub const API_KEY_HEADER: &str = "X-OpenAI-Key";
pub const SESSION_HEADER: &str = "X-Session-Id";
pub const MISSING_KEY_NOTICE: &str = "Please add your OpenAI API key to continue.";

// Returns the caller's API key, or the response that ends the request
fn require_api_key(req: &HttpRequest) -> Result<String, HttpResponse> {
    let key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if key.is_empty() {
        info!("Refusing {} {}: no API key", req.method(), req.path());
        return Err(HttpResponse::Unauthorized().json(json!({ "error": MISSING_KEY_NOTICE })));
    }
    Ok(key.to_string())
}

fn internal_error(e: anyhow::Error) -> HttpResponse {
    error!("Session store error: {:#}", e);
    HttpResponse::InternalServerError().json(json!({
        "error": "Internal server error"
    }))
}

// Index page handler
pub async fn index(data: web::Data<AppState>) -> impl Responder {
    let mut context = Context::new();
    context.insert("title", "PDF-aware Chatbot");
    context.insert("model", data.model.model());
    context.insert("excerpt_chars", &MAX_EXCERPT_CHARS);
    match data.tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => {
            error!("Template error: {}", e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// PDF upload: extracted once per session, later uploads are ignored
pub async fn upload_document(
    data: web::Data<AppState>,
    http: HttpRequest,
    query: web::Query<SessionQuery>,
    body: web::Bytes,
) -> HttpResponse {
    if let Err(resp) = require_api_key(&http) {
        return resp;
    }
    if body.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "No document uploaded" }));
    }

    let session_id = query.session_id.unwrap_or_else(Uuid::new_v4);
    let already_loaded = match data.sessions.inspect(session_id, |s| s.has_document()) {
        Ok(loaded) => loaded.unwrap_or(false),
        Err(e) => return internal_error(e),
    };
    if already_loaded {
        info!("Session {} already has a document; ignoring upload", session_id);
        return HttpResponse::Ok().json(UploadResponse {
            session_id,
            cached: true,
            page_count: None,
            message: "A document is already loaded for this session.".to_string(),
        });
    }

    info!("Extracting {} byte upload for session {}", body.len(), session_id);
    let extracted = match web::block(move || document::extract_pdf_text(&body)).await {
        Ok(Ok(extracted)) => extracted,
        Ok(Err(e)) => {
            warn!("Unreadable upload for session {}: {:#}", session_id, e);
            return HttpResponse::UnprocessableEntity().json(json!({
                "error": format!("Could not read the uploaded PDF: {}", e)
            }));
        }
        Err(e) => {
            error!("PDF extraction task failed: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "error": "Internal server error"
            }));
        }
    };

    let page_count = extracted.page_count;
    let stored = match data
        .sessions
        .with_session(session_id, |session| session.cache_document(extracted.text))
    {
        Ok(stored) => stored,
        Err(e) => return internal_error(e),
    };

    if !stored {
        info!("Session {} cached a document concurrently; keeping it", session_id);
        return HttpResponse::Ok().json(UploadResponse {
            session_id,
            cached: true,
            page_count: None,
            message: "A document is already loaded for this session.".to_string(),
        });
    }

    HttpResponse::Ok().json(UploadResponse {
        session_id,
        cached: false,
        page_count: Some(page_count),
        message: format!("Loaded {} page(s).", page_count),
    })
}

pub async fn document_preview(
    data: web::Data<AppState>,
    http: HttpRequest,
    query: web::Query<SessionQuery>,
) -> HttpResponse {
    if let Err(resp) = require_api_key(&http) {
        return resp;
    }

    // No id means no session yet, so there is nothing to preview
    let Some(session_id) = query.session_id else {
        return HttpResponse::Ok().json(PreviewResponse {
            session_id: None,
            loaded: false,
            preview: None,
        });
    };
    let preview = match data
        .sessions
        .inspect(session_id, |s| s.document().map(document::preview))
    {
        Ok(preview) => preview.flatten(),
        Err(e) => return internal_error(e),
    };

    HttpResponse::Ok().json(PreviewResponse {
        session_id: Some(session_id),
        loaded: preview.is_some(),
        preview,
    })
}

pub async fn history(
    data: web::Data<AppState>,
    http: HttpRequest,
    query: web::Query<SessionQuery>,
) -> HttpResponse {
    if let Err(resp) = require_api_key(&http) {
        return resp;
    }

    let Some(session_id) = query.session_id else {
        return HttpResponse::Ok().json(HistoryResponse {
            session_id: None,
            turns: Vec::new(),
        });
    };
    match data.sessions.inspect(session_id, |s| s.turns().to_vec()) {
        Ok(turns) => HttpResponse::Ok().json(HistoryResponse {
            session_id: Some(session_id),
            turns: turns.unwrap_or_default(),
        }),
        Err(e) => internal_error(e),
    }
}

pub async fn reset_session(
    data: web::Data<AppState>,
    http: HttpRequest,
    query: web::Query<SessionQuery>,
) -> HttpResponse {
    if let Err(resp) = require_api_key(&http) {
        return resp;
    }

    if let Some(session_id) = query.session_id {
        if let Err(e) = data.sessions.clear(session_id) {
            return internal_error(e);
        }
    }
    HttpResponse::NoContent().finish()
}

// Chat API endpoint: streams the reply as plain text chunks
pub async fn chat(
    data: web::Data<AppState>,
    http: HttpRequest,
    req: web::Json<ChatRequest>,
) -> HttpResponse {
    let api_key = match require_api_key(&http) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    if req.message.trim().is_empty() {
        return HttpResponse::NoContent().finish();
    }

    let session_id = req.session_id.unwrap_or_else(Uuid::new_v4);
    info!(
        "Chat request from session {}: {} characters",
        session_id,
        req.message.len()
    );
    debug!("Prompt: {}", req.message);

    let context = match data.sessions.submit_user_turn(session_id, &req.message) {
        Ok(context) => context,
        Err(e) => return internal_error(e),
    };

    // The user turn stays in history even if the call fails
    let deltas = match data.model.stream_chat(&api_key, &context).await {
        Ok(deltas) => deltas,
        Err(e) => {
            error!("Model error for session {}: {}", session_id, e);
            return HttpResponse::BadGateway()
                .insert_header((SESSION_HEADER, session_id.to_string()))
                .json(json!({
                    "error": format!("Failed to generate response: {}", e),
                    "kind": e.kind(),
                    "session_id": session_id,
                }));
        }
    };

    let (tx, rx) = mpsc::unbounded_channel::<Result<web::Bytes, CompletionError>>();
    let state = data.clone();
    actix_web::rt::spawn(async move {
        let result = model::collect_reply(deltas, |delta| {
            let _ = tx.send(Ok(web::Bytes::copy_from_slice(delta.as_bytes())));
        })
        .await;

        match result {
            Ok(reply) => {
                if let Err(e) = state.sessions.record_reply(session_id, reply) {
                    error!("Failed to update session history: {:#}", e);
                }
            }
            Err(e) => {
                error!("Reply for session {} failed mid-stream: {}", session_id, e);
                let _ = tx.send(Err(e));
            }
        }
        // tx drops here, after history is updated, which ends the body
    });

    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header((SESSION_HEADER, session_id.to_string()))
        .streaming(body)
}
