use std::path::{Component, PathBuf};

use actix_files::NamedFile;
use actix_web::cookie::Cookie;
use actix_web::error::ErrorNotFound;
use actix_web::http::{header, Method};
use actix_web::{get, post, web, HttpRequest, HttpResponse, ResponseError, Result};
use chrono::{SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tera::Tera;

use crate::database;
use crate::error::{AppError, AppResult};
use crate::message_database::{MessageStore, LATEST_LIMIT};
use crate::rate_limit::{rate_limit_headers, RateGovernor};
use crate::visitor_database::VisitorTracker;

pub struct AppState {
    pub tera: Tera,
    pub pool: SqlitePool,
    pub messages: MessageStore,
    pub visitors: VisitorTracker,
    pub governor: RateGovernor,
    pub trust_proxy_headers: bool,
    pub static_dir: PathBuf,
}

const VISITOR_COOKIE: &str = "visitor_id";

#[derive(Deserialize, Default)]
struct MessageForm {
    name: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitorForm {
    visitor_id: Option<String>,
}

#[derive(Serialize)]
struct CountTdo {
    count: i64,
}

#[derive(Serialize)]
struct HealthTdo {
    status: &'static str,
    timestamp: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_messages)
        .service(post_message)
        .service(post_visitor)
        .service(get_visitor_count)
        .service(get_health)
        .service(get_static)
        .service(get_index)
        .service(post_index);
}

/// Malformed JSON bodies get the same error shape as every other rejection.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        tracing::debug!("rejected request body: {}", err);
        AppError::validation("Request body must be valid JSON").into()
    })
}

#[get("/api/messages")]
async fn get_messages(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let messages = data.messages.list_latest(LATEST_LIMIT).await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[post("/api/messages")]
async fn post_message(
    req: HttpRequest,
    form: web::Json<MessageForm>,
    data: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let client = client_address(&req, data.trust_proxy_headers);
    let info = data.governor.check(&client)?;

    let message = data
        .messages
        .append(form.name.as_deref(), form.text.as_deref())
        .await?;
    tracing::info!("message {} posted by {}", message.id, client);

    let mut response = HttpResponse::Created();
    for header in rate_limit_headers(&info) {
        response.insert_header(header);
    }
    Ok(response.json(message))
}

#[post("/api/visitors")]
async fn post_visitor(
    form: web::Json<VisitorForm>,
    data: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let count = data
        .visitors
        .record_visitor(form.visitor_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(CountTdo { count }))
}

#[get("/api/visitors/count")]
async fn get_visitor_count(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let count = data.visitors.visitor_count().await?;
    Ok(HttpResponse::Ok().json(CountTdo { count }))
}

#[get("/api/health")]
async fn get_health(data: web::Data<AppState>) -> HttpResponse {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    match database::check_health(&data.pool).await {
        Ok(()) => HttpResponse::Ok().json(HealthTdo {
            status: "ok",
            timestamp,
        }),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthTdo {
                status: "unavailable",
                timestamp,
            })
        }
    }
}

#[get("/static/{filename:.*}")]
async fn get_static(req: HttpRequest, data: web::Data<AppState>) -> Result<NamedFile> {
    let path = PathBuf::from(req.match_info().query("filename"));
    if path.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(ErrorNotFound("not found"));
    }
    Ok(NamedFile::open(data.static_dir.join(path))?)
}

#[get("/")]
async fn get_index(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    render_index(&req, &data, &MessageForm::default(), None).await
}

/// Form submission from the index page; same admission and rules as the API.
#[post("/")]
async fn post_index(
    req: HttpRequest,
    form: web::Form<MessageForm>,
    data: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let client = client_address(&req, data.trust_proxy_headers);
    let posted = match data.governor.check(&client) {
        Ok(_) => {
            data.messages
                .append(form.name.as_deref(), form.text.as_deref())
                .await
        }
        Err(e) => Err(e),
    };

    match posted {
        Ok(message) => {
            tracing::info!("message {} posted by {} via form", message.id, client);
            Ok(HttpResponse::SeeOther()
                .insert_header((header::LOCATION, "/"))
                .finish())
        }
        Err(e @ AppError::Storage(_)) | Err(e @ AppError::Template(_)) => Err(e),
        Err(e) => render_index(&req, &data, &form, Some(&e)).await,
    }
}

/// Any other GET renders the index page so client-side routes resolve.
pub async fn fallback(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    if req.method() != Method::GET {
        return Ok(HttpResponse::NotFound().finish());
    }
    render_index(&req, &data, &MessageForm::default(), None).await
}

/// Renders the guestbook and records the page view against the visitor
/// cookie, issuing a fresh id when the browser has none.
async fn render_index(
    req: &HttpRequest,
    data: &AppState,
    form: &MessageForm,
    rejection: Option<&AppError>,
) -> AppResult<HttpResponse> {
    let (visitor_id, issued) = match req.cookie(VISITOR_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => (cookie.value().to_string(), false),
        _ => (new_visitor_id(), true),
    };
    let visitor_count = data.visitors.record_visitor(Some(&visitor_id)).await?;

    let max_messages = data.messages.max_messages();
    let messages = data.messages.list_latest(LATEST_LIMIT).await?;
    let message_count = data.messages.count().await?;

    let mut context = tera::Context::new();
    context.insert("messages", &messages);
    context.insert("message_count", &message_count);
    context.insert("visitor_count", &visitor_count);
    context.insert("max_messages", &max_messages);
    context.insert("error", &rejection.map(|e| e.to_string()));
    context.insert("name", form.name.as_deref().unwrap_or(""));
    context.insert("text", form.text.as_deref().unwrap_or(""));
    let output = data.tera.render("index.html", &context)?;

    let mut response = match rejection {
        Some(e) => HttpResponse::build(e.status_code()),
        None => HttpResponse::Ok(),
    };
    if let Some(AppError::RateLimited { retry_after_secs }) = rejection {
        response.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
    }
    if issued {
        response.cookie(
            Cookie::build(VISITOR_COOKIE, visitor_id)
                .path("/")
                .http_only(true)
                .permanent()
                .finish(),
        );
    }
    Ok(response
        .content_type("text/html; charset=utf-8")
        .body(output))
}

fn new_visitor_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

fn client_address(req: &HttpRequest, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(addr) = req.connection_info().realip_remote_addr() {
            return addr.to_string();
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
