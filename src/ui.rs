//! Browser-facing pages. All logic lives client-side against the JSON API;
//! these handlers only serve the embedded documents.

use actix_web::http::header::ContentType;
use actix_web::{get, HttpResponse, Responder};

const INDEX_HTML: &str = include_str!("../static/index.html");
const VIEW_HTML: &str = include_str!("../static/view.html");

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(INDEX_HTML)
}

// The id segment is read client-side from the location path.
#[get("/view/{id}")]
pub async fn viewer() -> impl Responder {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(VIEW_HTML)
}
