//! Embedded chat page.
//!
//! The files under `frontend/` are compiled into the binary with
//! `include_str!`, so the gateway ships as a single executable.

use axum::{
    Router,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};

const INDEX_HTML: &str = include_str!("../../../frontend/index.html");
const STYLE_CSS: &str = include_str!("../../../frontend/style.css");
const APP_JS: &str = include_str!("../../../frontend/app.js");

pub fn frontend_router() -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/static/style.css", get(css_handler))
        .route("/static/app.js", get(js_handler))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

fn asset(content_type: &'static str, body: &'static str) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn css_handler() -> Response {
    asset("text/css; charset=utf-8", STYLE_CSS)
}

async fn js_handler() -> Response {
    asset("application/javascript; charset=utf-8", APP_JS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn serves_index_html() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = frontend_router().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Anemone"));
        assert!(html.contains("/static/app.js"));
    }

    #[tokio::test]
    async fn script_speaks_socket_protocol() {
        let req = Request::builder().uri("/static/app.js").body(Body::empty()).unwrap();
        let response = frontend_router().oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/javascript; charset=utf-8"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let js = String::from_utf8(body.to_vec()).unwrap();
        assert!(js.contains("user_message"));
        assert!(js.contains("stream_chunk"));
    }
}
