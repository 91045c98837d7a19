use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// What the `sessionid` cookie amounted to for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No cookie was sent.
    Anonymous,
    Resolved,
    /// A cookie was sent but matched no account, or the lookup failed.
    Unresolved,
}

impl SessionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionOutcome::Anonymous => "anonymous",
            SessionOutcome::Resolved => "resolved",
            SessionOutcome::Unresolved => "unresolved",
        }
    }
}

/// Attached to responses by the viewer resolver so the response log can name
/// who was served.
#[derive(Debug, Clone)]
pub struct ServedViewer {
    pub session: SessionOutcome,
    pub username: Option<String>,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Log every response at debug level, and 4xx/5xx with the handler's
/// diagnostic report at warn/error.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();

    // Admin routes carry no viewer.
    let (session, viewer) = match response.extensions().get::<ServedViewer>() {
        Some(served) => (
            served.session.as_str(),
            served.username.clone().unwrap_or_default(),
        ),
        None => ("none", String::new()),
    };

    if !(status.is_client_error() || status.is_server_error()) {
        debug!(
            target = "gazette::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms = elapsed_ms,
            session = session,
            viewer = %viewer,
            request_id = request_id,
            "request served",
        );
        return response;
    }

    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .cloned()
        .unwrap_or_else(|| "no diagnostic available".to_string());

    if status.is_server_error() {
        error!(
            target = "gazette::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = elapsed_ms,
            session = session,
            viewer = %viewer,
            source = source,
            detail = %detail,
            chain = ?messages,
            request_id = request_id,
            "request failed",
        );
    } else {
        warn!(
            target = "gazette::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms = elapsed_ms,
            session = session,
            viewer = %viewer,
            source = source,
            detail = %detail,
            request_id = request_id,
            "client request error",
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, middleware, response::IntoResponse, routing::get};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn error_report_is_consumed_and_viewer_kept() {
        let app = Router::new()
            .route(
                "/",
                get(|| async {
                    let mut response = StatusCode::NOT_FOUND.into_response();
                    ErrorReport::from_message("test", StatusCode::NOT_FOUND, "missing")
                        .attach(&mut response);
                    response.extensions_mut().insert(ServedViewer {
                        session: SessionOutcome::Unresolved,
                        username: None,
                    });
                    response
                }),
            )
            .layer(middleware::from_fn(log_responses))
            .layer(middleware::from_fn(set_request_context));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_none());
        assert!(response.extensions().get::<RequestContext>().is_some());
        let served = response.extensions().get::<ServedViewer>().unwrap();
        assert_eq!(served.session, SessionOutcome::Unresolved);
    }
}
