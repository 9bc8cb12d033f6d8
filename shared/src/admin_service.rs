use crate::http::make_text_response;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::{Ready, ready};

/// Liveness and readiness probes, served on a separate listener from the
/// traffic-bearing service.
///
/// - `GET /health` always answers `ok` while the process is up.
/// - `GET /ready` answers `ok` once `is_ready` returns true, 503 before that.
pub struct AdminService<F> {
    is_ready: F,
}

impl<F> AdminService<F>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self { is_ready }
    }

    fn respond(&self, method: &Method, path: &str) -> Response<Bytes> {
        if method != Method::GET {
            return make_text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
        }

        match path {
            "/health" => make_text_response(StatusCode::OK, "ok\n"),
            "/ready" if (self.is_ready)() => make_text_response(StatusCode::OK, "ok\n"),
            "/ready" => make_text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready\n"),
            _ => make_text_response(StatusCode::NOT_FOUND, "not found\n"),
        }
    }
}

impl<F> Service<Request<Incoming>> for AdminService<F>
where
    F: Fn() -> bool,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let response = self.respond(req.method(), req.uri().path());
        ready(Ok(response.map(|body| Full::new(body).boxed())))
    }
}
