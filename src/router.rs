//! Radix-tree path matcher.
//!
//! One tree per HTTP method. O(path-length) lookup. The matcher knows
//! nothing about handlers, middleware or failures: it maps a method and a
//! path to an [`Endpoint`] and hands back the path parameters. Both the
//! [`App`](crate::App) and the [`DebugMux`](crate::debug::DebugMux) own a
//! private instance, so their route tables can never leak into each other.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::{InsertError, Router as MatchitRouter};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// The transport-facing function a route resolves to.
pub(crate) type Endpoint = Arc<dyn Fn(Request) -> BoxFuture<Response> + Send + Sync>;

pub(crate) struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers `endpoint` under `(method, path)`.
    ///
    /// Path parameters use `{name}` syntax. A path that collides with an
    /// existing registration fails and leaves the existing one bound.
    pub(crate) fn insert(&mut self, method: Method, path: &str, endpoint: Endpoint) -> Result<(), Error> {
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(path, endpoint)
            .map_err(|source| match source {
                InsertError::Conflict { .. } => Error::RouteConflict {
                    method,
                    path: path.to_owned(),
                    source,
                },
                _ => Error::InvalidRoute { method, path: path.to_owned(), source },
            })
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Endpoint, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let endpoint = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((endpoint, params))
    }

    /// Routes one request. A miss is a bare `404 Not Found`.
    pub(crate) fn dispatch(&self, mut req: Request) -> BoxFuture<Response> {
        match self.lookup(req.method(), req.path()) {
            Some((endpoint, params)) => {
                req.params = params;
                endpoint(req)
            }
            None => Box::pin(async { Response::status(StatusCode::NOT_FOUND) }),
        }
    }
}
