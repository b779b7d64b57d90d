//! Scripted in-memory transport for unit tests.

use super::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError, TransportResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Reply {
    Response(HttpResponse),
    Fail(String),
}

struct Route {
    method: Method,
    pattern: String,
    replies: VecDeque<Reply>,
}

/// Answers requests from routes matched by method and URL substring.
///
/// Each route replays its queued replies in order and keeps repeating the last
/// one. Unmatched requests get a 404. Every request is recorded.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: Method, pattern: &str, response: HttpResponse) -> Self {
        self.push(method, pattern, Reply::Response(response));
        self
    }

    pub fn on_json(self, method: Method, pattern: &str, code: u16, body: serde_json::Value) -> Self {
        self.on(method, pattern, HttpResponse::new(code, body.to_string()))
    }

    pub fn on_error(self, method: Method, pattern: &str, error: &str) -> Self {
        self.push(method, pattern, Reply::Fail(error.to_string()));
        self
    }

    fn push(&self, method: Method, pattern: &str, reply: Reply) {
        let mut routes = self.routes.lock().unwrap();
        if let Some(route) = routes.iter_mut().find(|r| r.method == method && r.pattern == pattern) {
            route.replies.push_back(reply);
        } else {
            routes.push(Route {
                method,
                pattern: pattern.to_string(),
                replies: VecDeque::from(vec![reply]),
            });
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.urls().iter().filter(|u| u.contains(pattern)).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .filter(|r| r.method == request.method && request.url.contains(&r.pattern))
            .max_by_key(|r| r.pattern.len());

        let Some(route) = route else {
            return Ok(HttpResponse::new(404, ""));
        };

        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            None
        };

        match reply.as_ref().or(route.replies.front()) {
            Some(Reply::Response(response)) => Ok(response.clone()),
            Some(Reply::Fail(error)) => Err(TransportError::Connection(error.clone())),
            None => Ok(HttpResponse::new(404, "")),
        }
    }
}
