//! A scripted [`HttpTransport`] double: requests are matched by method and
//! path, each match consumed at most once unless `repeat` is set, so a
//! scenario can assert on call order while still allowing a handler to
//! answer polling-style repeated requests (e.g. a capabilities refresh).

use std::sync::Mutex;

use bytes::Bytes;
use hyper::{HeaderMap, Method, Uri, header};
use icaldav::error::DavError;
use icaldav::transport::{CancelToken, HttpTransport, RawResponse};

pub struct ScriptedResponse {
    pub method: Method,
    pub path_suffix: String,
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: String,
    pub repeat: bool,
}

impl ScriptedResponse {
    pub fn new(method: Method, path_suffix: &str, status: u16, body: &str) -> Self {
        Self {
            method,
            path_suffix: path_suffix.to_string(),
            status,
            headers: Vec::new(),
            body: body.to_string(),
            repeat: false,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }
}

pub struct FakeTransport {
    scripts: Mutex<Vec<ScriptedResponse>>,
    pub calls: Mutex<Vec<(Method, String)>>,
}

impl FakeTransport {
    pub fn new(scripts: Vec<ScriptedResponse>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl HttpTransport for FakeTransport {
    async fn send(
        &self,
        method: Method,
        uri: Uri,
        _headers: HeaderMap,
        _body: Option<Bytes>,
        _cancel: &CancelToken,
    ) -> Result<RawResponse, DavError> {
        let path = uri.path().to_string();
        self.calls.lock().unwrap().push((method.clone(), path.clone()));

        let mut scripts = self.scripts.lock().unwrap();
        let idx = scripts
            .iter()
            .position(|s| s.method == method && path.ends_with(&s.path_suffix));

        let Some(idx) = idx else {
            return Err(DavError::http(
                599,
                format!("no scripted response for {method} {path}"),
            ));
        };

        let script = if scripts[idx].repeat {
            ScriptedResponse {
                method: scripts[idx].method.clone(),
                path_suffix: scripts[idx].path_suffix.clone(),
                status: scripts[idx].status,
                headers: scripts[idx].headers.clone(),
                body: scripts[idx].body.clone(),
                repeat: true,
            }
        } else {
            scripts.remove(idx)
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &script.headers {
            headers.insert(
                header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                header::HeaderValue::from_str(value).unwrap(),
            );
        }

        Ok(RawResponse {
            status: script.status,
            headers,
            body: Bytes::from(script.body),
        })
    }
}
