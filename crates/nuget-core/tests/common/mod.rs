//! Shared fixtures: an in-process mock feed server and `.nupkg` builders.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;

/// A canned response for one request path.
#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.into().into_bytes(),
        }
    }

    pub fn atom(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "application/atom+xml",
            body: body.into().into_bytes(),
        }
    }

    pub fn bytes(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/octet-stream",
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }
}

struct MockState {
    routes: HashMap<String, Reply>,
    requests: Mutex<Vec<String>>,
    authorizations: Mutex<Vec<String>>,
}

/// Mock feed bound to `127.0.0.1:0`. Routes match on the request path;
/// anything unrouted answers 404.
pub struct MockFeed {
    pub base: String,
    state: Arc<MockState>,
}

impl MockFeed {
    /// Start a server. `routes` receives the server's base URL
    /// (`http://127.0.0.1:port`) so bodies can link back to it.
    pub async fn start<F>(routes: F) -> Self
    where
        F: FnOnce(&str) -> Vec<(String, Reply)>,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock feed");
        let base = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(MockState {
            routes: routes(&base).into_iter().collect(),
            requests: Mutex::new(Vec::new()),
            authorizations: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(handle).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock feed error");
        });

        Self { base, state }
    }

    /// Every request seen so far, as path plus query.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    /// `Authorization` header values, in request order.
    pub fn authorizations(&self) -> Vec<String> {
        self.state.authorizations.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.split('?').next() == Some(path))
            .count()
    }
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> Response {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    state.requests.lock().unwrap().push(target);
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().unwrap_or_default().to_string();
        state.authorizations.lock().unwrap().push(value);
    }

    match state.routes.get(uri.path()) {
        Some(reply) => (
            StatusCode::from_u16(reply.status).unwrap(),
            [(header::CONTENT_TYPE, reply.content_type)],
            reply.body.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Bytes of a minimal `.nupkg` for `id` at `version`.
pub fn nupkg_bytes(id: &str, version: &str, description: &str) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        zip.start_file(format!("{}.nuspec", id), SimpleFileOptions::default())
            .unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{}</id>
    <version>{}</version>
    <authors>Fixture Author</authors>
    <description>{}</description>
  </metadata>
</package>"#,
            id, version, description
        )
        .unwrap();
        zip.start_file("lib/netstandard2.0/placeholder.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"placeholder").unwrap();
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// Write `{dir}/{id}.{version}.nupkg` and return its path.
pub fn write_nupkg(dir: &Path, id: &str, version: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{}.{}.nupkg", id, version));
    std::fs::write(&path, nupkg_bytes(id, version, &format!("{} fixture", id))).unwrap();
    path
}
