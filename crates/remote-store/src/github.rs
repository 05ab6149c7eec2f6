//! Repository contents API client.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.
//! Objects are addressed as `{base}/repos/{owner}/{repo}/contents/{path}`
//! on a single branch.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use repovault_protocol::Settings;

use crate::{ObjectStore, RemoteObject, StoreError, StoreFuture};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// Characters left unescaped in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: ContentRef,
}

#[derive(Debug, Deserialize)]
struct ContentRef {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

/// Contents API client bound to one repository branch.
pub struct GitHubStore {
    http: reqwest::Client,
    base_url: String,
    owner: String,
    repo: String,
    branch: String,
}

impl GitHubStore {
    /// Creates a client for the repository named in `settings`.
    pub fn new(settings: &Settings) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", settings.token))
                .map_err(|_| StoreError::InvalidToken)?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("repovault/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(API_VERSION),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            branch: settings.branch.clone(),
        })
    }

    /// Sets a custom API base URL (enterprise hosts, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn contents_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url,
            utf8_percent_encode(&self.owner, SEGMENT),
            utf8_percent_encode(&self.repo, SEGMENT),
            encoded.join("/")
        )
    }

    async fn fetch(&self, path: &str) -> Result<RemoteObject, StoreError> {
        let url = self.contents_url(path);
        let resp = self
            .http
            .get(&url)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(path, status, body));
        }

        let body: ContentsResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;

        // Large objects come back without inline content.
        let content = if body.content.trim().is_empty() && body.size > 0 {
            self.fetch_raw(path).await?
        } else {
            decode_content(&body.content)?
        };

        debug!(path, bytes = content.len(), "fetched object");
        Ok(RemoteObject {
            content,
            token: body.sha,
        })
    }

    async fn fetch_raw(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.contents_url(path);
        let resp = self
            .http
            .get(&url)
            .query(&[("ref", self.branch.as_str())])
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(path, status, body));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn store(
        &self,
        path: &str,
        content: &[u8],
        token: Option<&str>,
        message: &str,
    ) -> Result<String, StoreError> {
        let req = PutRequest {
            message,
            content: STANDARD.encode(content),
            branch: &self.branch,
            sha: token,
        };
        let resp = self
            .http
            .put(self.contents_url(path))
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(path, status, body));
        }

        let body: PutResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
        debug!(path, bytes = content.len(), "stored object");
        Ok(body.content.sha)
    }

    async fn remove(&self, path: &str, token: &str, message: &str) -> Result<(), StoreError> {
        let req = DeleteRequest {
            message,
            sha: token,
            branch: &self.branch,
        };
        let resp = self
            .http
            .delete(self.contents_url(path))
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(path, status, body));
        }
        debug!(path, "deleted object");
        Ok(())
    }
}

impl ObjectStore for GitHubStore {
    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, RemoteObject> {
        Box::pin(self.fetch(path))
    }

    fn put<'a>(
        &'a self,
        path: &'a str,
        content: &'a [u8],
        token: Option<&'a str>,
        message: &'a str,
    ) -> StoreFuture<'a, String> {
        Box::pin(self.store(path, content, token, message))
    }

    fn delete<'a>(
        &'a self,
        path: &'a str,
        token: &'a str,
        message: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.remove(path, token, message))
    }
}

/// Decodes inline base64 content, which the API wraps every 60 characters.
fn decode_content(content: &str) -> Result<Vec<u8>, StoreError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| StoreError::Decode(format!("base64: {e}")))
}

/// Maps a non-success status to the error taxonomy.
fn status_error(path: &str, status: StatusCode, body: String) -> StoreError {
    match status.as_u16() {
        401 => StoreError::Auth { status: 401 },
        403 | 429 if body.to_ascii_lowercase().contains("rate limit") => {
            StoreError::RateLimited(body)
        }
        429 => StoreError::RateLimited(body),
        403 => StoreError::Auth { status: 403 },
        404 => StoreError::NotFound(path.to_string()),
        409 => StoreError::Conflict(path.to_string()),
        // Missing or mismatched `sha` on update is reported as a validation error.
        422 if body.contains("sha") => StoreError::Conflict(path.to_string()),
        s => StoreError::Api { status: s, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn settings() -> Settings {
        Settings {
            token: "test-token".into(),
            owner: "octo".into(),
            repo: "vault".into(),
            branch: "main".into(),
        }
    }

    /// Reads one full HTTP request (headers plus Content-Length body).
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = vec![0u8; 8192];
        loop {
            let n = stream.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Starts a mock HTTP server answering each connection with the next
    /// `(status, body)` pair. Received requests are sent on the channel.
    async fn mock_server(
        responses: Vec<(u16, String)>,
    ) -> (String, mpsc::UnboundedReceiver<String>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let req = read_request(&mut stream).await;
                let _ = tx.send(req);

                let resp = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, rx, handle)
    }

    fn client(url: String) -> GitHubStore {
        GitHubStore::new(&settings()).unwrap().with_base_url(url)
    }

    #[tokio::test]
    async fn get_decodes_wrapped_base64() {
        let encoded = STANDARD.encode(b"hello world, this is chunk data");
        let wrapped = format!("{}\\n{}", &encoded[..20], &encoded[20..]);
        let json = format!(r#"{{"sha":"abc123","size":31,"content":"{wrapped}","encoding":"base64"}}"#);
        let (url, mut rx, handle) = mock_server(vec![(200, json)]).await;

        let obj = client(url).get("assets/a b/chunk_00001.gz").await.unwrap();
        assert_eq!(obj.content, b"hello world, this is chunk data");
        assert_eq!(obj.token, "abc123");

        let req = rx.recv().await.unwrap();
        assert!(req.starts_with("GET /repos/octo/vault/contents/assets/a%20b/chunk_00001.gz?ref=main"));
        assert!(req.to_ascii_lowercase().contains("authorization: bearer test-token"));

        handle.abort();
    }

    #[tokio::test]
    async fn get_large_object_falls_back_to_raw() {
        let json = r#"{"sha":"big1","size":5,"content":"","encoding":"none"}"#.to_string();
        let (url, mut rx, handle) =
            mock_server(vec![(200, json), (200, "RAWBY".to_string())]).await;

        let obj = client(url).get("big.bin").await.unwrap();
        assert_eq!(obj.content, b"RAWBY");
        assert_eq!(obj.token, "big1");

        let _first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.contains(RAW_MEDIA_TYPE));

        handle.abort();
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (url, _rx, handle) =
            mock_server(vec![(404, r#"{"message":"Not Found"}"#.into())]).await;
        let err = client(url).get("data.json").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(p) if p == "data.json"));
        handle.abort();
    }

    #[tokio::test]
    async fn put_sends_base64_and_token() {
        let json = r#"{"content":{"sha":"new-sha","path":"data.json"}}"#.to_string();
        let (url, mut rx, handle) = mock_server(vec![(200, json)]).await;

        let token = client(url)
            .put("data.json", b"{}", Some("old-sha"), "Update registry")
            .await
            .unwrap();
        assert_eq!(token, "new-sha");

        let req = rx.recv().await.unwrap();
        assert!(req.starts_with("PUT /repos/octo/vault/contents/data.json"));
        let body = &req[req.find("\r\n\r\n").unwrap() + 4..];
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["content"], STANDARD.encode(b"{}"));
        assert_eq!(value["sha"], "old-sha");
        assert_eq!(value["branch"], "main");
        assert_eq!(value["message"], "Update registry");

        handle.abort();
    }

    #[tokio::test]
    async fn put_create_omits_sha() {
        let json = r#"{"content":{"sha":"s1"}}"#.to_string();
        let (url, mut rx, handle) = mock_server(vec![(201, json)]).await;

        client(url).put("x", b"1", None, "create").await.unwrap();
        let req = rx.recv().await.unwrap();
        let body = &req[req.find("\r\n\r\n").unwrap() + 4..];
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert!(value.get("sha").is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn put_stale_token_is_conflict() {
        let (url, _rx, handle) = mock_server(vec![(
            409,
            r#"{"message":"data.json does not match abc"}"#.into(),
        )])
        .await;
        let err = client(url)
            .put("data.json", b"{}", Some("abc"), "m")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        handle.abort();
    }

    #[tokio::test]
    async fn delete_sends_sha() {
        let (url, mut rx, handle) =
            mock_server(vec![(200, r#"{"content":null}"#.into())]).await;
        client(url).delete("a/b", "sha-1", "Delete a/b").await.unwrap();

        let req = rx.recv().await.unwrap();
        assert!(req.starts_with("DELETE /repos/octo/vault/contents/a/b"));
        assert!(req.contains("\"sha\":\"sha-1\""));
        handle.abort();
    }

    #[tokio::test]
    async fn unauthorized_is_auth_failure() {
        let (url, _rx, handle) =
            mock_server(vec![(401, r#"{"message":"Bad credentials"}"#.into())]).await;
        let err = client(url).get("data.json").await.unwrap_err();
        assert!(matches!(err, StoreError::Auth { status: 401 }));
        assert!(!err.is_retryable());
        handle.abort();
    }

    #[test]
    fn status_mapping() {
        let s = |code: u16| StatusCode::from_u16(code).unwrap();
        assert!(matches!(
            status_error("p", s(403), "API rate limit exceeded".into()),
            StoreError::RateLimited(_)
        ));
        assert!(matches!(
            status_error("p", s(403), "Resource not accessible".into()),
            StoreError::Auth { status: 403 }
        ));
        assert!(matches!(
            status_error("p", s(422), "\"sha\" wasn't supplied.".into()),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            status_error("p", s(422), "content too large".into()),
            StoreError::Api { status: 422, .. }
        ));
        assert!(status_error("p", s(503), String::new()).is_retryable());
    }

    #[test]
    fn contents_url_encodes_segments() {
        let store = GitHubStore::new(&settings())
            .unwrap()
            .with_base_url("http://h/");
        assert_eq!(
            store.contents_url("assets/my file#1.iso/metadata.json"),
            "http://h/repos/octo/vault/contents/assets/my%20file%231.iso/metadata.json"
        );
    }

    #[test]
    fn invalid_token_rejected() {
        let mut s = settings();
        s.token = "bad\ntoken".into();
        assert!(matches!(
            GitHubStore::new(&s),
            Err(StoreError::InvalidToken)
        ));
    }
}
