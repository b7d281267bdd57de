//! Request handler for `GET /{name}`

use birthdaystore::{Birthday, BirthdayStore, Error as StoreError, Name};
use lancslru::Cache;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::http::{Request, Response};

/// Cache of birthdays keyed by normalized name
pub type BirthdayCache = Cache<Name, Birthday>;

/// Response body for a found birthday
#[derive(Debug, Serialize)]
struct BirthdayBody {
    birthday: String,
}

#[derive(Clone)]
pub struct BirthdayHandler {
    cache: Arc<BirthdayCache>,
    store: Arc<BirthdayStore>,
}

impl BirthdayHandler {
    pub fn new(cache: Arc<BirthdayCache>, store: Arc<BirthdayStore>) -> Self {
        Self { cache, store }
    }

    /// Answer one request. Blocks on a cache miss while the store loads.
    ///
    /// HEAD is answered like GET, without the body.
    pub fn handle(&self, req: &Request) -> Response {
        match req.method.as_str() {
            "GET" => self.route(&req.path),
            "HEAD" => self.route(&req.path).without_body(),
            _ => Response::text(405, "method not allowed").with_header("Allow", "GET, HEAD"),
        }
    }

    fn route(&self, path: &str) -> Response {
        let raw = match path.strip_prefix('/') {
            Some(raw) => raw,
            None => return Response::text(400, "invalid request target"),
        };
        if raw.contains('/') {
            return not_found();
        }

        let name = match percent_decode(raw) {
            Some(name) => name,
            None => return Response::text(400, "invalid name encoding"),
        };
        if name.is_empty() {
            return Response::text(400, "name is required");
        }

        self.get_birthday(Name::from(name))
    }

    fn get_birthday(&self, name: Name) -> Response {
        let key = name.normalize();

        match self.cache.lookup(key, |key| self.store.lookup(key)) {
            Ok(birthday) => {
                let body = BirthdayBody {
                    birthday: birthday.to_string(),
                };
                match serde_json::to_vec(&body) {
                    Ok(json) => Response::json(200, json),
                    Err(e) => {
                        error!(name = %name, error = %e, "failed to encode birthday");
                        internal_error()
                    }
                }
            }
            Err(e) if matches!(e.inner(), StoreError::NotFound) => not_found(),
            Err(e) => {
                error!(name = %name, error = %e, "failed to fetch birthday");
                internal_error()
            }
        }
    }
}

fn not_found() -> Response {
    Response::text(404, "404 page not found")
}

fn internal_error() -> Response {
    Response::text(500, "an unknown error occurred")
}

/// Decode `%XX` escapes in a path segment
///
/// Returns `None` for a truncated or non-hex escape, or if the result is not
/// UTF-8.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}
