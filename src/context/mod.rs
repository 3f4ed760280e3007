//! Per-request context handed through the middleware chain to the handler.

use std::collections::HashMap;

use crate::Request;

/// Named captures from the matched route pattern, e.g. `movieId` for
/// `/movies/:movieId`.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A request together with the parameters its route captured.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    /// Wraps a request that did not go through pattern matching.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Shorthand for [`Request::original_url`].
    pub fn original_url(&self) -> &str {
        self.request.original_url()
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[test]
    fn params_lookup() {
        let mut params = PathParams::new();
        assert!(params.is_empty());
        params.insert("movieId".into(), "42".into());
        let ctx = Context::with_params(Request::new(Method::Get, "/movies/42"), params);
        assert_eq!(ctx.params().get("movieId"), Some("42"));
        assert_eq!(ctx.params().get("missing"), None);
        assert_eq!(ctx.original_url(), "/movies/42");
    }

    #[test]
    fn json_body() {
        #[derive(serde::Deserialize)]
        struct Body {
            pattern: Option<String>,
        }

        let ctx = Context::new(
            Request::new(Method::Post, "/clear-cache").with_body(r#"{"pattern":"/movies"}"#),
        );
        let body: Body = ctx.json().unwrap();
        assert_eq!(body.pattern.as_deref(), Some("/movies"));

        let bad = Context::new(Request::new(Method::Post, "/clear-cache").with_body("nope"));
        assert!(bad.json::<Body>().is_err());
    }
}
