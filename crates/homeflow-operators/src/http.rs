use async_trait::async_trait;
use homeflow_core::status::{BAD_REQUEST, INTERNAL_SERVER_ERROR, SERVICE_UNAVAILABLE};
use homeflow_core::{Context, FunctionArguments, Operator, OperatorIO};
use reqwest::header::CONTENT_TYPE;

/// HTTP requests; the response body becomes the step output
pub struct OpCurl {
    client: reqwest::Client,
}

impl OpCurl {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        args: &FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        let Some(url) = args.get("url") else {
            return OperatorIO::error(BAD_REQUEST, "Missing argument \"url\"");
        };
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), url);
        for header in args.get_all("header") {
            match header.split_once(':') {
                Some((key, value)) => request = request.header(key.trim(), value.trim()),
                None => tracing::warn!("Ignoring malformed header \"{}\"", header),
            }
        }

        if method != reqwest::Method::GET && method != reqwest::Method::DELETE {
            if let Some(body) = args.get("body") {
                request = request.body(body.to_string());
            } else if input.is_object() {
                request = request.json(&input.to_json());
            } else if !input.is_empty() {
                request = request.body(input.get_string());
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return OperatorIO::error(INTERNAL_SERVER_ERROR, format!("HTTP request failed: {}", e))
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                return OperatorIO::error(INTERNAL_SERVER_ERROR, format!("Failed to read response: {}", e))
            }
        };
        tracing::debug!("Response status: {}", status);

        if !status.is_success() {
            return OperatorIO::error(
                status.as_u16(),
                format!("{} returned {}: {}", url, status, String::from_utf8_lossy(&body)),
            );
        }
        match content_type {
            Some(ct) => OperatorIO::bytes_with_content_type(body.to_vec(), ct),
            None => OperatorIO::bytes(body.to_vec()),
        }
    }
}

impl Default for OpCurl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for OpCurl {
    fn name(&self) -> &str {
        "curl"
    }

    async fn execute(
        &self,
        ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        let method = match function.to_lowercase().as_str() {
            "get" => reqwest::Method::GET,
            "post" => reqwest::Method::POST,
            "put" => reqwest::Method::PUT,
            "delete" => reqwest::Method::DELETE,
            _ => return OperatorIO::error(BAD_REQUEST, format!("Unknown function: {}", function)),
        };

        tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                OperatorIO::error(SERVICE_UNAVAILABLE, "Request cancelled")
            }
            output = self.request(method, &args, input) => output,
        }
    }

    fn functions(&self) -> Vec<String> {
        ["get", "post", "put", "delete"]
            .iter()
            .map(|f| f.to_string())
            .collect()
    }

    fn possible_args(&self, function: &str) -> Vec<String> {
        let mut args = vec!["url".to_string(), "header".to_string()];
        if matches!(function.to_lowercase().as_str(), "post" | "put") {
            args.push("body".to_string());
        }
        args
    }
}
