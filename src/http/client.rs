use super::{Headers, HttpPart, HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, TransportError, TransportResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::debug;

/// `HttpTransport` backed by reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(proxy: Option<&str>, accept_invalid_certs: bool, timeout_secs: u64) -> TransportResult<Self> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .timeout(Duration::from_secs(timeout_secs));

        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| TransportError::InvalidRequest(format!("Invalid proxy '{}': {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self { client })
    }

    async fn multipart_form(parts: Vec<HttpPart>) -> TransportResult<Form> {
        let mut form = Form::new();
        for part in parts {
            form = match part {
                HttpPart::Text { name, value } => form.text(name, value),
                HttpPart::File { name, path, content_type } => {
                    let bytes = tokio::fs::read(&path).await?;
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| name.clone());
                    let part = Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(&content_type)
                        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        debug!("{:?} {}", request.method, request.url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
        };

        let is_multipart = matches!(request.body, RequestBody::Multipart(_));
        for (name, value) in &request.headers {
            // reqwest sets the multipart boundary itself
            if is_multipart && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Multipart(parts) => builder.multipart(Self::multipart_form(parts).await?),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let code = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), value.to_string());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .to_vec();

        debug!("Response {} ({} bytes)", code, body.len());
        Ok(HttpResponse { code, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_with_proxy() {
        assert!(ReqwestTransport::new(Some("http://proxy.local:3128"), true, 30).is_ok());
    }

    #[tokio::test]
    async fn test_multipart_missing_file_is_io_error() {
        let parts = vec![HttpPart::file("uploadedFile", std::path::Path::new("/definitely/missing.irx"))];
        let result = ReqwestTransport::multipart_form(parts).await;
        assert!(matches!(result, Err(TransportError::IoError(_))));
    }
}
