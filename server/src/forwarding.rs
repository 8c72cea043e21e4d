use crate::config::Config;
use crate::error::ForwardError;
use crate::models::{primitive_to_string, BodyEncoding, Credential, ForwardRequest, ForwardResult};
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Header Upnify reads the session token from.
const TOKEN_HEADER: &str = "token";

/// Relays validated requests to Upnify and translates the replies.
#[derive(Debug, Clone)]
pub struct Forwarder {
    http_client: Client,
    base_url: String,
    request_timeout: Duration,
    raw_excerpt_len: usize,
}

impl Forwarder {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self {
            http_client,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            raw_excerpt_len: config.raw_excerpt_len,
        })
    }

    pub async fn forward(
        &self,
        request: &ForwardRequest,
        credential: &Credential,
    ) -> Result<ForwardResult, ForwardError> {
        self.forward_with_timeout(request, credential, self.request_timeout)
            .await
    }

    pub async fn forward_with_timeout(
        &self,
        request: &ForwardRequest,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<ForwardResult, ForwardError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "forward",
            %request_id,
            method = request.verb.as_str(),
            path = %request.path
        );
        self.send(request, credential, timeout).instrument(span).await
    }

    async fn send(
        &self,
        request: &ForwardRequest,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<ForwardResult, ForwardError> {
        validate_required(request)?;

        let url = format!("{}{}", self.base_url, request.path);
        info!("Forwarding to Upnify: {} {}", request.verb.as_str(), url);

        let mut request_builder = self
            .http_client
            .request(request.verb.method(), &url)
            .header(TOKEN_HEADER, credential.as_str())
            .timeout(timeout);

        if !request.query.is_empty() {
            request_builder = request_builder.query(&request.query);
        }

        if let Some(body) = &request.body {
            request_builder = match request.encoding {
                BodyEncoding::Form => {
                    let pairs: Vec<(&str, String)> = body
                        .iter()
                        .filter_map(|(k, v)| primitive_to_string(v).map(|v| (k.as_str(), v)))
                        .collect();
                    request_builder.form(&pairs)
                }
                BodyEncoding::Json => request_builder.json(body),
                BodyEncoding::None => request_builder,
            };
        }

        let response = request_builder.send().await.map_err(|e| {
            error!("Failed to reach Upnify: {:?}", e);
            ForwardError::from_transport(e, timeout)
        })?;

        let status = response.status().as_u16();
        info!("Upnify responded with status {}", status);

        let text = response.text().await.map_err(|e| {
            error!("Failed to read Upnify response body: {:?}", e);
            ForwardError::from_transport(e, timeout)
        })?;

        match serde_json::from_str(&text) {
            Ok(body) => Ok(ForwardResult { status, body }),
            Err(e) => {
                warn!("Upnify returned a non-JSON body (status {}): {}", status, e);
                Err(ForwardError::UpstreamFormat {
                    status,
                    excerpt: excerpt(&text, self.raw_excerpt_len),
                })
            }
        }
    }
}

/// Fails with every missing field at once; nothing is sent upstream.
pub fn validate_required(request: &ForwardRequest) -> Result<(), ForwardError> {
    let missing: Vec<String> = request
        .required
        .iter()
        .filter(|field| !request.has_value(field))
        .map(|field| field.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        warn!("Rejecting request, missing fields: {:?}", missing);
        Err(ForwardError::MissingFields { missing })
    }
}

/// First `max_chars` characters of `text`.
fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
