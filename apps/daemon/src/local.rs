use http_relay_common::{
    HeaderList, RequestEnvelope, ResponseEnvelope, TunnelError, header_list_from_map,
    is_hop_by_hop, method_has_payload, validation::validate_path,
};
use reqwest::{Client, Method};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Delivers tunnelled requests to the local service
///
/// Every request yields a response envelope: local failures become synthetic
/// 502 responses and malformed requests synthetic 400 responses, so the
/// gateway always gets an answer for the call id.
#[derive(Debug, Clone)]
pub struct LocalClient {
    client: Client,
    base_url: String,
}

impl LocalClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TunnelError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TunnelError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Perform the local HTTP call for one request envelope
    pub async fn deliver(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let start_time = Instant::now();
        let id = request.id.clone();

        let method = match Method::from_bytes(request.method.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                warn!(call_id = %id, method = %request.method, "Rejecting invalid method");
                return ResponseEnvelope::synthetic(
                    id,
                    400,
                    format!("Unsupported HTTP method: {}", request.method),
                );
            }
        };

        let path = match validate_path(&request.path) {
            Ok(path) => path,
            Err(e) => {
                warn!(call_id = %id, "Rejecting request path: {}", e);
                return ResponseEnvelope::synthetic(id, 400, e.to_string());
            }
        };

        let url = format!("{}{}", self.base_url, path);
        debug!(call_id = %id, "Forwarding: {} {}", method, url);

        let mut req_builder = self.client.request(method, &url);

        for (name, value) in request.headers.iter() {
            if is_hop_by_hop(name) {
                continue;
            }
            req_builder = req_builder.header(name, value);
        }

        if let Some(body) = request.body.filter(|_| method_has_payload(&request.method)) {
            req_builder = req_builder.body(body);
        }

        match self.read_response(req_builder).await {
            Ok((status, headers, body)) => {
                debug!(
                    call_id = %id,
                    status,
                    "Response ({}ms)",
                    start_time.elapsed().as_millis()
                );
                ResponseEnvelope::new(id, status)
                    .with_headers(headers)
                    .with_body(body)
            }
            Err(e) => {
                error!(call_id = %id, "Local service error: {}", e);
                ResponseEnvelope::synthetic(id, 502, e.to_string())
            }
        }
    }

    async fn read_response(
        &self,
        req_builder: reqwest::RequestBuilder,
    ) -> Result<(u16, HeaderList, String), TunnelError> {
        let response = req_builder
            .send()
            .await
            .map_err(|e| TunnelError::LocalDeliveryFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: HeaderList = header_list_from_map(response.headers())
            .into_iter()
            .filter(|(name, _)| !is_hop_by_hop(name))
            .collect();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TunnelError::LocalDeliveryFailed(e.to_string()))?;

        // Response bodies travel as UTF-8 text
        let body = String::from_utf8_lossy(&bytes).into_owned();
        Ok((status, headers, body))
    }
}
