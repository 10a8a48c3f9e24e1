/**
 * Source fetching for the in-memory blob special case of the normalizer.
 *
 * When a frame points into a `blob:` URL the parser fetches the blob body
 * to look for a source-map directive. The content is already resident on
 * the host side, so the fetch is synchronous by design - the one
 * deliberate blocking point in the agent, on a rare diagnostic path. It
 * sits behind this trait so tests never perform real I/O.
 */
use base64::Engine as _;

pub trait BlobFetcher: Send + Sync {
    /// Returns the textual content behind `url`, or `None` on any failure.
    fn fetch(&self, url: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// UreqFetcher - the default implementation
// ---------------------------------------------------------------------------

/**
 * Fetches over HTTP with short timeouts; `data:` URLs are decoded inline
 * (base64 payloads included) without touching the network.
 */
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(std::time::Duration::from_secs(3)))
            .timeout_global(Some(std::time::Duration::from_secs(5)))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }

    fn decode_data_url(url: &str) -> Option<String> {
        let (meta, payload) = url.strip_prefix("data:")?.split_once(',')?;
        if meta.ends_with(";base64") {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(payload)
                .ok()?;
            String::from_utf8(bytes).ok()
        } else {
            Some(payload.to_string())
        }
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobFetcher for UreqFetcher {
    fn fetch(&self, url: &str) -> Option<String> {
        if url.starts_with("data:") {
            return Self::decode_data_url(url);
        }

        let response = self.agent.get(url).call().ok()?;
        if !(200..300).contains(&response.status().as_u16()) {
            return None;
        }
        response.into_body().read_to_string().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_base64_payload_is_decoded() {
        let fetcher = UreqFetcher::new();
        /* "hello" */
        let content = fetcher.fetch("data:text/plain;base64,aGVsbG8=").unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn data_url_plain_payload_passes_through() {
        let fetcher = UreqFetcher::new();
        let content = fetcher.fetch("data:text/plain,raw-content").unwrap();
        assert_eq!(content, "raw-content");
    }
}
