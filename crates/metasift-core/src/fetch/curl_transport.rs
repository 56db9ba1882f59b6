//! libcurl-backed [`Transport`].
//!
//! Each request runs on the blocking pool under `tokio::time::timeout`. When
//! the timeout fires the awaiting future is dropped, the cancel guard trips and
//! the progress callback aborts the transfer.

use std::future::Future;
use std::str;
use std::time::Duration;

use curl::easy::Easy;

use crate::cancel::Cancellation;

use super::parse::parse_headers;
use super::{FetchRequest, FetchResponse, Transport, TransportError};

const MAX_REDIRECTS: u32 = 10;
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CurlTransport {
    user_agent: String,
    max_body_bytes: u64,
}

impl CurlTransport {
    pub fn new(user_agent: Option<String>, max_body_bytes: u64) -> Self {
        Self {
            user_agent: user_agent
                .unwrap_or_else(|| format!("metasift/{}", env!("CARGO_PKG_VERSION"))),
            max_body_bytes,
        }
    }
}

impl Transport for CurlTransport {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, TransportError>> + Send {
        let user_agent = self.user_agent.clone();
        let max_body = self.max_body_bytes;
        async move {
            let timeout = request.timeout;
            let cancel = Cancellation::new();
            let _guard = cancel.drop_guard();
            let task = tokio::task::spawn_blocking({
                let cancel = cancel.clone();
                move || perform(&request, &user_agent, max_body, &cancel)
            });
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(TransportError::Join(join.to_string())),
                Err(_) => Err(TransportError::Timeout(timeout)),
            }
        }
    }
}

/// Blocking GET. Runs on the current thread.
fn perform(
    request: &FetchRequest,
    user_agent: &str,
    max_body: u64,
    cancel: &Cancellation,
) -> Result<FetchResponse, TransportError> {
    let mut easy = Easy::new();
    easy.url(&request.url)?;
    easy.follow_location(true)?;
    easy.max_redirections(MAX_REDIRECTS)?;
    easy.useragent(user_agent)?;
    easy.connect_timeout(request.timeout.min(MAX_CONNECT_TIMEOUT))?;
    easy.timeout(request.timeout)?;
    easy.progress(true)?;
    if let Some(end) = request.range_end {
        easy.range(&format!("0-{end}"))?;
    }

    let mut headers: Vec<String> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    let mut too_large = false;
    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            if body.len() as u64 + data.len() as u64 > max_body {
                too_large = true;
                // Short write aborts the transfer.
                return Ok(0);
            }
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform()
    };
    if too_large {
        return Err(TransportError::BodyTooLarge { limit: max_body });
    }
    performed?;

    let status = easy.response_code()?;
    if !(200..300).contains(&status) {
        return Err(TransportError::Http(status));
    }

    let parsed = parse_headers(&headers);
    let total_len = if status == 206 {
        parsed.content_range_total
    } else {
        Some(body.len() as u64)
    };
    tracing::trace!(
        url = %request.url,
        status,
        bytes = body.len(),
        ?total_len,
        "fetched"
    );
    Ok(FetchResponse {
        status,
        body,
        total_len,
    })
}
