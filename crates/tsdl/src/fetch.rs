use std::{future::Future, sync::Arc};

use bytes::Bytes;
use reqwest::{header::RANGE, Url};

use crate::{
    error::{TsdlError, TsdlResult},
    util::{http::HttpClient, range::ByteRange},
};

/// Transport used to retrieve playlists, keys and segments.
///
/// Implementations must treat any non-success response as an error.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &Url,
        range: Option<ByteRange>,
    ) -> impl Future<Output = TsdlResult<Bytes>> + Send;
}

impl<F> Fetch for Arc<F>
where
    F: Fetch,
{
    fn fetch(
        &self,
        url: &Url,
        range: Option<ByteRange>,
    ) -> impl Future<Output = TsdlResult<Bytes>> + Send {
        self.as_ref().fetch(url, range)
    }
}

impl Fetch for HttpClient {
    fn fetch(
        &self,
        url: &Url,
        range: Option<ByteRange>,
    ) -> impl Future<Output = TsdlResult<Bytes>> + Send {
        let empty = range.is_some_and(|range| range.is_empty());
        let mut request = self.get(url.clone());
        if let Some(range) = range.and_then(|range| range.to_http_range()) {
            request = request.header(RANGE, range);
        }

        async move {
            if empty {
                return Ok(Bytes::new());
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                if let Ok(body) = response.text().await {
                    tracing::debug!("Error body: {body}");
                }
                return Err(TsdlError::HttpStatus(status));
            }

            Ok(response.bytes().await?)
        }
    }
}
