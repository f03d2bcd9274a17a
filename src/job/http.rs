//! HTTP job kind: a synchronous GET request.

use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::job::{Job, JobOptions, Value, Work};

struct HttpGet {
    url: Url,
}

impl Work for HttpGet {
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
        let response = reqwest::blocking::get(self.url.clone())?;
        let status = response.status();
        let body = response.text()?;
        info!(url = %self.url, status = %status, "request completed");
        job.notify_complete(Value::String(body))?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "http-get"
    }
}

impl Job {
    /// Creates a job that performs a blocking GET and completes with the
    /// UTF-8 response body.
    pub fn http_get(url: Url, options: JobOptions) -> Arc<Self> {
        Self::with_work(HttpGet { url }, options)
    }
}
