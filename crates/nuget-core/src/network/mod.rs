//! Network utilities: the shared HTTP client, retries and streamed downloads.

mod client;
mod download;
mod retry;

pub(crate) use client::race;
pub use client::HttpClient;
pub use download::{download_file, temp_path_for};
pub use retry::{retry_async, RetryConfig};
