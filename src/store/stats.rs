use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub bytes_downloaded: u64,
    pub bytes_uploaded: u64,
    pub get_requests: u64,
    pub put_requests: u64,
    pub failed_requests: u64,
    #[serde(with = "duration_ms")]
    pub request_time: Duration,
}

impl StoreStats {
    pub fn new() -> Self {
        StoreStats::default()
    }

    pub fn add_get(&mut self, start_time: Instant, end_time: Instant, bytes: u64) {
        self.get_requests += 1;
        self.bytes_downloaded += bytes;
        self.request_time += end_time - start_time;
    }

    pub fn add_put(&mut self, start_time: Instant, end_time: Instant, bytes: u64) {
        self.put_requests += 1;
        self.bytes_uploaded += bytes;
        self.request_time += end_time - start_time;
    }

    pub fn add_failure(&mut self) {
        self.failed_requests += 1;
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }
}
