//! Shared fixtures: an in-memory object store, a scripted encoder and a
//! publisher that records what it was asked to send.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, FutureExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use variant_relay::common::profile::TranscodeProfile;
use variant_relay::config::settings::{AppConfig, ServiceRole};
use variant_relay::infrastructure::queue::JobPublisher;
use variant_relay::infrastructure::storage::{
    ObjectReader, ObjectStore, ObjectWriter, StorageError, StorageResult, StoredObject,
};
use variant_relay::modules::transcode::coordinator::{CoordinatorOptions, TranscodeCoordinator};
use variant_relay::modules::transcode::encoder::{EncodeError, EncodeOutput, Encoder};
use variant_relay::modules::transcode::events::JobDescriptor;

// ----------------------------------------------------------------------------
// Object store
// ----------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    objects: Mutex<HashMap<String, Bytes>>,
    failing: Mutex<HashSet<String>>,
    dispositions: Mutex<Vec<String>>,
    exists_calls: AtomicUsize,
    size_calls: AtomicUsize,
    signed_url_calls: AtomicUsize,
    aborted_writes: AtomicUsize,
}

/// Objects only appear when a writer finishes, like a completed multipart
/// upload. Keys marked with [`MemoryStore::fail_key`] answer every call with a
/// backend error and refuse to finish writes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        self.inner.objects.lock().unwrap().insert(key.to_string(), data.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.objects.lock().unwrap().contains_key(key)
    }

    pub fn read(&self, key: &str) -> Option<Bytes> {
        self.inner.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.inner.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn fail_key(&self, key: &str) {
        self.inner.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn exists_calls(&self) -> usize {
        self.inner.exists_calls.load(Ordering::SeqCst)
    }

    pub fn size_calls(&self) -> usize {
        self.inner.size_calls.load(Ordering::SeqCst)
    }

    pub fn signed_url_calls(&self) -> usize {
        self.inner.signed_url_calls.load(Ordering::SeqCst)
    }

    pub fn aborted_writes(&self) -> usize {
        self.inner.aborted_writes.load(Ordering::SeqCst)
    }

    /// Content-Disposition values passed to `signed_url`, in call order.
    pub fn dispositions(&self) -> Vec<String> {
        self.inner.dispositions.lock().unwrap().clone()
    }

    fn check(&self, key: &str) -> StorageResult<()> {
        if self.inner.failing.lock().unwrap().contains(key) {
            return Err(StorageError::Backend(format!("injected failure for {}", key)));
        }
        Ok(())
    }

    fn lookup(&self, key: &str) -> StorageResult<Bytes> {
        self.check(key)?;
        self.read(key).ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

/// Parses `bytes=a-b` and `bytes=a-` into an inclusive range.
fn parse_range(range: &str, total: usize) -> Option<(usize, usize)> {
    let bounds = range.strip_prefix("bytes=")?;
    let (start, end) = bounds.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end = match end {
        "" => total.checked_sub(1)?,
        end => end.parse::<usize>().ok()?.min(total.checked_sub(1)?),
    };
    (start <= end).then_some((start, end))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.check(key)?;
        Ok(self.contains(key))
    }

    async fn size(&self, key: &str) -> StorageResult<u64> {
        self.inner.size_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(key)?.len() as u64)
    }

    async fn get(&self, key: &str, range: Option<&str>) -> StorageResult<StoredObject> {
        let data = self.lookup(key)?;
        let total = data.len();

        let (slice, content_range) = match range.and_then(|r| parse_range(r, total)) {
            Some((start, end)) => (
                data.slice(start..=end),
                Some(format!("bytes {}-{}/{}", start, end, total)),
            ),
            None => (data, None),
        };

        Ok(StoredObject {
            content_length: Some(slice.len() as u64),
            body: Box::pin(std::io::Cursor::new(slice.to_vec())),
            content_type: Some("video/mp4".to_string()),
            content_range,
            e_tag: Some(format!("\"{}\"", total)),
        })
    }

    async fn create_writer(
        &self,
        key: &str,
        _content_type: &str,
    ) -> StorageResult<Box<dyn ObjectWriter>> {
        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            key: key.to_string(),
            buffer: Vec::new(),
        }))
    }

    async fn signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        content_disposition: &str,
    ) -> StorageResult<String> {
        self.inner.signed_url_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(key)?;
        self.inner
            .dispositions
            .lock()
            .unwrap()
            .push(content_disposition.to_string());
        Ok(format!(
            "https://signed.test/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }
}

struct MemoryWriter {
    store: MemoryStore,
    key: String,
    buffer: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let MemoryWriter { store, key, buffer } = *self;
        if store.check(&key).is_err() {
            return Err(StorageError::UploadFailed(format!("injected failure for {}", key)));
        }
        let len = buffer.len() as u64;
        store.insert(&key, buffer);
        Ok(len)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.store.inner.aborted_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Encoder
// ----------------------------------------------------------------------------

/// Decrements the in-flight gauge even when a pipeline is dropped mid-encode.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Emits `"{profile}@{WxH}:" + input` as a single chunk. Completion waits
/// for the profile's scripted delay, then fails if the profile is scripted to.
#[derive(Default)]
pub struct ScriptedEncoder {
    failing: Mutex<HashSet<&'static str>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    started: AtomicUsize,
}

impl ScriptedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_profile(&self, profile: &'static str) {
        self.failing.lock().unwrap().insert(profile);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn delay_profile(&self, profile: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(profile, delay);
    }

    pub fn delay_all(&self, delay: Duration) {
        for profile in variant_relay::common::profile::PROFILES.iter() {
            self.delay_profile(profile.name, delay);
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

pub fn scripted_output(profile: &TranscodeProfile, input: &[u8]) -> Vec<u8> {
    let mut out = format!("{}@{}:", profile.name, profile.dimensions()).into_bytes();
    out.extend_from_slice(input);
    out
}

#[async_trait]
impl Encoder for ScriptedEncoder {
    async fn encode(
        &self,
        mut input: ObjectReader,
        profile: &TranscodeProfile,
    ) -> Result<EncodeOutput, EncodeError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        let mut source = Vec::new();
        input.read_to_end(&mut source).await.map_err(EncodeError::Input)?;

        let output = Bytes::from(scripted_output(profile, &source));
        let delay = self.delays.lock().unwrap().get(profile.name).copied();
        let fail = self.failing.lock().unwrap().contains(profile.name);

        let completion = async move {
            let _guard = guard;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(EncodeError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "scripted failure".to_string(),
                });
            }
            Ok(())
        }
        .boxed();

        Ok(EncodeOutput {
            stream: stream::once(async move { Ok::<_, std::io::Error>(output) }).boxed(),
            completion,
        })
    }
}

// ----------------------------------------------------------------------------
// Publisher
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPublisher {
    jobs: Mutex<Vec<JobDescriptor>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<JobDescriptor> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobPublisher for RecordingPublisher {
    async fn publish(&self, job: &JobDescriptor) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("broker unavailable");
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Builders
// ----------------------------------------------------------------------------

pub fn test_config() -> AppConfig {
    AppConfig {
        server_port: 0,
        role: ServiceRole::All,
        rabbitmq_url: "amqp://localhost:5672".to_string(),
        transcode_queue: "transcoding_tasks".to_string(),
        minio_url: "http://localhost:9000".to_string(),
        minio_region: "us-east-1".to_string(),
        incoming_bucket: "incoming".to_string(),
        processed_bucket: "processed".to_string(),
        minio_access_key: "minio".to_string(),
        minio_secret_key: "minio123".to_string(),
        ffmpeg_path: "ffmpeg".to_string(),
        max_concurrent_pipelines: 4,
        job_prefetch: 2,
        pipeline_timeout: None,
        retry_backoff: Duration::from_millis(10),
        signed_url_ttl: Duration::from_secs(86_400),
        retry_after_secs: 30,
        max_upload_bytes: 10 * 1024 * 1024,
        cors_origin: "http://localhost:5173".to_string(),
    }
}

pub fn coordinator(
    incoming: &MemoryStore,
    processed: &MemoryStore,
    encoder: &Arc<ScriptedEncoder>,
    options: CoordinatorOptions,
) -> TranscodeCoordinator {
    TranscodeCoordinator::new(
        Arc::new(incoming.clone()),
        Arc::new(processed.clone()),
        encoder.clone(),
        options,
    )
}

pub fn job_payload(name: &str) -> Vec<u8> {
    serde_json::to_vec(&JobDescriptor::new(name)).unwrap()
}
