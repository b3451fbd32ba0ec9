use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(2000);

/// Destination for flushed lesson drafts.
pub trait DraftSink: Send + 'static {
    fn write(&self, key: &str, content: &serde_json::Value) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// One JSON file per draft under `<workspace>/drafts`.
#[derive(Debug, Clone)]
pub struct FileDraftSink {
    dir: PathBuf,
}

impl FileDraftSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    pub fn read(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let p = self.path_for(key);
        if !p.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&p)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

impl DraftSink for FileDraftSink {
    fn write(&self, key: &str, content: &serde_json::Value) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let p = self.path_for(key);
        let tmp = p.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(content)?)?;
        std::fs::rename(&tmp, &p)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let p = self.path_for(key);
        if p.exists() {
            std::fs::remove_file(p)?;
        }
        Ok(())
    }
}

enum Msg {
    Update {
        key: String,
        content: serde_json::Value,
    },
    Discard {
        key: String,
        ack: Sender<anyhow::Result<()>>,
    },
    Shutdown,
}

/// Debounces draft writes: a draft is flushed once `delay` has passed since
/// its last update. Pending writes are dropped on discard and on shutdown.
/// All sink calls happen on the worker thread, one at a time.
pub struct DraftAutosaver {
    tx: Sender<Msg>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DraftAutosaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftAutosaver").finish_non_exhaustive()
    }
}

impl DraftAutosaver {
    pub fn spawn<S: DraftSink>(sink: S, delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Msg>();
        let worker = std::thread::spawn(move || {
            let mut pending: HashMap<String, (serde_json::Value, Instant)> = HashMap::new();
            loop {
                let next_due = pending.values().map(|(_, due)| *due).min();
                let msg = match next_due {
                    Some(due) => {
                        let wait = due.saturating_duration_since(Instant::now());
                        rx.recv_timeout(wait)
                    }
                    None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                match msg {
                    Ok(Msg::Update { key, content }) => {
                        pending.insert(key, (content, Instant::now() + delay));
                    }
                    Ok(Msg::Discard { key, ack }) => {
                        pending.remove(&key);
                        let _ = ack.send(sink.remove(&key));
                    }
                    Ok(Msg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                let now = Instant::now();
                let due: Vec<String> = pending
                    .iter()
                    .filter(|(_, (_, at))| *at <= now)
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in due {
                    if let Some((content, _)) = pending.remove(&key) {
                        match sink.write(&key, &content) {
                            Ok(()) => debug!(key = %key, "draft autosaved"),
                            Err(e) => warn!(key = %key, error = %e, "draft autosave failed"),
                        }
                    }
                }
            }
            if !pending.is_empty() {
                debug!(count = pending.len(), "dropping pending drafts on shutdown");
            }
        });
        Self {
            tx,
            worker: Some(worker),
        }
    }

    /// Restarts the debounce window for `key`.
    pub fn update(&self, key: &str, content: serde_json::Value) {
        let _ = self.tx.send(Msg::Update {
            key: key.to_string(),
            content,
        });
    }

    /// Drops any pending write for `key` and removes the stored copy. Returns
    /// once the worker has done both, so no earlier write can land afterwards.
    pub fn discard(&self, key: &str) -> anyhow::Result<()> {
        let (ack, done) = mpsc::channel();
        self.tx
            .send(Msg::Discard {
                key: key.to_string(),
                ack,
            })
            .map_err(|_| anyhow::anyhow!("draft autosaver stopped"))?;
        done.recv()
            .map_err(|_| anyhow::anyhow!("draft autosaver stopped"))?
    }
}

impl Drop for DraftAutosaver {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
