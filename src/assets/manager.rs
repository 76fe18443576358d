//! Runs scene loads off the mutation path
//!
//! Every load is a tokio task that calls the [`SceneLoader`] under a timeout
//! and posts a [`LoadCompletion`] on an unbounded channel. The engine drains
//! that channel on its own thread, so load results never race with scene
//! edits.

use super::{LoadError, LoadResult};
use crate::rendering::scene::SceneGraph;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Fetches a model and returns it as a scene graph
#[async_trait]
pub trait SceneLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<SceneGraph, LoadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoadTarget {
    BaseModel(String),
    External(String),
}

impl LoadTarget {
    pub fn source(&self) -> &str {
        match self {
            LoadTarget::BaseModel(uri) => uri,
            LoadTarget::External(path) => path,
        }
    }
}

#[derive(Debug)]
pub struct LoadCompletion {
    pub target: LoadTarget,
    pub attempt: u64,
    pub result: LoadResult,
    pub elapsed: Duration,
}

pub struct AssetManager {
    loader: Arc<dyn SceneLoader>,
    runtime: Handle,
    timeout: Duration,
    completions: UnboundedSender<LoadCompletion>,
}

impl std::fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetManager")
            .field("timeout", &self.timeout)
            .field("loader", &"dyn SceneLoader")
            .finish()
    }
}

impl AssetManager {
    /// Returns the manager and the receiving end of its completion channel
    pub fn new(
        loader: Arc<dyn SceneLoader>,
        runtime: Handle,
        timeout: Duration,
    ) -> (Self, UnboundedReceiver<LoadCompletion>) {
        let (completions, receiver) = unbounded_channel();
        info!("Initializing AssetManager with {:?} load timeout", timeout);
        (
            Self {
                loader,
                runtime,
                timeout,
                completions,
            },
            receiver,
        )
    }

    pub fn begin_load(&self, target: LoadTarget, attempt: u64) {
        let loader = Arc::clone(&self.loader);
        let completions = self.completions.clone();
        let timeout = self.timeout;

        debug!("Spawning load of {} (attempt {})", target.source(), attempt);

        self.runtime.spawn(async move {
            let started = Instant::now();
            let source = target.source().to_string();

            let path = source.clone();
            let mut task = tokio::spawn(async move { loader.load(&path).await });

            let result = match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => {
                    warn!("Load of {} aborted: {}", source, join_error);
                    Err(LoadError::Other {
                        reason: format!("loader task failed: {}", join_error),
                    })
                }
                Err(_) => {
                    task.abort();
                    Err(LoadError::Timeout {
                        source_path: source.clone(),
                        after: timeout,
                    })
                }
            };

            let completion = LoadCompletion {
                target,
                attempt,
                result,
                elapsed: started.elapsed(),
            };
            if completions.send(completion).is_err() {
                debug!("Engine gone before load of {} finished", source);
            }
        });
    }
}
