//! Pipeline wiring.
//!
//! ```text
//! ByteSource ─▶ FramerTask ─▶ RecordQueue ─▶ Sender ─▶ collector
//!                                               ▲
//!                  link events ─▶ LinkState ◀───┴─── AddressResolver
//! ```
//!
//! Tasks are spawned once and never stopped.

use std::sync::Arc;
use std::thread::JoinHandle;

use log::info;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::framer::{ByteSource, FramerTask};
use crate::link::LinkState;
use crate::queue::RecordQueue;
use crate::resolver::{AddressResolver, NameResolver};
use crate::sender::{Sender, SenderStats};

/// Stack size of every pipeline task.
pub const TASK_STACK_SIZE: usize = 8 * 1024;

/// Shared state of the pipeline, created once at startup.
pub struct Bridge {
    config: BridgeConfig,
    queue: Arc<RecordQueue>,
    link: Arc<LinkState>,
}

impl Bridge {
    /// Validate `config` and allocate the queue and link state.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            queue: Arc::new(RecordQueue::new(config.queue_capacity)),
            link: Arc::new(LinkState::new()),
            config,
        })
    }

    /// Link state handle for the link-event source.
    pub fn link(&self) -> Arc<LinkState> {
        Arc::clone(&self.link)
    }

    pub fn queue(&self) -> Arc<RecordQueue> {
        Arc::clone(&self.queue)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Request the first resolution and spawn resolver, sender and framer.
    pub fn start<S, R>(self, source: S, resolver: R) -> Result<BridgeHandles>
    where
        S: ByteSource + Send + 'static,
        R: NameResolver,
    {
        // Start resolving as soon as the link allows
        self.link.request_resolve();

        let resolver = AddressResolver::new(&self.config, Arc::clone(&self.link), resolver)
            .spawn(TASK_STACK_SIZE)
            .map_err(|e| spawn_failed("resolver", e))?;

        let sender = Sender::new(&self.config, Arc::clone(&self.queue), Arc::clone(&self.link));
        let stats = sender.stats();
        let sender = sender
            .spawn(TASK_STACK_SIZE)
            .map_err(|e| spawn_failed("sender", e))?;

        let framer = FramerTask::new(source, self.config.framer, Arc::clone(&self.queue))
            .spawn(TASK_STACK_SIZE)
            .map_err(|e| spawn_failed("framer", e))?;

        info!(
            "bridge started: collector {}:{}, queue {} bytes, frames up to {} bytes",
            self.config.collector.host,
            self.config.collector.port,
            self.config.queue_capacity,
            self.config.framer.max_frame_len
        );

        Ok(BridgeHandles {
            framer,
            resolver,
            sender,
            stats,
            link: self.link,
            queue: self.queue,
        })
    }
}

fn spawn_failed(task: &str, e: std::io::Error) -> BridgeError {
    BridgeError::Platform(format!("failed to spawn {} task: {}", task, e))
}

/// Running pipeline.
pub struct BridgeHandles {
    pub framer: JoinHandle<()>,
    pub resolver: JoinHandle<()>,
    pub sender: JoinHandle<()>,
    pub stats: Arc<SenderStats>,
    pub link: Arc<LinkState>,
    pub queue: Arc<RecordQueue>,
}
