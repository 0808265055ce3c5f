pub mod line;

use crate::net::output::OutFrame;
use async_trait::async_trait;

#[async_trait]
pub trait ClientSink: Send {
    async fn send_frame(&mut self, frame: OutFrame, seq: u64) -> anyhow::Result<()>;

    /// Called once the session's queue is closed and drained.
    async fn shutdown(&mut self) -> anyhow::Result<()>;
}
