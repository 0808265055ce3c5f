use crate::config::LineEnding;
use crate::net::sink::ClientSink;
use crate::net::sink::line::LineSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutFrame {
    /// Rendered chat text, written as-is
    Line(String),
    /// Server notice; always terminated by a newline
    Notice(String),
}

pub enum OutEvent {
    /// A complete output frame with sequence number
    Frame(OutFrame, u64),
}

/// Why a frame could not be queued for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The outbound queue is full; this frame is dropped
    Full,
    /// The writer task is gone; the session is dead
    Closed,
}

/// Write capability for one session. Cloning shares the same queue.
#[derive(Clone, Debug)]
pub struct OutputHandle {
    /// Sender for output events
    tx: mpsc::Sender<OutEvent>,
    /// Next sequence number for output frames
    next_seq: Arc<AtomicU64>,
}

impl OutputHandle {
    pub fn new(tx: mpsc::Sender<OutEvent>) -> Self {
        Self {
            tx,
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    #[inline]
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Non-blocking enqueue, used by the registry so a slow client never
    /// stalls delivery to everyone else.
    pub fn try_deliver(&self, frame: OutFrame) -> Result<(), DeliveryFailure> {
        match self.tx.try_send(OutEvent::Frame(frame, self.next_seq())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryFailure::Full),
            Err(TrySendError::Closed(_)) => Err(DeliveryFailure::Closed),
        }
    }

    pub async fn line(&self, s: impl Into<String>) {
        let _ = self.tx.send(OutEvent::Frame(OutFrame::Line(s.into()), self.next_seq())).await;
    }

    pub async fn notice(&self, s: impl Into<String>) {
        let _ = self.tx.send(OutEvent::Frame(OutFrame::Notice(s.into()), self.next_seq())).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drains one session's queue into its sink.
pub struct SessionOut {
    rx: mpsc::Receiver<OutEvent>,
}

impl SessionOut {
    pub fn new(rx: mpsc::Receiver<OutEvent>) -> Self {
        Self { rx }
    }

    /// Runs until every handle is dropped, then shuts the sink down.
    pub async fn run<C>(mut self, mut client: C) -> anyhow::Result<()>
    where
        C: ClientSink,
    {
        while let Some(event) = self.rx.recv().await {
            match event {
                OutEvent::Frame(frame, seq_nr) => client.send_frame(frame, seq_nr).await?,
            }
        }

        client.shutdown().await
    }
}

pub struct SessionIoBundle {
    pub output: OutputHandle,
    pub writer: JoinHandle<()>,
}

/// Spawns the writer task for a connection and returns its handle.
pub fn init_session_output<W>(writer: W, capacity: usize, line_ending: LineEnding) -> SessionIoBundle
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<OutEvent>(capacity.max(1));
    let output_handle = OutputHandle::new(tx);
    let session_out = SessionOut::new(rx);
    let sink = LineSink::new(writer, line_ending);

    let writer = tokio::spawn(async move {
        if let Err(e) = session_out.run(sink).await {
            tracing::debug!(error = %e, "session output closed");
        }
    });

    SessionIoBundle {
        output: output_handle,
        writer,
    }
}
