//! Async event sources.
//!
//! Every producer other than a display connection is an [`AsyncEventSource`]:
//! it owns one tokio task that pushes [`Inbound`] envelopes into the shared
//! runtime channel and stops as soon as a send fails (consumer dropped) or its
//! own input ends. Sources never touch session state; the event-processing
//! loop is the only mutator.

use crate::{
    CHANNEL_SEND_FAILURES, CHILD_OUTPUT_BYTES, CHILD_OUTPUT_CHUNKS, COMMAND_LINES, Inbound,
    SOURCE_STARTS,
};
use std::sync::atomic::Ordering;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

/// Read size for one child-process output chunk.
pub const CHILD_READ_CHUNK: usize = 4096;

/// Trait implemented by any async event producer. Implementors hold their
/// input handle and spawn one background task that pushes `Inbound`s into the
/// shared channel.
pub trait AsyncEventSource: Send + 'static {
    /// Human-readable stable identifier (used for logging / diagnostics).
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task. Implementors stop when
    /// `tx.send(..).await` returns Err or when their input reaches end of stream.
    fn spawn(self: Box<Self>, tx: Sender<Inbound>) -> JoinHandle<()>;
}

/// Registry of event sources, spawned together at startup.
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Spawn all registered sources, returning their JoinHandles. Each source
    /// receives its own clone of `tx`; during shutdown the caller drops its
    /// final sender before awaiting the handles so sources observe the closed
    /// channel and exit cooperatively.
    pub fn spawn_all(&mut self, tx: &Sender<Inbound>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            tracing::info!(target: "runtime.events", source = name, "spawning event source");
            SOURCE_STARTS.fetch_add(1, Ordering::Relaxed);
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

async fn forward(tx: &Sender<Inbound>, item: Inbound) -> bool {
    if tx.send(item).await.is_err() {
        CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
        return false;
    }
    true
}

/// Child-process transport (terminal-emulation mode). Readiness of the
/// child's output becomes just another inbound envelope.
pub struct ChildTransportSource<R> {
    reader: R,
}

impl<R> ChildTransportSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R> AsyncEventSource for ChildTransportSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "child_transport"
    }

    fn spawn(self: Box<Self>, tx: Sender<Inbound>) -> JoinHandle<()> {
        let mut reader = self.reader;
        tokio::spawn(async move {
            let mut buf = vec![0u8; CHILD_READ_CHUNK];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        tracing::debug!(target: "runtime.events", "child_transport_eof");
                        let _ = forward(&tx, Inbound::ChildClosed).await;
                        break;
                    }
                    Ok(n) => {
                        CHILD_OUTPUT_CHUNKS.fetch_add(1, Ordering::Relaxed);
                        CHILD_OUTPUT_BYTES.fetch_add(n as u64, Ordering::Relaxed);
                        if !forward(&tx, Inbound::ChildOutput(buf[..n].to_vec())).await {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(target: "runtime.events", ?err, "child_transport_read_error");
                        let _ = forward(&tx, Inbound::ChildClosed).await;
                        break;
                    }
                }
            }
        })
    }
}

/// Alternate command source: one editor command per input line. End of stream
/// is reported once so the dispatcher can disable the source.
pub struct CommandSource<R> {
    reader: R,
}

impl<R> CommandSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R> AsyncEventSource for CommandSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "command_source"
    }

    fn spawn(self: Box<Self>, tx: Sender<Inbound>) -> JoinHandle<()> {
        let mut lines = self.reader.lines();
        tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        COMMAND_LINES.fetch_add(1, Ordering::Relaxed);
                        if !forward(&tx, Inbound::Command(line)).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = forward(&tx, Inbound::CommandEof).await;
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(target: "runtime.events", ?err, "command_source_read_error");
                        let _ = forward(&tx, Inbound::CommandEof).await;
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn command_source_emits_lines_then_eof() {
        let (tx, mut rx) = mpsc::channel::<Inbound>(8);
        let mut reg = EventSourceRegistry::new();
        reg.register(CommandSource::new(&b"goto 10\nfind foo\n"[..]));
        assert_eq!(reg.len(), 1);
        let handles = reg.spawn_all(&tx);
        drop(tx);

        let mut got = Vec::new();
        while let Some(item) = rx.recv().await {
            got.push(item);
        }
        assert_eq!(
            got,
            vec![
                Inbound::Command("goto 10".into()),
                Inbound::Command("find foo".into()),
                Inbound::CommandEof,
            ]
        );
        for h in handles {
            h.await.expect("command source task");
        }
    }

    #[tokio::test]
    async fn child_transport_forwards_chunks_and_close() {
        let (tx, mut rx) = mpsc::channel::<Inbound>(8);
        let mut reg = EventSourceRegistry::new();
        reg.register(ChildTransportSource::new(&b"$ ls\r\n"[..]));
        let handles = reg.spawn_all(&tx);
        drop(tx);

        let first = rx.recv().await.expect("chunk");
        assert_eq!(first, Inbound::ChildOutput(b"$ ls\r\n".to_vec()));
        assert_eq!(rx.recv().await, Some(Inbound::ChildClosed));
        assert_eq!(rx.recv().await, None);
        for h in handles {
            h.await.expect("child transport task");
        }
    }

    #[tokio::test]
    async fn sources_exit_when_consumer_dropped() {
        let (tx, rx) = mpsc::channel::<Inbound>(1);
        drop(rx);
        let mut reg = EventSourceRegistry::new();
        reg.register(CommandSource::new(&b"a\nb\nc\n"[..]));
        let handles = reg.spawn_all(&tx);
        for handle in handles {
            match tokio::time::timeout(Duration::from_millis(200), handle).await {
                Ok(join_res) => join_res.expect("source task should exit cleanly"),
                Err(_) => panic!("source task did not observe channel closure"),
            }
        }
    }
}
