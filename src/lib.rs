pub mod config;
pub mod copy;
pub mod credentials;
pub mod error;
pub mod host;
pub mod tls;

pub use config::CopyConfig;
pub use credentials::Credentials;
pub use error::{CopyError, CopyResult, FailureDetail};

use env_logger::Env;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Initialise `env_logger` once; later calls are no-ops.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn"))
            .format_timestamp_millis()
            .init();
    });
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    //! Scripted in-memory connection for exercising the COPY pipelines
    //! without a server.

    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream::{self, Stream, StreamExt};
    use parking_lot::Mutex;

    use crate::copy::{CopyConnection, CopyInSink, CopyOutStream};

    /// One step of a scripted COPY TO stream.
    #[derive(Debug, Clone)]
    pub enum StreamEvent {
        Chunk(Vec<u8>),
        Error(String),
        /// Stream ends; later events are never delivered.
        End,
        /// Stream stops producing without ending.
        Hang,
    }

    impl StreamEvent {
        pub fn chunk(data: &str) -> Self {
            StreamEvent::Chunk(data.as_bytes().to_vec())
        }

        pub fn error(message: &str) -> Self {
            StreamEvent::Error(message.to_string())
        }
    }

    /// How the scripted COPY FROM sink reacts to data.
    #[derive(Debug, Clone)]
    pub enum SinkBehaviour {
        Accept,
        /// Accept this many bytes, then fail the next send.
        FailAfter { bytes: usize, message: String },
        FailOnFinish(String),
        /// Never complete a send.
        Hang,
    }

    fn protocol_error(message: &str) -> sqlx::Error {
        sqlx::Error::Protocol(message.to_string())
    }

    #[derive(Debug, Default)]
    struct Shared {
        statements: Mutex<Vec<String>>,
        close_calls: AtomicUsize,
        stream_dropped: Arc<AtomicBool>,
        received: Mutex<Vec<u8>>,
        sink_finished: AtomicBool,
        sink_aborted: AtomicBool,
        sink_dropped: AtomicBool,
        discards: Mutex<Vec<String>>,
    }

    /// Read-only view of what a [`ScriptedConnection`] observed.
    #[derive(Debug, Clone)]
    pub struct ScriptLog {
        shared: Arc<Shared>,
    }

    impl ScriptLog {
        /// Statements in the order they reached the connection.
        pub fn statements(&self) -> Vec<String> {
            self.shared.statements.lock().clone()
        }

        pub fn executed(&self, statement: &str) -> bool {
            self.shared
                .statements
                .lock()
                .iter()
                .any(|executed| executed == statement)
        }

        pub fn close_calls(&self) -> usize {
            self.shared.close_calls.load(Ordering::SeqCst)
        }

        pub fn stream_dropped(&self) -> bool {
            self.shared.stream_dropped.load(Ordering::SeqCst)
        }

        pub fn received(&self) -> Vec<u8> {
            self.shared.received.lock().clone()
        }

        pub fn sink_finished(&self) -> bool {
            self.shared.sink_finished.load(Ordering::SeqCst)
        }

        pub fn sink_aborted(&self) -> bool {
            self.shared.sink_aborted.load(Ordering::SeqCst)
        }

        pub fn sink_dropped(&self) -> bool {
            self.shared.sink_dropped.load(Ordering::SeqCst)
        }

        pub fn discarded(&self) -> bool {
            !self.shared.discards.lock().is_empty()
        }

        /// Reasons given to `discard`, in order.
        pub fn discard_reasons(&self) -> Vec<String> {
            self.shared.discards.lock().clone()
        }
    }

    pub struct ScriptedConnection {
        shared: Arc<Shared>,
        copy_out: Vec<StreamEvent>,
        copy_out_error: Option<String>,
        copy_in: SinkBehaviour,
        copy_in_error: Option<String>,
        table_exists: bool,
        failing: Vec<(String, String)>,
        hanging: Vec<String>,
        close_error: Option<String>,
        discarded: bool,
    }

    impl Default for ScriptedConnection {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ScriptedConnection {
        pub fn new() -> Self {
            Self {
                shared: Arc::new(Shared::default()),
                copy_out: vec![StreamEvent::End],
                copy_out_error: None,
                copy_in: SinkBehaviour::Accept,
                copy_in_error: None,
                table_exists: true,
                failing: Vec::new(),
                hanging: Vec::new(),
                close_error: None,
                discarded: false,
            }
        }

        pub fn observe(&self) -> ScriptLog {
            ScriptLog {
                shared: Arc::clone(&self.shared),
            }
        }

        pub fn with_copy_out(mut self, events: Vec<StreamEvent>) -> Self {
            self.copy_out = events;
            self
        }

        pub fn with_copy_out_error(mut self, message: &str) -> Self {
            self.copy_out_error = Some(message.to_string());
            self
        }

        pub fn with_copy_in(mut self, behaviour: SinkBehaviour) -> Self {
            self.copy_in = behaviour;
            self
        }

        pub fn with_copy_in_error(mut self, message: &str) -> Self {
            self.copy_in_error = Some(message.to_string());
            self
        }

        pub fn with_missing_table(mut self) -> Self {
            self.table_exists = false;
            self
        }

        /// Make `statement` fail with `message` whenever it is executed.
        pub fn failing_statement(mut self, statement: &str, message: &str) -> Self {
            self.failing.push((statement.to_string(), message.to_string()));
            self
        }

        /// Make `statement` block forever, like one queued behind a lock.
        pub fn hanging_statement(mut self, statement: &str) -> Self {
            self.hanging.push(statement.to_string());
            self
        }

        pub fn failing_close(mut self, message: &str) -> Self {
            self.close_error = Some(message.to_string());
            self
        }

        fn record(&self, statement: impl Into<String>) -> Result<(), sqlx::Error> {
            if self.discarded {
                return Err(protocol_error("connection already released"));
            }
            self.shared.statements.lock().push(statement.into());
            Ok(())
        }
    }

    #[async_trait]
    impl CopyConnection for ScriptedConnection {
        async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error> {
            self.record(statement)?;
            if self.hanging.iter().any(|hanging| hanging == statement) {
                std::future::pending::<()>().await;
            }
            match self.failing.iter().find(|(failing, _)| failing == statement) {
                Some((_, message)) => Err(protocol_error(message)),
                None => Ok(()),
            }
        }

        async fn relation_exists(&mut self, name: &str) -> Result<bool, sqlx::Error> {
            self.record(format!("to_regclass({name})"))?;
            Ok(self.table_exists)
        }

        async fn copy_out<'c>(
            &'c mut self,
            statement: &str,
        ) -> Result<CopyOutStream<'c>, sqlx::Error> {
            self.record(statement)?;
            if let Some(message) = &self.copy_out_error {
                return Err(protocol_error(message));
            }

            let mut items = Vec::new();
            let mut hang = false;
            for event in self.copy_out.iter().cloned() {
                match event {
                    StreamEvent::Chunk(data) => items.push(Ok(Bytes::from(data))),
                    StreamEvent::Error(message) => items.push(Err(protocol_error(&message))),
                    StreamEvent::End => break,
                    StreamEvent::Hang => {
                        hang = true;
                        break;
                    }
                }
            }

            let tail: CopyOutStream<'static> = if hang {
                stream::pending().boxed()
            } else {
                stream::empty().boxed()
            };
            let inner = stream::iter(items).chain(tail).boxed();
            Ok(ObservedStream {
                inner,
                _flag: DropFlag(Arc::clone(&self.shared.stream_dropped)),
            }
            .boxed())
        }

        async fn copy_in<'c>(
            &'c mut self,
            statement: &str,
        ) -> Result<Box<dyn CopyInSink + 'c>, sqlx::Error> {
            self.record(statement)?;
            if let Some(message) = &self.copy_in_error {
                return Err(protocol_error(message));
            }
            Ok(Box::new(ScriptedSink {
                shared: Arc::clone(&self.shared),
                behaviour: self.copy_in.clone(),
            }))
        }

        async fn close(&mut self) -> Result<(), sqlx::Error> {
            self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
            match &self.close_error {
                Some(message) => Err(protocol_error(message)),
                None => Ok(()),
            }
        }

        fn discard(&mut self, reason: &str) {
            self.discarded = true;
            self.shared.discards.lock().push(reason.to_string());
        }
    }

    /// Raises its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct ObservedStream {
        inner: CopyOutStream<'static>,
        _flag: DropFlag,
    }

    impl Stream for ObservedStream {
        type Item = Result<Bytes, sqlx::Error>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.poll_next_unpin(cx)
        }
    }

    struct ScriptedSink {
        shared: Arc<Shared>,
        behaviour: SinkBehaviour,
    }

    #[async_trait]
    impl CopyInSink for ScriptedSink {
        async fn send(&mut self, chunk: &[u8]) -> Result<(), sqlx::Error> {
            match &self.behaviour {
                SinkBehaviour::Hang => std::future::pending::<()>().await,
                SinkBehaviour::FailAfter { bytes, message } => {
                    if self.shared.received.lock().len() >= *bytes {
                        return Err(protocol_error(message));
                    }
                }
                SinkBehaviour::Accept | SinkBehaviour::FailOnFinish(_) => {}
            }
            self.shared.received.lock().extend_from_slice(chunk);
            Ok(())
        }

        async fn finish(&mut self) -> Result<(), sqlx::Error> {
            if let SinkBehaviour::FailOnFinish(message) = &self.behaviour {
                return Err(protocol_error(message));
            }
            self.shared.sink_finished.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn abort(&mut self, _reason: &str) -> Result<(), sqlx::Error> {
            self.shared.sink_aborted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Drop for ScriptedSink {
        fn drop(&mut self) {
            self.shared.sink_dropped.store(true, Ordering::SeqCst);
        }
    }
}
