//! Connection seam used by the COPY pipelines.
//!
//! Pipelines only ever see a [`CopyConnection`]; the PostgreSQL
//! implementation wraps a single sqlx [`PgConnection`]. One connection is
//! opened per invocation and handed back through [`release`] exactly once.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgCopyIn};
use sqlx::{ConnectOptions, Connection, Executor};

use crate::error::{CopyError, CopyResult};

/// Server-side COPY TO STDOUT stream.
pub type CopyOutStream<'c> = BoxStream<'c, Result<Bytes, sqlx::Error>>;

/// Server-side COPY FROM STDIN stream.
///
/// Dropping a sink without calling `finish` abandons the COPY.
#[async_trait]
pub trait CopyInSink: Send {
    async fn send(&mut self, chunk: &[u8]) -> Result<(), sqlx::Error>;

    async fn finish(&mut self) -> Result<(), sqlx::Error>;

    async fn abort(&mut self, reason: &str) -> Result<(), sqlx::Error>;
}

#[async_trait]
pub trait CopyConnection: Send {
    /// Run a statement without parameters (transaction control).
    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error>;

    async fn relation_exists(&mut self, name: &str) -> Result<bool, sqlx::Error>;

    async fn copy_out<'c>(
        &'c mut self,
        statement: &str,
    ) -> Result<CopyOutStream<'c>, sqlx::Error>;

    async fn copy_in<'c>(
        &'c mut self,
        statement: &str,
    ) -> Result<Box<dyn CopyInSink + 'c>, sqlx::Error>;

    async fn close(&mut self) -> Result<(), sqlx::Error>;

    /// Drop the session without talking to the server.
    ///
    /// Used when the protocol state is unknown (an abandoned COPY); the
    /// server aborts any open transaction when the socket goes away. Later
    /// calls fail with "connection already released".
    fn discard(&mut self, reason: &str);
}

/// Close a connection, logging instead of surfacing any failure.
pub async fn release<C>(conn: &mut C)
where
    C: CopyConnection + ?Sized,
{
    match conn.close().await {
        Ok(()) => log::debug!("connection: released"),
        Err(err) => log::warn!("connection: release failed: {}", err),
    }
}

/// A single PostgreSQL connection owned by one invocation.
///
/// A COPY that fails to open leaves unread server messages behind, so the
/// connection marks itself broken and is dropped on next use.
pub struct PgCopyConnection {
    conn: Option<PgConnection>,
    broken: bool,
}

fn released() -> sqlx::Error {
    sqlx::Error::Protocol("connection already released".to_string())
}

impl PgCopyConnection {
    pub async fn connect(options: &PgConnectOptions) -> CopyResult<Self> {
        let conn = options
            .clone()
            .log_statements(log::LevelFilter::Debug)
            .connect()
            .await
            .map_err(CopyError::Connect)?;
        Ok(Self::from_connection(conn))
    }

    pub async fn connect_url(url: &str) -> CopyResult<Self> {
        let conn = PgConnection::connect(url)
            .await
            .map_err(CopyError::Connect)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: PgConnection) -> Self {
        Self {
            conn: Some(conn),
            broken: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.broken || self.conn.is_none()
    }

    fn live(&mut self) -> Result<&mut PgConnection, sqlx::Error> {
        if self.broken {
            self.discard("protocol state lost");
        }
        self.conn.as_mut().ok_or_else(released)
    }
}

#[async_trait]
impl CopyConnection for PgCopyConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        let conn = self.live()?;
        conn.execute(statement).await?;
        Ok(())
    }

    async fn relation_exists(&mut self, name: &str) -> Result<bool, sqlx::Error> {
        let conn = self.live()?;
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(name)
            .fetch_one(conn)
            .await
    }

    async fn copy_out<'c>(
        &'c mut self,
        statement: &str,
    ) -> Result<CopyOutStream<'c>, sqlx::Error> {
        let conn = match (self.broken, self.conn.as_mut()) {
            (false, Some(conn)) => conn,
            _ => return Err(released()),
        };
        match conn.copy_out_raw(statement).await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                self.broken = true;
                Err(err)
            }
        }
    }

    async fn copy_in<'c>(
        &'c mut self,
        statement: &str,
    ) -> Result<Box<dyn CopyInSink + 'c>, sqlx::Error> {
        let conn = match (self.broken, self.conn.as_mut()) {
            (false, Some(conn)) => conn,
            _ => return Err(released()),
        };
        match conn.copy_in_raw(statement).await {
            Ok(copy) => Ok(Box::new(PgCopyInSink { copy: Some(copy) })),
            Err(err) => {
                self.broken = true;
                Err(err)
            }
        }
    }

    async fn close(&mut self) -> Result<(), sqlx::Error> {
        if self.broken {
            self.discard("closing after protocol failure");
            return Ok(());
        }
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }

    fn discard(&mut self, reason: &str) {
        self.broken = false;
        if self.conn.take().is_some() {
            log::warn!("connection: discarded ({})", reason);
        }
    }
}

struct PgCopyInSink<'c> {
    copy: Option<PgCopyIn<&'c mut PgConnection>>,
}

impl<'c> PgCopyInSink<'c> {
    fn active(&mut self) -> Result<&mut PgCopyIn<&'c mut PgConnection>, sqlx::Error> {
        self.copy
            .as_mut()
            .ok_or_else(|| sqlx::Error::Protocol("COPY stream already closed".to_string()))
    }
}

#[async_trait]
impl<'c> CopyInSink for PgCopyInSink<'c> {
    async fn send(&mut self, chunk: &[u8]) -> Result<(), sqlx::Error> {
        self.active()?.send(chunk).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), sqlx::Error> {
        match self.copy.take() {
            Some(copy) => copy.finish().await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn abort(&mut self, reason: &str) -> Result<(), sqlx::Error> {
        match self.copy.take() {
            Some(copy) => copy.abort(reason).await,
            None => Ok(()),
        }
    }
}
