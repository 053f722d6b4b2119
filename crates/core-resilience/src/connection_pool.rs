//! Fixed-size, eagerly opened connection pool
//!
//! All connections are opened when the pool is built and closed together.
//! Callers share them round-robin; the pool never resizes itself and never
//! replaces a connection that has gone bad. Routing around a broken
//! connection is left to the caller's retry loop, which lands on the next
//! index on its following attempt.

use super::error::ResilienceError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default number of connections when a pool is built with size 0
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Configuration for connection pool behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of connections opened at construction (0 means default)
    pub size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
        }
    }
}

impl PoolConfig {
    /// Pool size with the zero-means-default rule applied
    pub fn effective_size(&self) -> usize {
        if self.size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            self.size
        }
    }
}

/// Factory trait for creating and validating connections
#[async_trait::async_trait]
pub trait ConnectionFactory<T: Send + Sync + 'static>: Send + Sync {
    /// Open a new connection
    async fn create(&self) -> Result<T, ResilienceError>;

    /// Check if a connection is still usable
    async fn is_healthy(&self, conn: &T) -> bool;

    /// Close a connection (optional cleanup)
    async fn close(&self, _conn: &T) {}
}

/// A round-robin pool of shared connections
///
/// # Example
/// ```no_run
/// use kbus_core_resilience::{ConnectionFactory, ConnectionPool, PoolConfig, ResilienceError};
/// use std::sync::Arc;
///
/// struct MyConnection;
/// struct MyConnectionFactory;
///
/// #[async_trait::async_trait]
/// impl ConnectionFactory<MyConnection> for MyConnectionFactory {
///     async fn create(&self) -> Result<MyConnection, ResilienceError> {
///         Ok(MyConnection)
///     }
///
///     async fn is_healthy(&self, _conn: &MyConnection) -> bool {
///         true
///     }
/// }
///
/// # async fn example() -> Result<(), ResilienceError> {
/// let factory: Arc<dyn ConnectionFactory<MyConnection>> = Arc::new(MyConnectionFactory);
/// let pool = ConnectionPool::connect(factory, PoolConfig::default()).await?;
/// let conn = pool.get().await;
/// assert!(conn.is_some());
/// pool.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool<T: Send + Sync + 'static> {
    factory: Arc<dyn ConnectionFactory<T>>,
    connections: RwLock<Vec<Arc<T>>>,
    size: usize,
    cursor: AtomicUsize,
}

impl<T: Send + Sync + 'static> ConnectionPool<T> {
    /// Open every connection up front
    ///
    /// Construction is all-or-nothing: if any single connection fails to
    /// open, the ones already opened are closed and the error is returned.
    pub async fn connect(
        factory: Arc<dyn ConnectionFactory<T>>,
        config: PoolConfig,
    ) -> Result<Self, ResilienceError> {
        let size = config.effective_size();
        let mut connections = Vec::with_capacity(size);

        for index in 0..size {
            match factory.create().await {
                Ok(conn) => connections.push(Arc::new(conn)),
                Err(e) => {
                    warn!(index, error = %e, "Connection pool startup failed");
                    for conn in &connections {
                        factory.close(conn).await;
                    }
                    return Err(ResilienceError::ConnectionCreation {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(size, "Connection pool created");

        Ok(Self {
            factory,
            connections: RwLock::new(connections),
            size,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Next connection in round-robin order, or `None` once closed
    pub async fn get(&self) -> Option<Arc<T>> {
        let connections = self.connections.read().await;
        if connections.is_empty() {
            return None;
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % connections.len();
        Some(connections[index].clone())
    }

    /// Whether any connections remain
    pub async fn health(&self) -> bool {
        !self.connections.read().await.is_empty()
    }

    /// Number of connections that still report healthy
    pub async fn healthy_count(&self) -> usize {
        let connections = self.connections.read().await;
        let mut healthy = 0;
        for conn in connections.iter() {
            if self.factory.is_healthy(conn).await {
                healthy += 1;
            }
        }
        healthy
    }

    /// Configured pool size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Close every connection and empty the pool (idempotent)
    pub async fn close(&self) {
        let mut connections = self.connections.write().await;
        for (index, conn) in connections.iter().enumerate() {
            self.factory.close(conn).await;
            debug!(index, "Closed pool connection");
        }
        connections.clear();
    }
}
