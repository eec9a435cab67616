use crate::acl::AclManager;
use crate::datasource::DataSourceRegistry;
use crate::executor::QueryExecutor;
use crate::server::replication::BinlogEventSource;
use crate::server::session::Session;
use crate::vtable::provider::VirtualTableProvider;

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Everything a session needs besides its socket: the shared ACL engine,
/// the data sources, the virtual-table provider, the external executor and,
/// when this server acts as a replication source, the event supply.
pub struct ServerContext {
    pub acl: Arc<AclManager>,
    pub registry: Arc<DataSourceRegistry>,
    pub provider: Arc<VirtualTableProvider>,
    pub executor: Arc<dyn QueryExecutor>,
    pub binlog: Option<Arc<dyn BinlogEventSource>>,
}

/// The MySQL-compatible front door: accepts connections and runs one
/// session task per client.
pub struct GateServer {
    ctx: Arc<ServerContext>,
    next_conn_id: AtomicU32,
}

impl GateServer {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        GateServer {
            ctx,
            next_conn_id: AtomicU32::new(1),
        }
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    fn next_connection_id(&self) -> u32 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Run a session over an arbitrary duplex transport. Used directly by
    /// tests; `serve` goes through here for TCP connections.
    pub fn connect<R, W>(&self, reader: R, writer: W, client_host: String) -> Session<R, W>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        Session::new(
            Arc::clone(&self.ctx),
            reader,
            writer,
            client_host,
            self.next_connection_id(),
        )
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!("GateSrv listening on {}", listener.local_addr()?);
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("GateSrv accept failed: {e}");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!("GateSrv set_nodelay failed for {peer}: {e}");
            }
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                let session = server.connect(reader, writer, peer.ip().to_string());
                session.run().await;
            });
        }
    }
}
