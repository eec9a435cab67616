use clap::Parser;
use server::acl::adapter::AclManagerAdapter;
use server::acl::AclManager;
use server::datasource::memory::MemoryDataSource;
use server::datasource::{ColumnInfo, DataSourceRegistry, TableInfo};
use server::executor::StaticExecutor;
use server::server::gate_server::{GateServer, ServerContext};
use server::vtable::acl_view::register_acl_view;
use server::vtable::provider::VirtualTableProvider;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "my-gate",
    about = "MySQL wire-compatible front-end over pluggable data sources"
)]
struct GateServerArgs {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(long, default_value_t = 3306)]
    port: u16,

    /// Directory holding users.json and permissions.json.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long)]
    log_level: Option<String>,

    /// Register an in-memory sample database named `demo`.
    #[arg(long, default_value_t = false)]
    demo: bool,
}

fn demo_source() -> MemoryDataSource {
    MemoryDataSource::new("demo")
        .with_table(TableInfo::new(
            "users",
            vec![
                ColumnInfo::new("id", "INT(11)").primary_key(),
                ColumnInfo::new("email", "VARCHAR(255)").unique(),
                ColumnInfo::new("name", "VARCHAR(64)").not_null(),
            ],
        ))
        .with_table(TableInfo::new(
            "orders",
            vec![
                ColumnInfo::new("id", "INT(11)").primary_key(),
                ColumnInfo::new("user_id", "INT(11)").references("users", "id"),
                ColumnInfo::new("total", "DECIMAL(10,2)"),
            ],
        ))
}

fn main() -> anyhow::Result<()> {
    let args = GateServerArgs::parse();
    let log_level_string = args.log_level.clone().unwrap_or("INFO".to_string());
    let level = Level::from_str(log_level_string.as_str())?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("INFO"))
        .add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_line_number(true)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("MY_GATE")
        .build()?;

    info!("GateSrv running config args={args:?}");
    runtime.block_on(async {
        let acl = Arc::new(AclManager::open(&args.data_dir)?);
        register_acl_view(Arc::new(AclManagerAdapter::new(Arc::clone(&acl))));

        let registry = Arc::new(DataSourceRegistry::new());
        if args.demo {
            registry.register(Arc::new(demo_source()));
        }

        let provider = Arc::new(VirtualTableProvider::new(Arc::clone(&registry), None));

        // the SQL executor is an external collaborator; this binary wires a
        // stub that answers OK so the wire stack can be driven end to end
        let ctx = Arc::new(ServerContext {
            acl,
            registry,
            provider,
            executor: Arc::new(StaticExecutor::new()),
            binlog: None,
        });
        let gate = Arc::new(GateServer::new(ctx));

        let listener = TcpListener::bind(format!("{}:{}", args.host, args.port)).await?;
        info!("GateSrv listening on {}:{}", args.host, args.port);
        tokio::select! {
            result = Arc::clone(&gate).serve(listener) => {
                if let Err(e) = result {
                    warn!("GateSrv accept loop ended: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("GateSrv received ctrl-c, shutting down");
            }
        }
        Ok(())
    })
}
