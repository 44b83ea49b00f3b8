use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::server::HttpServer;
use crate::store::DirStore;
use crate::transport::TcpTransport;

pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let pool = cfg.segment_pool();
    let transport = TcpTransport::bind(&cfg.server.listen_addr, pool.clone(), cfg.server.backlog)
        .await
        .with_context(|| format!("binding {}", cfg.server.listen_addr))?;
    info!("Listening on {}", transport.local_addr());
    info!(root = %cfg.server.root.display(), "Serving files");

    let mut builder = HttpServer::builder(
        transport,
        DirStore::new(&cfg.server.root),
        pool,
        cfg.settings(),
    )
    .mime_maps(cfg.mime.clone());

    if let Some(auth) = &cfg.auth {
        info!(prefix = %auth.prefix, scheme = ?auth.scheme, "Authentication enabled");
        builder = builder.authentication_check(auth.clone());
    }

    let mut server = builder.build()?;
    loop {
        server.serve_next().await;
    }
}
