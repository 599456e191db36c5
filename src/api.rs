use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config;

pub(crate) fn start_api_server(cancel: CancellationToken) {
    tokio::spawn(async move {
        let app = Router::new()
            .nest("/live", crate::handler::live::live_router())
            .merge(crate::handler::catalog::catalog_router());

        let addr = config::config().listen_addr();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("API: bind {} failed: {}", addr, e);
                cancel.cancel();
                return;
            }
        };
        println!("Relay server started on {}", addr);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            println!("Error starting relay server: {}", e);
        }
    });
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            println!("Shutting down relay server...");
        }
    }
}
