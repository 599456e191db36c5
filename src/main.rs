use tokio_util::sync::CancellationToken;

mod api;
mod catalog;
mod config;
mod handler;
mod manager;
mod stream;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = config::config();

    if let Err(e) = stream::ffmpeg::probe_encoder(config.ffmpeg_bin()).await {
        eprintln!(
            "FFMpeg not found in system cli; please install ffmpeg properly or make a softlink to ./! ({})",
            e
        );
        std::process::exit(-1);
    }

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    api::start_api_server(cancel_clone);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    std::process::exit(0);
}
