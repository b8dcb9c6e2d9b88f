use std::sync::Arc;

use planeview::PlaneService;
use planeview_channel::{ChannelConfig, ChannelListener, Connection};
use planeview_image::ChannelPlaneCache;
use planeview_transport::Endpoint;
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{backend_error, channel_error, CliResult, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let cache = ChannelPlaneCache::open(&args.image)
        .map_err(|err| backend_error("failed to open image", err))?;
    if let Some(mask) = &args.mask {
        cache
            .set_mask(mask)
            .map_err(|err| backend_error("failed to open mask", err))?;
    }
    let shape = cache.shape();
    let service = PlaneService::new(Arc::new(cache));

    let mut config = ChannelConfig::default().with_abort_handler(|err, context| {
        warn!(
            error = %err,
            frame_id = ?context.frame_id,
            frames_seen = context.frames_seen,
            "display connection aborted"
        );
    });
    if let Some(session) = &args.session {
        config = config.with_session(session.clone());
    }

    let endpoint = Endpoint::new(args.endpoint.host.clone(), args.endpoint.port);
    let listener = ChannelListener::bind(&endpoint)
        .await
        .map_err(|err| channel_error("bind failed", err))?
        .with_config(config);
    print_listening(listener.endpoint(), shape, args.session.is_some(), format);

    loop {
        let connection = tokio::select! {
            accepted = listener.accept_with(|channel| service.register(channel)) => {
                accepted.map_err(|err| channel_error("accept failed", err))?
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                return Ok(SUCCESS);
            }
        };

        let closed = connection.channel().cancellation_token();
        if args.once {
            tokio::select! {
                _ = closed.cancelled() => {}
                _ = tokio::signal::ctrl_c() => info!("interrupted; shutting down"),
            }
            finish(connection).await;
            return Ok(SUCCESS);
        }
        tokio::spawn(async move {
            closed.cancelled().await;
            finish(connection).await;
        });
    }
}

async fn finish(connection: Connection) {
    connection.close("server finished with display");
    connection.join().await;
    info!("display disconnected");
}
