use tokio::sync::mpsc;
use tracing::info;

use crate::cmd::{open_channel, WatchArgs};
use crate::exit::{CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_broadcast, OutputFormat};

pub async fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let channel = open_channel(&args.client.endpoint, &args.client.timeout).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    channel.set_broadcast_listener(move |message| {
        let _ = tx.send(message);
    });

    let mut printed = 0usize;
    let code = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break SUCCESS,
            _ = channel.closed() => {
                info!("agent closed the connection");
                break TRANSPORT_ERROR;
            }
            Some(message) = rx.recv() => {
                print_broadcast(&*message, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break SUCCESS;
                }
            }
        }
    };

    channel.shutdown();
    Ok(code)
}
