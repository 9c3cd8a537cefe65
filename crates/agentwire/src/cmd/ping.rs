use std::time::Instant;

use agentwire_message::Ping;

use crate::cmd::{open_channel, PingArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_pong, OutputFormat};

pub async fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }

    let channel = open_channel(&args.client.endpoint, &args.client.timeout).await?;
    for seq in 0..args.count {
        let started = Instant::now();
        channel
            .call(Ping)
            .await
            .map_err(|err| channel_error("ping failed", err))?;
        print_pong(seq, started.elapsed(), format);
    }

    channel.shutdown();
    Ok(SUCCESS)
}
