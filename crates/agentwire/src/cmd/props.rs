use agentwire_message::GetProperties;

use crate::cmd::{open_channel, ClientArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_properties, OutputFormat};

pub async fn run(args: ClientArgs, format: OutputFormat) -> CliResult<i32> {
    let channel = open_channel(&args.endpoint, &args.timeout).await?;
    let properties = channel
        .call(GetProperties)
        .await
        .map_err(|err| channel_error("get-properties failed", err))?;
    print_properties(&properties, format);

    channel.shutdown();
    Ok(SUCCESS)
}
