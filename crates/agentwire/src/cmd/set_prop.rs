use agentwire_message::SetProperty;

use crate::cmd::{open_channel, SetPropArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_set_property, OutputFormat};

pub async fn run(args: SetPropArgs, format: OutputFormat) -> CliResult<i32> {
    if args.key.is_empty() {
        return Err(CliError::new(USAGE, "property key must not be empty"));
    }

    let channel = open_channel(&args.endpoint, &args.timeout).await?;
    channel
        .call(SetProperty {
            key: args.key.clone(),
            value: args.value.clone(),
        })
        .await
        .map_err(|err| channel_error("set-property failed", err))?;
    print_set_property(&args.key, &args.value, format);

    channel.shutdown();
    Ok(SUCCESS)
}
