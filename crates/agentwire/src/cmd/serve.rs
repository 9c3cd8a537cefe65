use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use agentwire_channel::{Dispatcher, Server};
use agentwire_message::{
    ClassLoaderInfo, ClassLoaders, GetClassLoaders, GetProperties, GetThreads, LoaderDiscovered,
    Ping, Pong, Properties, SetProperty, SetPropertyAck, ThreadData, Threads,
    BOOTSTRAP_LOADER_ID, SYSTEM_LOADER_ID,
};
use tracing::{debug, info};

use crate::cmd::{parse_duration, registry, ServeArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let announce = args.announce.as_deref().map(parse_duration).transpose()?;

    let server = Server::bind(&args.endpoint, registry()?, demo_dispatcher())
        .await
        .map_err(|err| channel_error("bind failed", err))?;
    let server = Arc::new(server);
    print_listening(&server.endpoint().to_string(), format);

    let _announcer = announce.map(|interval| {
        server.register_broadcast_source(move |source| announce_loaders(source, interval))
    });

    let runner = server.clone();
    let accept_loop = tokio::spawn(async move { runner.run().await });

    let signal = tokio::signal::ctrl_c().await;
    info!("stopping server");
    server.stop();

    accept_loop
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("accept loop failed: {err}")))?
        .map_err(|err| channel_error("server failed", err))?;
    signal.map_err(|err| io_error("signal handler failed", err))?;
    Ok(SUCCESS)
}

async fn announce_loaders(source: agentwire_channel::BroadcastSource, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    let mut next_id = SYSTEM_LOADER_ID + 1;
    loop {
        ticker.tick().await;
        let delivered = source.push(LoaderDiscovered {
            loader: ClassLoaderInfo {
                id: next_id,
                name: format!("demo-loader-{next_id}"),
            },
        });
        debug!(loader = next_id, delivered, "announced loader");
        next_id = next_id.wrapping_add(1);
    }
}

/// Handlers of the demo agent: an in-memory property store plus the
/// process's own loaders and threads.
fn demo_dispatcher() -> Dispatcher {
    let store = Arc::new(Mutex::new(initial_properties()));
    let mut dispatcher = Dispatcher::new();

    dispatcher.register_handler::<Ping, _>(|_| Ok(Pong));

    let properties = store.clone();
    dispatcher.register_handler::<GetProperties, _>(move |_| {
        let entries = properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(Properties { entries })
    });

    dispatcher.register_handler::<SetProperty, _>(move |req| {
        if req.key.is_empty() {
            return Err("property key must not be empty".into());
        }
        store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(req.key.clone(), req.value.clone());
        Ok(SetPropertyAck)
    });

    dispatcher.register_handler::<GetClassLoaders, _>(|_| {
        Ok(ClassLoaders {
            loaders: vec![
                ClassLoaderInfo {
                    id: BOOTSTRAP_LOADER_ID,
                    name: "bootstrap".into(),
                },
                ClassLoaderInfo {
                    id: SYSTEM_LOADER_ID,
                    name: "system".into(),
                },
            ],
        })
    });

    dispatcher.register_handler::<GetThreads, _>(|_| Ok(Threads { threads: own_threads() }));

    dispatcher
}

fn initial_properties() -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    entries.insert("agent.name".into(), "agentwire".into());
    entries.insert("agent.version".into(), env!("CARGO_PKG_VERSION").into());
    entries.insert("os.name".into(), std::env::consts::OS.into());
    entries.insert("os.arch".into(), std::env::consts::ARCH.into());
    entries.insert("process.id".into(), std::process::id().to_string());
    entries
}

#[cfg(target_os = "linux")]
fn own_threads() -> Vec<ThreadData> {
    let Ok(tasks) = std::fs::read_dir("/proc/self/task") else {
        return vec![current_thread()];
    };

    let mut threads: Vec<ThreadData> = tasks
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let id = entry.file_name().to_str()?.parse::<i64>().ok()?;
            let name = std::fs::read_to_string(entry.path().join("comm"))
                .map(|comm| comm.trim_end().to_string())
                .unwrap_or_default();
            Some(ThreadData {
                id,
                name,
                state: "RUNNABLE".into(),
                trace: Vec::new(),
            })
        })
        .collect();
    threads.sort_by_key(|thread| thread.id);
    threads
}

#[cfg(not(target_os = "linux"))]
fn own_threads() -> Vec<ThreadData> {
    vec![current_thread()]
}

#[cfg_attr(target_os = "linux", allow(dead_code))]
fn current_thread() -> ThreadData {
    let thread = std::thread::current();
    ThreadData {
        id: 1,
        name: thread.name().unwrap_or("unnamed").to_string(),
        state: "RUNNABLE".into(),
        trace: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use agentwire_frame::{AnyMessage, Failure};
    use agentwire_message::ids;

    use super::*;

    #[test]
    fn demo_agent_stores_properties() {
        let dispatcher = demo_dispatcher();
        let set = SetProperty {
            key: "mode".into(),
            value: "debug".into(),
        };
        let reply = dispatcher.answer(ids::SET_PROPERTY, &set);
        assert!(reply.is::<SetPropertyAck>());

        let reply = dispatcher.answer(ids::GET_PROPERTIES, &GetProperties);
        let properties = reply.downcast_ref::<Properties>().unwrap();
        assert_eq!(properties.entries.get("mode").map(String::as_str), Some("debug"));
        assert!(properties.entries.contains_key("os.name"));
    }

    #[test]
    fn empty_property_key_is_a_failure() {
        let dispatcher = demo_dispatcher();
        let set = SetProperty {
            key: String::new(),
            value: "x".into(),
        };
        let reply = dispatcher.answer(ids::SET_PROPERTY, &set);
        let failure = reply.downcast_ref::<Failure>().unwrap();
        assert_eq!(failure.request_type, ids::SET_PROPERTY);
    }

    #[test]
    fn demo_agent_reports_loaders_and_threads() {
        let dispatcher = demo_dispatcher();
        let reply = dispatcher.answer(ids::GET_CLASS_LOADERS, &GetClassLoaders);
        let loaders = reply.downcast_ref::<ClassLoaders>().unwrap();
        assert_eq!(loaders.loaders.len(), 2);
        assert_eq!(loaders.loaders[0].id, BOOTSTRAP_LOADER_ID);

        let reply = dispatcher.answer(ids::GET_THREADS, &GetThreads);
        let threads = reply.downcast_ref::<Threads>().unwrap();
        assert!(!threads.threads.is_empty());
    }

    #[test]
    fn unsupported_requests_fail_in_band() {
        let dispatcher = demo_dispatcher();
        let request = agentwire_message::GetLoaderClasses {
            loader_id: SYSTEM_LOADER_ID,
        };
        let reply: Arc<dyn AnyMessage> = dispatcher.answer(ids::GET_LOADER_CLASSES, &request);
        assert!(reply.is::<Failure>());
    }
}
