// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use idwallet::backend::RpcClient;
use idwallet::global::*;
use idwallet::operations::SharedBackend;
use idwallet::prefs::{FilePrefs, PreferenceStore};
use idwallet::settings::SETTINGS;
use log::*;
use mimalloc::MiMalloc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::time::sleep;

#[cfg(feature = "bridge")]
use idwallet::bridge::*;
#[cfg(feature = "bridge")]
use tarpc::server::{self, Channel};

#[cfg(not(windows))]
use signal_hook::consts::TERM_SIGNALS;
#[cfg(not(windows))]
use signal_hook::flag;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    idwallet::global::init();

    #[cfg(not(windows))]
    for sig in TERM_SIGNALS {
        // A second term signal exits with code 1. This arms it on the first one.
        flag::register_conditional_shutdown(*sig, 1, EXIT_SIGNAL.clone())?;
        flag::register(*sig, EXIT_SIGNAL.clone())?;
    }

    start_runtime()
}

fn start_runtime() -> anyhow::Result<()> {
    SETTINGS.validate()?;

    let worker_threads = if SETTINGS.bridge.threads == 0 {
        num_cpus::get()
    } else {
        SETTINGS.bridge.threads as usize
    };

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_io()
        .enable_time()
        .build()?;

    let backend: SharedBackend = Arc::new(RpcClient::from_settings(&SETTINGS.backend)?);
    let prefs: Arc<dyn PreferenceStore> = Arc::new(FilePrefs::open(&SETTINGS.data_dir())?);

    runtime.block_on(async move {
        info!(
            "Running idwallet v{} on {}",
            env!("CARGO_PKG_VERSION"),
            SETTINGS.backend.chain_id
        );

        #[cfg(feature = "bridge")]
        let bridge = if SETTINGS.bridge.enabled {
            Some(Bridge::new(
                backend,
                prefs,
                SETTINGS.tracker.clone(),
                &SETTINGS.backend.chain_id,
            ))
        } else {
            let _ = (backend, prefs);
            None
        };

        #[cfg(feature = "bridge")]
        let run_bridge = {
            let bridge = bridge.clone();
            async move {
                if let Some(bridge) = bridge {
                    if SETTINGS.bridge.session_idle_secs > 0 {
                        bridge.spawn_session_sweeper(Duration::from_secs(
                            SETTINGS.bridge.session_idle_secs,
                        ));
                    }

                    // Create transports
                    let (client_transport, server_transport) =
                        tarpc::transport::channel::unbounded();
                    let server = server::BaseChannel::with_defaults(server_transport);
                    let client = BridgeDefinitionClient::new(
                        tarpc::client::Config::default(),
                        client_transport,
                    )
                    .spawn();

                    // Schedule bridge server
                    tokio::spawn(server.execute(bridge.serve()));

                    let port = SETTINGS.bridge.listen_port;
                    info!(
                        "idwallet v{} bridge listening on port {}",
                        env!("CARGO_PKG_VERSION"),
                        port
                    );

                    let routes = routes(client, Credentials::from_settings(&SETTINGS.bridge));
                    warp::serve(routes).run(([127, 0, 0, 1], port)).await;
                } else {
                    loop {
                        sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        };

        #[cfg(not(feature = "bridge"))]
        let run_bridge = async move {
            let _ = (backend, prefs);
            loop {
                sleep(Duration::from_secs(1)).await;
            }
        };

        tokio::select!(
            _ = tokio::spawn(run_bridge) => (),
            _ = tokio::spawn(check_exit_signal()) => (),
        );

        // Stop polling the daemon before the runtime goes away
        #[cfg(feature = "bridge")]
        if let Some(bridge) = bridge {
            let open = bridge.sessions().len();
            bridge.sessions().clear();
            debug!("Closed {open} tracker sessions");
        }

        Ok(())
    })
}

async fn check_exit_signal() {
    loop {
        if exit_requested() {
            break;
        }

        sleep(Duration::from_millis(10)).await;
    }

    info!("idwallet v{} shutting down...", env!("CARGO_PKG_VERSION"))
}
