use crate::{
    generator::ConfigGenerator,
    index::{self, Dispatch, DispatchMetrics, Oracle, OracleConfig, Store},
    scheduler::{self, Scheduler, SchedulerMetrics},
    sink::Sink,
    watch,
};
use anyhow::{bail, Result};
use clap::Parser;
use parking_lot::RwLock;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tokio::time::Duration;
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "gateway-trigger",
    about = "Decides which cluster changes require regenerating gateway configuration"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "gateway_trigger=info,warn",
        env = "GATEWAY_TRIGGER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The GatewayClass controller name this controller owns.
    #[clap(long, default_value = "flomesh.io/gateway-controller")]
    controller_name: String,

    /// Whether the data plane reads EndpointSlices rather than Endpoints.
    #[clap(long)]
    use_endpoint_slices: bool,

    #[clap(long, default_value = "250")]
    debounce_ms: u64,

    /// The longest a burst of changes may postpone a generation.
    #[clap(long, default_value = "2000")]
    max_delay_ms: u64,

    #[clap(long, default_value = "30000")]
    generate_timeout_ms: u64,

    #[clap(long, default_value = "100")]
    backoff_base_ms: u64,

    #[clap(long, default_value = "30000")]
    backoff_max_ms: u64,

    /// Consecutive generator failures before the error is surfaced.
    #[clap(long, default_value = "5")]
    failure_threshold: u32,

    #[clap(long, default_value = "10000")]
    shutdown_grace_ms: u64,

    /// Where the latest configuration is written.
    #[clap(long, default_value = "/var/run/gateway-trigger/config.json")]
    output: PathBuf,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            controller_name,
            use_endpoint_slices,
            debounce_ms,
            max_delay_ms,
            generate_timeout_ms,
            backoff_base_ms,
            backoff_max_ms,
            failure_threshold,
            shutdown_grace_ms,
            output,
        } = self;

        if failure_threshold == 0 {
            bail!("--failure-threshold must be at least 1");
        }
        let config = scheduler::Config {
            debounce: Duration::from_millis(debounce_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            generate_timeout: Duration::from_millis(generate_timeout_ms),
            backoff_base: Duration::from_millis(backoff_base_ms),
            backoff_max: Duration::from_millis(backoff_max_ms),
            failure_threshold,
            shutdown_grace: Duration::from_millis(shutdown_grace_ms),
        };

        // The scheduler is the index's only writer; the oracle reads
        // snapshots of it alongside the objects observed by the watches.
        let (writer, reader) = index::pair();
        let store = Store::default();
        let oracle = Oracle::new(
            reader.clone(),
            store.clone(),
            OracleConfig {
                controller_name: controller_name.clone(),
                use_endpoint_slices,
            },
        );

        let mut prom = <Registry>::default();
        let dispatch_metrics = DispatchMetrics::register(&mut prom);
        index::metrics::register_index_size(&mut prom, reader);
        let scheduler_metrics = SchedulerMetrics::register(prom.sub_registry_with_prefix("scheduler"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let generator = ConfigGenerator::new(store, controller_name);
        let (scheduler, handle) = Scheduler::new(config, generator, writer, scheduler_metrics);
        let artifacts = scheduler.artifacts();

        let dispatch = Arc::new(RwLock::new(Dispatch::new(
            oracle,
            dispatch_metrics,
            handle,
        )));
        watch::spawn_all(&mut runtime, &dispatch).await;

        let drain = runtime.shutdown_handle();
        tokio::spawn(async move {
            if let Err(error) = scheduler.run(drain).await {
                // The generator reported references it never added; the index
                // can no longer be trusted.
                error!(%error, "reference index corrupted");
                std::process::abort();
            }
        });

        tokio::spawn(
            Sink::new(output)
                .run(artifacts, runtime.shutdown_handle())
                .instrument(info_span!("sink")),
        );

        info!("watching resources");

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
