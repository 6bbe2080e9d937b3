// Binario principal del servidor LabOps
// Compile: cargo build --bin labops-server
// Run: cargo run --bin labops-server

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use labops_server_application::dispatch::{DispatchJobRunner, DispatchWorkOrderJob, Dispatcher};
use labops_server_domain::clients::{BrokerStatus, RequestContext};
use labops_server_domain::dispatch::DispatchableWorkOrderPolicy;
use labops_server_domain::event_bus::EventBus;
use labops_server_domain::testing::{
    InMemoryLimsClient, InMemoryPricingClient, InMemoryProjectClient, InMemorySetClient,
};
use labops_server_domain::work_orders::WorkOrderRepository;
use labops_server_infrastructure::messaging::nats::NatsConfig;
use labops_server_infrastructure::messaging::{
    DisabledBroker, InMemoryEventBus, NatsBrokerMonitor, NatsEventBus,
};
use labops_server_infrastructure::notifications::LoggingNotifier;
use labops_server_infrastructure::persistence::{
    InMemoryJobStore, InMemoryWorkOrderStore, InMemoryWorkPlanStore,
};
use labops_shared::config::ConfigLoader;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = std::path::PathBuf::from(".env");
    let loader = ConfigLoader::new(env_file.exists().then_some(env_file));
    let config = loader.load_server_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.level)?)
        .init();

    info!("🚀 Starting LabOps work-order server");

    // The broker capability is selected once at boot: a live NATS
    // monitor, or the disabled no-op when eventing is switched off.
    let (event_bus, broker): (Arc<dyn EventBus>, Arc<dyn BrokerStatus>) =
        if config.broker.events_enabled {
            let nats = NatsEventBus::connect(&NatsConfig::for_url(&config.broker.url)).await?;
            let monitor = NatsBrokerMonitor::new(nats.client());
            (Arc::new(nats), Arc::new(monitor))
        } else {
            warn!("Broker eventing disabled, using in-process event bus");
            (
                Arc::new(InMemoryEventBus::default()),
                Arc::new(DisabledBroker),
            )
        };

    // Local-mode wiring: in-memory stores and external-service stand-ins.
    // A deployment against the real registries swaps these adapters at
    // the same ports.
    let work_orders = Arc::new(InMemoryWorkOrderStore::new());
    let work_plans = Arc::new(InMemoryWorkPlanStore::new());
    let jobs = Arc::new(InMemoryJobStore::new());
    let sets = Arc::new(InMemorySetClient::new());
    let pricing = Arc::new(InMemoryPricingClient::new());
    let projects = Arc::new(InMemoryProjectClient::new());
    let lims = Arc::new(InMemoryLimsClient::new());
    let notifier = Arc::new(LoggingNotifier);

    let policy = DispatchableWorkOrderPolicy::new(
        pricing,
        projects,
        sets.clone(),
        work_plans.clone(),
        jobs.clone(),
    );
    let dispatcher = Arc::new(Dispatcher::new(lims, jobs.clone(), sets));
    let dispatch_job = Arc::new(DispatchWorkOrderJob::new(
        dispatcher,
        broker,
        work_orders.clone(),
        work_plans,
        jobs,
        event_bus,
        notifier,
    ));
    let runner = DispatchJobRunner::new(
        dispatch_job,
        config.dispatch.max_retry_count,
        config.dispatch.retry_interval(),
    );

    info!(
        poll_secs = config.dispatch.poll_interval_secs,
        max_retries = config.dispatch.max_retry_count,
        "Dispatch worker started"
    );

    let mut poll = tokio::time::interval(config.dispatch.poll_interval());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = poll.tick() => {
                if let Err(e) = dispatch_cycle(&runner, &policy, work_orders.as_ref()).await {
                    error!(error = %e, "Dispatch cycle failed");
                }
            }
        }
    }

    Ok(())
}

/// One pass over the queued work orders: policy gate, then the bounded
/// retry runner per order.
async fn dispatch_cycle(
    runner: &DispatchJobRunner,
    policy: &DispatchableWorkOrderPolicy,
    work_orders: &InMemoryWorkOrderStore,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = RequestContext::system();
    let queued = work_orders.find_queued().await?;

    for order in queued {
        let verdict = policy.evaluate(&order, &ctx).await?;
        if !verdict.is_dispatchable() {
            warn!(
                work_order_id = %order.id,
                violations = %verdict.violations().join("; "),
                "Work order not dispatchable"
            );
            continue;
        }

        if let Err(e) = runner.run(order.id, &ctx).await {
            error!(work_order_id = %order.id, error = %e, "Dispatch failed terminally");
        }
    }

    Ok(())
}
