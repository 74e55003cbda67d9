//! The Execute Service loop (spec §4.5): consume a Job from the execute
//! stream, ack it immediately (at-least-once, not exactly-once — a crash
//! mid-job loses the work unless the adapter graph is cache-backed), build
//! a `DfmRequest` for it, then either run the normal pipeline or the
//! discovery pass depending on `job.is_discovery`.
//!
//! Grounded on `original_source/src/k8s/execute/_execute_service.py`'s
//! consume-ack-compile-stream loop.

use std::collections::HashMap;
use std::sync::Arc;

use dfm_compiler::{build_advice_tree, pipeline_dict_to_adapter_graph, pipeline_dict_to_discovery_adapters, DiscoveryOutput, Site};
use dfm_core::{DfmError, DfmResult, Job};
use dfm_runtime::adapter::AdapterHandle;
use dfm_runtime::request::DfmRequest;
use dfm_transport::{Channel, Transport, TransportResult};
use uuid::Uuid;

/// Compile `job.execute.body` and stream every leaf to the client: each
/// item becomes a `ValueResponse` (or, when the adapter declares
/// `prepare_to_send`, the adapter's own response shape), followed by a
/// heartbeat so a slow-producing leaf doesn't look dead to the client
/// between items.
pub async fn run_pipeline(job: &Job, site: &Site, request: &DfmRequest) -> DfmResult<()> {
    let leaves = pipeline_dict_to_adapter_graph(&job.execute.body, site, request)?;
    let results = futures_util::future::join_all(leaves.iter().map(|leaf| drain_leaf(leaf, request))).await;
    // Run every leaf to completion before surfacing the first failure —
    // a failing leaf must not starve its siblings of their own responses.
    results.into_iter().collect::<DfmResult<Vec<()>>>()?;
    Ok(())
}

async fn drain_leaf(leaf: &Arc<AdapterHandle>, request: &DfmRequest) -> DfmResult<()> {
    let stream = leaf.get_or_create_stream().await;
    let mut cursor = stream.cursor();
    let node_id = leaf.node_id();
    loop {
        match cursor.next().await {
            Some(Ok(item)) => {
                match leaf.prepare_to_send(&item) {
                    Some(body) => request.send_response_body(node_id, body).await?,
                    None => request.send_value(node_id, item).await?,
                }
                request.send_heartbeat(node_id).await?;
            }
            Some(Err(e)) => {
                request.send_error(node_id, e.clone()).await?;
                return Err(e);
            }
            None => return Ok(()),
        }
    }
}

/// Run the discovery compiler pass over `job.execute.body` and deliver one
/// `DiscoveryResponse` carrying every node's advice tree, keyed by
/// `node_id`. Attached to the enclosing `Execute` node's id since
/// discovery has no leaf concept of its own to anchor the response to.
pub async fn run_discovery(job: &Job, site: &Site, request: &DfmRequest) -> DfmResult<()> {
    let outputs = pipeline_dict_to_discovery_adapters(&job.execute.body, site)?;
    let mut advice = serde_json::Map::with_capacity(outputs.len());
    for (node_id, output) in &outputs {
        let node = job
            .execute
            .body
            .get(node_id)
            .ok_or_else(|| DfmError::server(format!("discovery output for unknown node {node_id}")))?;
        let value = match output {
            DiscoveryOutput::Single(candidate) => {
                let tree = build_advice_tree(candidate, node, site).await?;
                serde_json::json!({ "provider": candidate.provider_key, "advice": tree })
            }
            DiscoveryOutput::Many(candidates) => {
                let mut options = Vec::with_capacity(candidates.len());
                for candidate in candidates {
                    let tree = build_advice_tree(candidate, node, site).await?;
                    options.push(serde_json::json!({ "provider": candidate.provider_key, "advice": tree }));
                }
                serde_json::Value::Array(options)
            }
        };
        advice.insert(node_id.to_string(), value);
    }
    request
        .send_discovery(job.execute.meta.node_id, serde_json::Value::Object(advice))
        .await
}

/// How long to back off after finding nothing on the execute stream, to
/// avoid busy-polling a non-blocking `XREADGROUP`.
const IDLE_BACKOFF: std::time::Duration = std::time::Duration::from_millis(100);

/// Consume one Package from the uplink stream, if any is pending, and
/// re-inject its Job into this site's own execute/scheduler routing —
/// the Uplink Service's delivery half (spec §2: "the target site's
/// Execute Service picks [packages] up"). Logs the sender's `Welcome`
/// envelope at `debug` when the package carries one.
pub async fn process_one_package(transport: &Arc<dyn Transport>, consumer: &str) -> TransportResult<bool> {
    let Some(delivery) = transport.consume_package(consumer).await? else {
        return Ok(false);
    };
    transport.ack(Channel::Uplink, &delivery.ack_id).await?;

    let package = delivery.item;
    if let Some(welcome) = &package.welcome {
        tracing::debug!(site = %welcome.site, version = %welcome.version, source_site = %package.source_site, "received uplink package");
    }

    let job = package.job;
    if job.is_delayed() {
        transport.enqueue_job(Channel::Scheduler, &job).await?;
    } else {
        transport.enqueue_job(Channel::Execute, &job).await?;
    }
    Ok(true)
}

/// Run the job-processing half of the Execute Service loop until `cancel`
/// fires: drain the execute stream continuously, backing off briefly
/// whenever it comes up empty.
pub async fn run_job_task(
    transport: Arc<dyn Transport>,
    consumer: String,
    site: Site,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            processed = process_one_job(&transport, &consumer, &site) => {
                match processed {
                    Ok(true) => {}
                    Ok(false) => tokio::time::sleep(IDLE_BACKOFF).await,
                    Err(e) => {
                        tracing::error!(error = %e, "execute service failed to consume a job");
                        tokio::time::sleep(IDLE_BACKOFF).await;
                    }
                }
            }
        }
    }
}

/// Run the uplink-draining half of the Execute Service loop until
/// `cancel` fires: drain the uplink stream continuously, handing every
/// Package it finds back into this site's own execute/scheduler
/// routing, backing off briefly whenever it comes up empty.
pub async fn run_uplink_task(transport: Arc<dyn Transport>, consumer: String, cancel: tokio_util::sync::CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            processed = process_one_package(&transport, &consumer) => {
                match processed {
                    Ok(true) => {}
                    Ok(false) => tokio::time::sleep(IDLE_BACKOFF).await,
                    Err(e) => {
                        tracing::error!(error = %e, "execute service failed to consume an uplink package");
                        tokio::time::sleep(IDLE_BACKOFF).await;
                    }
                }
            }
        }
    }
}

/// Run the Execute Service: the job-processing task and the uplink-draining
/// task concurrently, until `cancel` fires. Two tasks sharing one
/// `CancellationToken`, the same shape `dfm-scheduler::run` uses for its
/// own pair of concurrent loops.
pub async fn run(
    transport: Arc<dyn Transport>,
    consumer: String,
    site: Site,
    cancel: tokio_util::sync::CancellationToken,
) {
    let jobs = tokio::spawn(run_job_task(transport.clone(), consumer.clone(), site, cancel.clone()));
    let uplink = tokio::spawn(run_uplink_task(transport, consumer, cancel));
    let _ = tokio::join!(jobs, uplink);
}

/// Consume one Job from the execute stream, if any is pending, and run it.
/// Acks before running the job (spec §7: "a job's `ack` is performed
/// before execution starts" — a crash mid-job loses the work unless the
/// adapter graph is cache-backed), and on failure delivers the error
/// through the job's own `DfmRequest` rather than propagating it: the
/// Execute Service loop must keep running after a single job's failure.
pub async fn process_one_job(transport: &Arc<dyn Transport>, consumer: &str, site: &Site) -> TransportResult<bool> {
    let Some(delivery) = transport.consume_job(Channel::Execute, consumer).await? else {
        return Ok(false);
    };
    transport.ack(Channel::Execute, &delivery.ack_id).await?;

    let job = delivery.item;
    let request = DfmRequest::new(transport.clone(), site.name().to_string(), job.home_site.clone(), job.request_id);
    let _span = request.span().entered();

    let outcome = if job.is_discovery {
        run_discovery(&job, site, &request).await
    } else {
        run_pipeline(&job, site, &request).await
    };

    if let Err(e) = outcome {
        tracing::error!(error = %e, "execute service job failed");
        if let Err(send_err) = request.send_error(job.execute.meta.node_id, e).await {
            tracing::error!(error = %send_err, "failed to deliver error response for a failed job");
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfm_config::SiteConfig;
    use dfm_core::function_call::{Constant, Execute as ExecuteNode, FunctionCall, GreetMe, NodeMeta, Provider};
    use dfm_transport::MockTransport;
    use std::collections::HashMap as StdHashMap;

    /// `GreetMe`'s cache writes under `cache_fsspec_conf.path` — point it
    /// at a leaked tempdir rather than the default `.dfm-cache` so running
    /// these tests never writes cache files into the crate's own
    /// directory.
    fn site() -> Site {
        let cache_dir = tempfile::tempdir().unwrap().into_path();
        Site::new(
            SiteConfig::from_yaml_str(&format!(
                r#"
site: site-a
providers:
  dfm:
    provider_class: dfm.provider.LocalProvider
    cache_fsspec_conf: {{ protocol: "file", path: "{}" }}
    interface:
      dfm.api.dfm.GreetMe: {{ greeting: "Hello" }}
"#,
                cache_dir.display()
            ))
            .unwrap(),
        )
    }

    fn greet_me_execute_job() -> Job {
        let node_id = Uuid::new_v4();
        let mut body: HashMap<Uuid, FunctionCall> = StdHashMap::new();
        body.insert(
            node_id,
            FunctionCall::GreetMe(GreetMe {
                meta: NodeMeta::new(node_id),
                name: "World".to_string(),
            }),
        );
        let execute = ExecuteNode {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("site-a".to_string()),
            body,
        };
        Job::new("site-a", Uuid::new_v4(), execute)
    }

    #[tokio::test]
    async fn hello_world_produces_exactly_one_value_response() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let job = greet_me_execute_job();
        let request_id = job.request_id;
        let request = DfmRequest::new(transport.clone(), "site-a", "site-a", request_id);

        run_pipeline(&job, &site(), &request).await.unwrap();

        let mock = transport.as_ref();
        let responses = mock.get_responses(request_id).await.unwrap();
        let values: Vec<_> = responses
            .iter()
            .filter(|r| matches!(r.body, dfm_core::ResponseBody::Value(_)))
            .collect();
        assert_eq!(values.len(), 1);
        match &values[0].body {
            dfm_core::ResponseBody::Value(v) => assert_eq!(v.value, serde_json::json!("Hello World")),
            other => panic!("expected Value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn process_one_job_consumes_acks_and_delivers_the_response() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let job = greet_me_execute_job();
        let request_id = job.request_id;
        transport.enqueue_job(Channel::Execute, &job).await.unwrap();

        let processed = process_one_job(&transport, "execute-1", &site()).await.unwrap();
        assert!(processed);

        let responses = transport.get_responses(request_id).await.unwrap();
        assert!(responses
            .iter()
            .any(|r| matches!(r.body, dfm_core::ResponseBody::Value(_))));
    }

    #[tokio::test]
    async fn empty_stream_reports_no_job_processed() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let processed = process_one_job(&transport, "execute-1", &site()).await.unwrap();
        assert!(!processed);
    }

    #[tokio::test]
    async fn a_node_referencing_an_unknown_provider_surfaces_as_an_error_response() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let node_id = Uuid::new_v4();
        let mut meta = NodeMeta::new(node_id);
        meta.provider = Some(Provider::Named("nope".to_string()));
        let mut body: HashMap<Uuid, FunctionCall> = StdHashMap::new();
        body.insert(node_id, FunctionCall::Constant(Constant { meta, value: serde_json::json!(1) }));
        let execute = ExecuteNode {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("site-a".to_string()),
            body,
        };
        let job = Job::new("site-a", Uuid::new_v4(), execute);
        let request_id = job.request_id;
        transport.enqueue_job(Channel::Execute, &job).await.unwrap();

        process_one_job(&transport, "execute-1", &site()).await.unwrap();

        let responses = transport.get_responses(request_id).await.unwrap();
        assert!(responses
            .iter()
            .any(|r| matches!(r.body, dfm_core::ResponseBody::Error(_))));
    }

    #[tokio::test]
    async fn discovery_job_produces_a_single_discovery_response() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let node_id = Uuid::new_v4();
        let mut meta = NodeMeta::new(node_id);
        meta.provider = Some(Provider::Named("dfm".to_string()));
        let mut body: HashMap<Uuid, FunctionCall> = StdHashMap::new();
        body.insert(
            node_id,
            FunctionCall::GreetMe(GreetMe { meta, name: "World".to_string() }),
        );
        let execute = ExecuteNode {
            meta: NodeMeta::new(Uuid::new_v4()),
            site: Some("site-a".to_string()),
            body,
        };
        let job = Job::new("site-a", Uuid::new_v4(), execute).with_discovery(true);
        let request_id = job.request_id;
        transport.enqueue_job(Channel::Execute, &job).await.unwrap();

        process_one_job(&transport, "execute-1", &site()).await.unwrap();

        let responses = transport.get_responses(request_id).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0].body, dfm_core::ResponseBody::Discovery(_)));
    }

    #[tokio::test]
    async fn run_stops_promptly_when_cancelled() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            run(transport, "execute-1".to_string(), site(), cancel),
        )
        .await
        .expect("run should return promptly once cancelled");
    }

    #[tokio::test]
    async fn undelayed_package_is_reinjected_onto_the_execute_stream() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let job = greet_me_execute_job();
        let package = dfm_core::Package::new("site-b", "site-a", job).with_welcome(dfm_core::Welcome::current("site-b"));
        transport.enqueue_package(&package).await.unwrap();

        let processed = process_one_package(&transport, "execute-1").await.unwrap();
        assert!(processed);

        let mock = transport.as_ref();
        assert_eq!(mock.pending_len(Channel::Uplink), 0);
        assert_eq!(mock.pending_len(Channel::Execute), 1);
        assert_eq!(mock.pending_len(Channel::Scheduler), 0);
    }

    #[tokio::test]
    async fn delayed_package_is_reinjected_onto_the_scheduler_stream() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let mut job = greet_me_execute_job();
        job = job.with_deadline(chrono::Utc::now() + chrono::Duration::seconds(60));
        let package = dfm_core::Package::new("site-b", "site-a", job);
        transport.enqueue_package(&package).await.unwrap();

        process_one_package(&transport, "execute-1").await.unwrap();

        let mock = transport.as_ref();
        assert_eq!(mock.pending_len(Channel::Scheduler), 1);
        assert_eq!(mock.pending_len(Channel::Execute), 0);
    }

    #[tokio::test]
    async fn no_package_pending_reports_nothing_processed() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let processed = process_one_package(&transport, "execute-1").await.unwrap();
        assert!(!processed);
    }

    #[tokio::test]
    async fn run_drains_both_the_execute_stream_and_the_uplink_stream() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let job = greet_me_execute_job();
        let request_id = job.request_id;
        transport.enqueue_job(Channel::Execute, &job).await.unwrap();

        let cross_site_job = greet_me_execute_job();
        let cross_site_request_id = cross_site_job.request_id;
        let package = dfm_core::Package::new("site-b", "site-a", cross_site_job);
        transport.enqueue_package(&package).await.unwrap();

        let cancel = tokio_util::sync::CancellationToken::new();
        let handle = tokio::spawn(run(transport.clone(), "execute-1".to_string(), site(), cancel.clone()));

        // Both the directly-enqueued job and the uplink-delivered package
        // (which `run` must re-inject onto the execute stream itself)
        // should eventually produce a response, with no real Redis to
        // wait on.
        let mock = transport.as_ref();
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let direct_done = !mock.get_responses(request_id).await.unwrap().is_empty();
            let relayed_done = !mock.get_responses(cross_site_request_id).await.unwrap().is_empty();
            if direct_done && relayed_done {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "run did not drain both streams in time");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("run should return promptly once cancelled")
            .unwrap();

        assert_eq!(mock.pending_len(Channel::Uplink), 0);
    }
}
