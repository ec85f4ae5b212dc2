mod support;

use std::sync::Arc;

use folio_offline::worker::{CacheStorage, FetchRequest, metrics::METRIC_FETCH_TOTAL};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use support::{ScriptedNetwork, registration, serve_shell, url, worker_config};
use url::Url;

#[tokio::test]
async fn fetch_total_counts_only_intercepted_requests() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let network = ScriptedNetwork::new();
    serve_shell(&network);
    let registration = registration(network.clone(), Arc::new(CacheStorage::default()));
    registration.register(worker_config("v1")).await.expect("install");

    // Handed straight to the network, never intercepted.
    let data = FetchRequest::get(Url::parse("data:text/plain,hi").expect("data url"));
    let _ = registration.dispatch_fetch(data).await;
    registration
        .dispatch_fetch(FetchRequest::navigate(url("/")))
        .await
        .expect("navigation");

    let counted: Vec<(String, u64)> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| key.key().name() == METRIC_FETCH_TOTAL)
        .filter_map(|(key, _, _, value)| {
            let class = key
                .key()
                .labels()
                .find(|label| label.key() == "class")
                .map(|label| label.value().to_string())?;
            match value {
                DebugValue::Counter(count) => Some((class, count)),
                _ => None,
            }
        })
        .collect();

    assert_eq!(counted, vec![("navigation".to_string(), 1)]);
}
