use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::deliver::RetryPolicy;
use crate::router;
use crate::sink::{Ingest, MixpanelClient};
use crate::time::SystemTime;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let client: Option<Arc<dyn Ingest + Send + Sync>> = match &config.mixpanel_project_token {
        Some(token) => {
            let client =
                MixpanelClient::new(token, &config.mixpanel_base_url, config.request_timeout.0)
                    .expect("failed to create ingestion client");
            let client: Arc<dyn Ingest + Send + Sync> = Arc::new(client);
            Some(client)
        }
        None => {
            tracing::warn!("MIXPANEL_PROJECT_TOKEN is not set, postbacks will be rejected");
            None
        }
    };

    let retry = RetryPolicy::new(
        config.retry_policy.max_attempts,
        config.retry_policy.base_interval.0,
    );

    let app = router::router(SystemTime {}, client, retry, config.export_prometheus);

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}
