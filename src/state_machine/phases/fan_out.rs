use std::{collections::HashSet, future::Future, sync::Arc, time::Duration};

use tokio::{sync::mpsc, time};
use tracing::{debug, debug_span, warn};
use tracing_futures::Instrument;

use crate::{
    client::{ClientError, ClientProxy},
    partition::ClientId,
    strategy::Failure,
};

/// Sends one request per client concurrently and waits until every client has answered, failed or
/// timed out.
///
/// Every request runs in its own task under the given deadline. A client whose task ends without
/// reporting back (e.g. because it panicked) is counted as crashed. Results and failures are
/// ordered by client id.
pub async fn fan_out<I, R, F, Fut>(
    instructions: Vec<(Arc<dyn ClientProxy>, I)>,
    timeout: Duration,
    request: F,
) -> (Vec<R>, Vec<Failure>)
where
    F: Fn(Arc<dyn ClientProxy>, I) -> Fut,
    Fut: Future<Output = Result<R, ClientError>> + Send + 'static,
    R: Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(instructions.len().max(1));
    let mut dispatched = Vec::with_capacity(instructions.len());
    for (client, ins) in instructions {
        let client_id = client.id();
        let tx = tx.clone();
        let response = request(client, ins);
        tokio::spawn(
            async move {
                let response = match time::timeout(timeout, response).await {
                    Ok(response) => response,
                    Err(_) => Err(ClientError::Timeout(timeout)),
                };
                // the receiver outlives all senders
                let _ = tx.send((client_id, response)).await;
            }
            .instrument(debug_span!("client", client_id)),
        );
        dispatched.push(client_id);
    }
    drop(tx);

    let mut responses = Vec::with_capacity(dispatched.len());
    while let Some(response) = rx.recv().await {
        responses.push(response);
    }

    let reported = responses.iter().map(|(id, _)| *id).collect::<HashSet<_>>();
    for client_id in dispatched {
        if !reported.contains(&client_id) {
            responses.push((
                client_id,
                Err(ClientError::Crashed("the request task ended unexpectedly".into())),
            ));
        }
    }
    responses.sort_by_key(|(id, _)| *id);

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (client_id, response) in responses {
        match response {
            Ok(result) => {
                debug!(client_id, "client responded");
                results.push(result);
            }
            Err(err) => {
                warn!(client_id, "client failed: {}", err);
                failures.push((client_id, err));
            }
        }
    }
    (results, failures)
}
