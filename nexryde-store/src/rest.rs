use std::{sync::Arc, time::Duration};

use anyhow::bail;
use futures::StreamExt;
use log::{error, warn};
use reqwest::{Client, StatusCode};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use nexryde_logic::{LocationStore, PositionRecord, StoreChange, TrackingScope, prelude::*};

use crate::{feed::FeedDecoder, server};

type QueuePair<T> = (mpsc::Sender<T>, Mutex<mpsc::Receiver<T>>);
type Queue = QueuePair<StoreChange>;

const FEED_RETRY_DELAY: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Store client over the hosted position table: REST for reads and writes,
/// a server-sent-events stream for change notifications.
pub struct RestStore {
    my_id: Uuid,
    scope: TrackingScope,
    client: Client,
    incoming: Queue,
    cancel_token: CancellationToken,
}

impl RestStore {
    pub fn connect(my_id: Uuid, scope: TrackingScope) -> Result<Arc<Self>> {
        let (itx, irx) = mpsc::channel(30);

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let store = Arc::new(Self {
            my_id,
            scope,
            client,
            incoming: (itx, Mutex::new(irx)),
            cancel_token: CancellationToken::new(),
        });

        tokio::spawn({
            let store = store.clone();
            async move {
                store.feed_loop().await;
            }
        });

        Ok(store)
    }

    async fn push_incoming(&self, change: StoreChange) {
        self.incoming
            .0
            .send(change)
            .await
            .expect("Failed to push to incoming queue");
    }

    /// Run the SSE feed until cancelled. A dead feed is retried after a
    /// delay; consumers keep working off the periodic re-fetch meanwhile.
    async fn feed_loop(&self) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    break;
                }

                res = self.run_feed() => {
                    let why = match res {
                        Ok(()) => "feed stream ended".to_string(),
                        Err(why) => format!("{why:#}"),
                    };
                    warn!("Change feed dropped: {why}");
                    self.push_incoming(StoreChange::Error(why)).await;

                    tokio::select! {
                        _ = self.cancel_token.cancelled() => break,
                        _ = tokio::time::sleep(FEED_RETRY_DELAY) => {}
                    }
                }
            }
        }

        self.push_incoming(StoreChange::Disconnected).await;
    }

    async fn run_feed(&self) -> Result {
        let resp = self
            .client
            .get(server::feed_url(&self.scope))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .context("Could not open change feed")?
            .error_for_status()
            .context("Server refused change feed")?;

        let mut decoder = FeedDecoder::default();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Change feed read failed")?;
            match decoder.consume(&chunk) {
                Ok(events) => {
                    for event in events {
                        self.push_incoming(event.into()).await;
                    }
                }
                Err(why) => {
                    // One undecodable event does not invalidate the stream
                    error!("Skipping undecodable feed data: {why:?}");
                }
            }
        }

        Ok(())
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

impl LocationStore for RestStore {
    fn self_id(&self) -> Uuid {
        self.my_id
    }

    async fn upsert(&self, record: &PositionRecord) -> Result {
        if record.user_id != self.my_id {
            bail!("Refusing to write another actor's record");
        }

        self.client
            .post(server::positions_url(&self.scope))
            .json(record)
            .send()
            .await
            .context("Could not send position update")?
            .error_for_status()
            .context("Server rejected position update")?;
        Ok(())
    }

    async fn fetch_all(&self, scope: &TrackingScope) -> Result<Vec<PositionRecord>> {
        self.client
            .get(server::positions_url(scope))
            .send()
            .await
            .context("Could not fetch positions")?
            .error_for_status()
            .context("Server rejected position fetch")?
            .json::<Vec<PositionRecord>>()
            .await
            .context("Malformed position list")
    }

    async fn delete_own(&self) -> Result {
        let resp = self
            .client
            .delete(server::delete_url(self.my_id, &self.scope))
            .send()
            .await
            .context("Could not delete own position")?;

        // Nothing to delete is already the state we want
        if resp.status() != StatusCode::NOT_FOUND {
            resp.error_for_status()
                .context("Server rejected position delete")?;
        }
        Ok(())
    }

    async fn receive_changes(&self) -> impl Iterator<Item = StoreChange> {
        let mut rx = self.incoming.1.lock().await;
        let mut buf = Vec::with_capacity(30);
        rx.recv_many(&mut buf, 30).await;
        buf.into_iter()
    }

    async fn disconnect(&self) {
        self.cancel();
    }
}
