//! Connection lifecycle: from an authenticated transport to teardown.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use futures::{Sink, Stream};
use metrics::{counter, gauge, histogram};
use palaver_core::{ChatError, UserId};
use palaver_store::ChatStore;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};

use crate::hub::PresenceHub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::router::{EventRouter, Frame, RouterConfig};
use crate::session::{ChatSession, SessionHandle};

/// Everything a connection needs from the server.
#[derive(Clone)]
pub struct ConnectionDeps {
    /// Message persistence.
    pub store: Arc<dyn ChatStore>,
    /// Presence registry.
    pub hub: Arc<PresenceHub>,
    /// Per-connection router tuning.
    pub router: RouterConfig,
    /// Server-wide shutdown. Each connection runs on a child token.
    pub shutdown: CancellationToken,
}

/// Serve one authenticated connection until it ends.
///
/// 1. Load previews; on failure send an error frame and close
/// 2. Register with the hub (evicting any older connection for this user)
/// 3. Send the preview hydration frame
/// 4. Run the router until the transport ends or the session is closed
/// 5. Unregister this connection, then close the router and transport
pub async fn serve_connection<W, R, E>(sink: W, frames: R, user_id: UserId, deps: ConnectionDeps)
where
    W: Sink<Frame> + Send + Unpin + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let mut router = EventRouter::new(sink, &deps.router, deps.shutdown.child_token());
    let handle = Arc::new(SessionHandle::new(user_id, router.outbox()));
    let span = info_span!(
        "connection",
        user_id = %user_id,
        connection_id = %handle.connection_id()
    );

    async move {
        let mut session =
            match ChatSession::connect(Arc::clone(&handle), deps.store, Arc::clone(&deps.hub)).await {
                Ok(session) => session,
                Err(err) => {
                    error!(op = "list_previews", error = %err, "could not get all chats");
                    let _ = router.send(
                        &ChatError::Internal("could not load conversations".into()).to_outbound(),
                    );
                    router.close().await;
                    return;
                }
            };

        ChatSession::bind(&mut router);
        deps.hub.register(Arc::clone(&handle));
        let connected_at = Instant::now();
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        let _ = session.hydrate();
        info!("client connected");

        router.run(&mut session, frames).await;

        let _ = deps.hub.unregister_connection(&user_id, handle.connection_id());
        router.close().await;
        info!(dropped = router.outbox().dropped_count(), "client disconnected");
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(connected_at.elapsed().as_secs_f64());
    }
    .instrument(span)
    .await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
