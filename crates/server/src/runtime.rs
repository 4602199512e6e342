//! Event loop that owns the session.
//!
//! Events are reduced one at a time in arrival order. Effects that need the
//! network or a timer run as spawned tasks and report back by queueing a new
//! event, so the session is never touched outside the loop.

use crate::config::OverlayConfig;
use dealdesk_engine::retry::fetch_catalog_with_retry;
use dealdesk_engine::transport::{self, HostTransport};
use dealdesk_engine::{
    project, Effect, Event, ExpiryTimer, Reducer, RetryPolicy, Session, ViewModel,
};
use dealdesk_protocol::{Endpoint, SellResult};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

struct Envelope {
    event: Event,
    reply: Option<oneshot::Sender<ViewModel>>,
}

/// The runtime task is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeGone;

impl fmt::Display for RuntimeGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("overlay runtime stopped")
    }
}

impl std::error::Error for RuntimeGone {}

/// Cheap, cloneable entry point into a running overlay.
#[derive(Debug, Clone)]
pub struct OverlayHandle {
    events: mpsc::UnboundedSender<Envelope>,
    view: watch::Receiver<ViewModel>,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope").field("event", &self.event).finish()
    }
}

impl OverlayHandle {
    /// Queue `event` and wait for the view it produces.
    pub async fn dispatch(&self, event: Event) -> Result<ViewModel, RuntimeGone> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(Envelope {
                event,
                reply: Some(reply),
            })
            .map_err(|_| RuntimeGone)?;
        rx.await.map_err(|_| RuntimeGone)
    }

    pub fn view(&self) -> ViewModel {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.view.clone()
    }
}

#[derive(Debug, Clone, Copy)]
struct Timings {
    retry: RetryPolicy,
    fetch_delay: Duration,
    close_settle: Duration,
    notice_ttl: Duration,
}

struct Runtime<T: HostTransport> {
    reducer: Reducer,
    session: Session,
    transport: Arc<T>,
    timings: Timings,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    feedback: mpsc::WeakUnboundedSender<Envelope>,
    view: watch::Sender<ViewModel>,
    expiry: ExpiryTimer,
}

/// Start the overlay loop and announce readiness to the host.
///
/// The loop stops once every [`OverlayHandle`] is dropped and in-flight
/// work has drained.
pub fn spawn<T: HostTransport>(transport: T, config: &OverlayConfig) -> OverlayHandle {
    let session = Session::default();
    let (events, inbox) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(project(&session));
    let host = Arc::new(transport);

    let runtime = Runtime {
        reducer: Reducer::new(config.expiry()),
        session,
        transport: host.clone(),
        timings: Timings {
            retry: config.retry_policy(),
            fetch_delay: config.fetch_delay(),
            close_settle: config.close_settle(),
            notice_ttl: config.notice_ttl(),
        },
        inbox,
        feedback: events.downgrade(),
        view: view_tx,
        expiry: ExpiryTimer::new(),
    };

    tokio::spawn(async move {
        match transport::notify(&*host, Endpoint::Ready).await {
            Ok(()) => info!("host notified: ready"),
            Err(err) => warn!(error = %err, "ready notification failed"),
        }
    });
    tokio::spawn(runtime.run());

    OverlayHandle {
        events,
        view: view_rx,
    }
}

impl<T: HostTransport> Runtime<T> {
    async fn run(mut self) {
        info!("overlay runtime started");
        while let Some(Envelope { event, reply }) = self.inbox.recv().await {
            debug!(?event, "reducing");
            let session = std::mem::take(&mut self.session);
            let (next, effects) = self
                .reducer
                .apply(session, event, OffsetDateTime::now_utc());
            self.session = next;

            let view = project(&self.session);
            self.view.send_replace(view.clone());
            if let Some(reply) = reply {
                let _ = reply.send(view);
            }

            for effect in effects {
                self.execute(effect);
            }
        }
        self.expiry.cancel();
        info!("overlay runtime stopped");
    }

    fn execute(&mut self, effect: Effect) {
        let host = self.transport.clone();
        let timings = self.timings;

        match effect {
            Effect::ArmExpiry { generation, after } => {
                let weak = self.feedback.clone();
                self.expiry.rearm(after, move || {
                    info!(generation, "session expired; closing");
                    if let Some(tx) = weak.upgrade() {
                        let _ = tx.send(feedback(Event::ExpiryFired { generation }));
                    }
                });
            }
            Effect::CancelExpiry => {
                self.expiry.cancel();
            }
            Effect::RequestPlayerStats => {
                tokio::spawn(async move {
                    let sent = transport::notify(&*host, Endpoint::RequestPlayerStats).await;
                    if let Err(err) = sent {
                        debug!(error = %err, "player stats request failed");
                    }
                });
            }
            Effect::FetchCatalog { generation } => self.report(move |tx| async move {
                tokio::time::sleep(timings.fetch_delay).await;
                match transport::diagnostic(&*host).await {
                    Ok(echo) => debug!(?echo, "host test echo"),
                    Err(err) => warn!(error = %err, "host test failed"),
                }
                let (items, source) = fetch_catalog_with_retry(&*host, &timings.retry).await;
                let _ = tx.send(feedback(Event::CatalogLoaded {
                    generation,
                    items,
                    source,
                }));
            }),
            Effect::SendSell {
                generation,
                request,
            } => self.report(move |tx| async move {
                info!(item = %request.item, amount = request.amount, "sell requested");
                let event = match transport::request_sell(&*host, &request).await {
                    Ok(resp) => Event::SellCompleted {
                        generation,
                        result: SellResult::from(resp),
                    },
                    Err(err) => {
                        warn!(error = %err, "sell request failed");
                        Event::SellErrored {
                            generation,
                            error: err.to_string(),
                        }
                    }
                };
                let _ = tx.send(feedback(event));
            }),
            Effect::SendClose { generation } => self.report(move |tx| async move {
                match transport::notify(&*host, Endpoint::Close).await {
                    Ok(()) => info!(generation, "close callback sent"),
                    Err(err) => warn!(generation, error = %err, "close callback failed"),
                }
                // Released on a timer whatever the outcome.
                tokio::time::sleep(timings.close_settle).await;
                let _ = tx.send(feedback(Event::CloseSettled { generation }));
            }),
            Effect::SaveColors { colors } => self.report(move |tx| async move {
                let event = match transport::save_colors(&*host, &colors).await {
                    Ok(resp) => Event::ColorsSaved {
                        success: resp.success,
                        message: resp.message,
                    },
                    Err(err) => {
                        warn!(error = %err, "saving colors failed");
                        Event::ColorsSaved {
                            success: false,
                            message: Some(format!("Error saving colors: {err}")),
                        }
                    }
                };
                let _ = tx.send(feedback(event));
            }),
            Effect::ShowNotice(notice) => {
                debug!(id = notice.id, kind = ?notice.kind, text = %notice.text, "notice");
                self.report(move |tx| async move {
                    tokio::time::sleep(timings.notice_ttl).await;
                    let _ = tx.send(feedback(Event::NoticeExpired { id: notice.id }));
                });
            }
        }
    }

    /// Spawn `task` with a sender for the event it reports back. Skipped once
    /// every handle is gone and the loop is draining.
    fn report<F, Fut>(&self, task: F)
    where
        F: FnOnce(mpsc::UnboundedSender<Envelope>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(tx) = self.feedback.upgrade() {
            tokio::spawn(task(tx));
        }
    }
}

fn feedback(event: Event) -> Envelope {
    Envelope { event, reply: None }
}
