// Message passing between extension processes
//
// Two channels:
// - Endpoint/Inbox: request/response, one oneshot reply per request
// - Broadcaster: fire-and-forget fan-out to every subscriber

use futures::channel::{mpsc, oneshot};
use std::sync::{Arc, Mutex};

use crate::error::BusError;
use crate::protocol::{Broadcast, Request, Response};

/// A request waiting for its answer.
pub struct Envelope {
    pub request: Request,
    reply: oneshot::Sender<Response>,
}

impl Envelope {
    pub fn respond(self, response: Response) {
        if self.reply.send(response).is_err() {
            tracing::debug!("Requester went away before {} was answered", self.request.name());
        }
    }
}

pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

/// Sending half of a request channel. Cheap to clone.
#[derive(Clone)]
pub struct Endpoint {
    name: &'static str,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Endpoint {
    pub async fn call(&self, request: Request) -> Result<Response, BusError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .unbounded_send(Envelope { request, reply })
            .map_err(|_| BusError::Disconnected(self.name))?;
        answer.await.map_err(|_| BusError::NoResponse(self.name))
    }
}

/// Create a named request channel (e.g. "runtime" for the background, "tab" for a page).
pub fn channel(name: &'static str) -> (Endpoint, Inbox) {
    let (tx, rx) = mpsc::unbounded();
    (Endpoint { name, tx }, rx)
}

pub type BroadcastStream = mpsc::UnboundedReceiver<Broadcast>;

#[derive(Clone, Default)]
pub struct Broadcaster {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<Broadcast>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> BroadcastStream {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// Deliver to every live subscriber; returns how many received it.
    pub fn publish(&self, message: Broadcast) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|s| s.unbounded_send(message.clone()).is_ok());
        subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_call_gets_reply() {
        let (endpoint, mut inbox) = channel("runtime");

        tokio::spawn(async move {
            while let Some(envelope) = inbox.next().await {
                let response = match envelope.request {
                    Request::GetPetData => Response::Nodata,
                    _ => Response::error("unexpected"),
                };
                envelope.respond(response);
            }
        });

        let response = endpoint.call(Request::GetPetData).await.unwrap();
        assert_eq!(response, Response::Nodata);
    }

    #[tokio::test]
    async fn test_call_without_listener_fails() {
        let (endpoint, inbox) = channel("runtime");
        drop(inbox);

        let err = endpoint.call(Request::GetPetData).await.unwrap_err();
        assert_eq!(err, BusError::Disconnected("runtime"));
    }

    #[tokio::test]
    async fn test_dropped_envelope_is_reported() {
        let (endpoint, mut inbox) = channel("tab");

        tokio::spawn(async move {
            let envelope = inbox.next().await;
            drop(envelope);
        });

        let err = endpoint.call(Request::ToggleVisibility).await.unwrap_err();
        assert_eq!(err, BusError::NoResponse("tab"));
    }

    #[tokio::test]
    async fn test_publish_skips_closed_subscribers() {
        let broadcaster = Broadcaster::new();
        let mut open = broadcaster.subscribe();
        drop(broadcaster.subscribe());

        let delivered = broadcaster.publish(Broadcast::PetDataError("boom".into()));

        assert_eq!(delivered, 1);
        assert_eq!(
            open.next().await,
            Some(Broadcast::PetDataError("boom".into()))
        );
    }
}
