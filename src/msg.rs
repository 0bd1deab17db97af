// TODO: at some point it may make sense to give each user their own channel.
// For the mean time, however, we send all data through a single channel and
// let the receivers filter it.

use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::Sender;

use crate::notifications::Notification;

#[derive(Clone, Debug)]
/// A message which is sent following a modification. Individual websocket
/// connections use these to push updates to the pages which are open.
pub struct Msg {
    pub inner: MsgContents,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub enum MsgContents {
    /// A notification was added. Connections forward it to the viewer if it
    /// is addressed to them.
    Notification(Notification),
}

/// Messages published while a request is being handled. They are released by
/// [`crate::state::commit_transactions`] once the request's changes are
/// committed, and dropped otherwise.
#[derive(Clone, Default)]
pub(crate) struct HeldMessages(Arc<Mutex<Vec<Msg>>>);

impl HeldMessages {
    pub(crate) fn release(&self, tx: &Sender<Msg>) {
        let held = match self.0.lock() {
            Ok(mut held) => std::mem::take(&mut *held),
            Err(_) => return,
        };
        for msg in held {
            // nobody being connected is not an error
            let _ = tx.send(msg);
        }
    }
}

/// Where handlers publish messages. Inside a request the messages wait for
/// the transaction to commit; elsewhere they are sent straight away.
#[derive(Clone)]
pub struct Outbox {
    tx: Sender<Msg>,
    held: Option<HeldMessages>,
}

impl Outbox {
    pub fn immediate(tx: Sender<Msg>) -> Self {
        Self { tx, held: None }
    }

    pub fn publish(&self, msg: Msg) {
        match &self.held {
            Some(held) => match held.0.lock() {
                Ok(mut held) => held.push(msg),
                Err(_) => tracing::warn!("dropping message, outbox is poisoned"),
            },
            None => {
                let _ = self.tx.send(msg);
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Outbox
where
    S: Send + Sync,
    Sender<Msg>: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Outbox {
            tx: Sender::<Msg>::from_ref(state),
            held: parts.extensions.get::<HeldMessages>().cloned(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;

    use super::*;
    use crate::notifications::NotificationKind;

    pub(crate) fn msg(title: &str) -> Msg {
        Msg {
            inner: MsgContents::Notification(Notification {
                id: format!("notification_{title}"),
                kind: NotificationKind::TournamentSubmitted,
                title: title.to_string(),
                message: String::new(),
                recipient_id: None,
                target_role: None,
                tournament_id: None,
                tournament_name: None,
                created_at: Utc::now().naive_utc(),
            }),
        }
    }

    #[test]
    fn held_messages_wait_for_release() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(16);
        let held = HeldMessages::default();
        let outbox = Outbox {
            tx: tx.clone(),
            held: Some(held.clone()),
        };

        outbox.publish(msg("a"));
        outbox.publish(msg("b"));
        assert!(rx.try_recv().is_err());

        held.release(&tx);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn immediate_outboxes_send_at_once() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(16);
        Outbox::immediate(tx).publish(msg("a"));
        assert!(rx.try_recv().is_ok());
    }
}
