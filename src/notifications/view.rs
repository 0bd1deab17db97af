use axum::{
    extract::{Path, State, WebSocketUpgrade, ws},
    response::{IntoResponse, Redirect},
};
use futures::{SinkExt, StreamExt};
use hypertext::prelude::*;
use tokio::sync::broadcast::{Receiver, Sender, error::RecvError};

use crate::{
    auth::User,
    msg::{Msg, MsgContents},
    notifications::{
        InboxItem, Notification, clear_notifications, inbox, mark_all_as_read,
        mark_as_read, unread_count,
    },
    state::Conn,
    template::Page,
    util_resp::{StandardResponse, err_not_found, see_other_ok, success},
};

pub struct NotificationCard<'r> {
    pub item: &'r InboxItem,
    pub actions: bool,
}

impl<'r> Renderable for NotificationCard<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let n = &self.item.notification;
        maud! {
            div class=(format!(
                "card mb-2 border-start border-4 border-{}{}",
                n.kind.colour(),
                if self.item.read { "" } else { " bg-light" }
            )) {
                div class="card-body py-2" {
                    div class="d-flex justify-content-between" {
                        h6 class="card-title mb-1" {
                            @if !self.item.read {
                                span class="badge bg-danger me-2" { "new" }
                            }
                            (n.title)
                        }
                        small class="text-muted" {
                            (n.created_at.format("%Y-%m-%d %H:%M").to_string())
                        }
                    }
                    p class="card-text mb-1" { (n.message) }
                    @if let (Some(id), Some(name)) = (&n.tournament_id, &n.tournament_name) {
                        a href=(format!("/tournament/{id}")) class="card-link" { (name) }
                    }
                    @if self.actions && !self.item.read {
                        form method="post"
                            action=(format!("/notifications/{}/read", n.id))
                            class="d-inline ms-3" {
                            button type="submit" class="btn btn-sm btn-link p-0" {
                                "Mark as read"
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

pub async fn notifications_page(
    user: User<false>,
    mut conn: Conn<false>,
) -> StandardResponse {
    let items = inbox(&user, &mut *conn)?;

    success(
        Page::new()
            .title("Notifications")
            .user(user)
            .body(maud! {
                div class="d-flex justify-content-between align-items-center mb-3" {
                    h1 { "Notifications" }
                    div class="d-flex gap-2" {
                        form method="post" action="/notifications/read-all" {
                            button type="submit" class="btn btn-outline-primary btn-sm" {
                                "Mark all as read"
                            }
                        }
                        form method="post" action="/notifications/clear" {
                            button type="submit" class="btn btn-outline-danger btn-sm" {
                                "Clear all"
                            }
                        }
                    }
                }
                @if items.is_empty() {
                    p class="text-muted" { "You have no notifications." }
                }
                @for item in &items {
                    NotificationCard item=(item) actions=(true);
                }
            })
            .render(),
    )
}

/// The unread counter shown in the navigation bar.
pub async fn unread_badge(
    user: User<false>,
    mut conn: Conn<false>,
) -> StandardResponse {
    let n = unread_count(&user, &mut *conn)?;

    success(
        maud! {
            @if n > 0 {
                span class="badge rounded-pill bg-warning text-dark" { (n) }
            } @else {
                span {}
            }
        }
        .render(),
    )
}

#[tracing::instrument(skip(user, conn))]
pub async fn do_mark_read(
    Path(id): Path<String>,
    user: User<true>,
    mut conn: Conn<true>,
) -> StandardResponse {
    if !mark_as_read(&user, &id, &mut *conn)? {
        return err_not_found();
    }
    see_other_ok(Redirect::to("/notifications"))
}

pub async fn do_mark_all_read(
    user: User<true>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let n = mark_all_as_read(&user, &mut *conn)?;
    tracing::debug!("user {} marked {n} notifications as read", user.id);
    see_other_ok(Redirect::to("/notifications"))
}

pub async fn do_clear(user: User<true>, mut conn: Conn<true>) -> StandardResponse {
    let n = clear_notifications(&user, &mut *conn)?;
    tracing::debug!("user {} cleared {n} notifications", user.id);
    see_other_ok(Redirect::to("/notifications"))
}

/// A transient toast, swapped into the page's toast container by the htmx
/// websocket extension.
fn render_toast(n: &Notification) -> String {
    maud! {
        div id="toasts" hx-swap-oob="beforeend" {
            div class=(format!("toast show border-{}", n.kind.colour()))
                role="alert" {
                div class="toast-header" {
                    strong class="me-auto" { (n.title) }
                    button type="button" class="btn-close"
                        onclick="this.closest('.toast').remove()" {}
                }
                div class="toast-body" {
                    (n.message)
                    " "
                    a href="/notifications" { "View" }
                }
            }
        }
    }
    .render()
    .into_inner()
}

/// Provides a WebSocket channel which pushes a toast to the client whenever a
/// notification addressed to them is added.
pub async fn notification_updates(
    ws: WebSocketUpgrade,
    State(tx): State<Sender<Msg>>,
    user: User<false>,
) -> impl IntoResponse {
    let rx = tx.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx, user))
}

async fn handle_socket(
    socket: ws::WebSocket,
    mut rx: Receiver<Msg>,
    user: User<false>,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = match rx.recv().await {
                Ok(msg) => msg,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("toast channel for {} lagged by {n}", user.id);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let MsgContents::Notification(notification) = &msg.inner;
            if !notification.is_visible_to(&user) {
                continue;
            }

            if sender
                .send(ws::Message::Text(render_toast(notification)))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {
            // keep alive
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
}
