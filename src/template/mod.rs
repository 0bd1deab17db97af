//! Templating code.
//!
//! This defines the [`Page`] item, which is used in most of the other parts of
//! this crate.

use hypertext::prelude::*;

use crate::{auth::User, permission::Role};

pub const APP_NAME: &str = "खेल खेलेको";

pub struct Page<R1: Renderable, R2: Renderable, const TX: bool> {
    body: Option<R1>,
    user: Option<User<TX>>,
    extra_head: Option<R2>,
    title: Option<String>,
}

// unfortunate generic argument shenanigans
impl<R1: Renderable, const TX: bool> Page<R1, String, TX> {
    pub fn new() -> Self {
        Default::default()
    }
}

impl<R1: Renderable, R2: Renderable, const TX: bool> Page<R1, R2, TX> {
    pub fn new_full() -> Self {
        Default::default()
    }
}

impl<R1: Renderable, R2: Renderable, const TX: bool> Page<R1, R2, TX> {
    pub fn body(mut self, body: R1) -> Self {
        self.body = Some(body);
        self
    }

    pub fn user(mut self, user: User<TX>) -> Self {
        self.user = Some(user);
        self
    }

    pub fn extra_head(mut self, content: R2) -> Page<R1, R2, TX> {
        self.extra_head = Some(content);
        self
    }

    pub fn user_opt(mut self, user: Option<User<TX>>) -> Self {
        self.user = user;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl<R1: Renderable, R2: Renderable, const TX: bool> Renderable
    for Page<R1, R2, TX>
{
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            html lang="en" {
                head {
                    meta charset="utf-8";
                    title {
                        @if let Some(title) = &self.title {
                            (title) " · "
                        }
                        (APP_NAME)
                    }
                    link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet" crossorigin="anonymous";
                    script src="https://cdn.jsdelivr.net/npm/htmx.org@2.0.7/dist/htmx.min.js" integrity="sha384-ZBXiYtYQ6hJ2Y0ZNoYuI+Nq5MqWBr+chMrS/RkXpNzQCApHEhOt2aY8EJgqwHLkJ" crossorigin="anonymous" {
                    }
                    script src="https://cdn.jsdelivr.net/npm/htmx-ext-ws@2.0.3" crossorigin="anonymous" {
                    }
                    meta
                        name="viewport"
                        content="width=device-width, initial-scale=1";
                    @if let Some(extra) = &self.extra_head {
                        (extra)
                    }
                }
                body class="d-flex flex-column vh-100" {
                    nav class="navbar navbar-expand"
                        style="background-color: #b8202f;"
                        data-bs-theme="dark" {
                        div class="container-fluid" {
                            a class="navbar-brand text-white" href="/" {
                                (APP_NAME)
                            }
                            ul class="navbar-nav me-auto" {
                                li class="nav-item" {
                                    a class="nav-link text-white" href="/facilities" {
                                        "Tournaments"
                                    }
                                }
                                li class="nav-item" {
                                    a class="nav-link text-white" href="/tournament-map" {
                                        "Map"
                                    }
                                }
                                @if let Some(user) = &self.user {
                                    @match user.role {
                                        Role::Player => {
                                            li class="nav-item" {
                                                a class="nav-link text-white" href="/player-dashboard" {
                                                    "My dashboard"
                                                }
                                            }
                                        }
                                        Role::Organizer => {
                                            li class="nav-item" {
                                                a class="nav-link text-white" href="/organizer-dashboard" {
                                                    "My tournaments"
                                                }
                                            }
                                            li class="nav-item" {
                                                a class="nav-link text-white" href="/create-tournament" {
                                                    "Create tournament"
                                                }
                                            }
                                        }
                                        Role::Admin => {
                                            li class="nav-item" {
                                                a class="nav-link text-white" href="/admin" {
                                                    "Admin"
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                            ul class="navbar-nav" {
                                @if let Some(user) = &self.user {
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/notifications" {
                                            "Notifications "
                                            span hx-get="/notifications/badge"
                                                 hx-trigger="load"
                                                 hx-swap="outerHTML" {}
                                        }
                                    }
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/profile" {
                                            (user.full_name)
                                        }
                                    }
                                    li class="nav-item" {
                                        form method="post" action="/logout" class="d-inline" {
                                            button type="submit" class="btn btn-link nav-link text-white" {
                                                "Log out"
                                            }
                                        }
                                    }
                                } @else {
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/login" {
                                            "Login"
                                        }
                                    }
                                    li class="nav-item" {
                                        a class="nav-link text-white" href="/register" {
                                            "Register"
                                        }
                                    }
                                }
                            }
                        }
                    }
                    div class="flex-grow-1 container py-4" {
                        @if let Some(body) = &self.body {
                            (body)
                        }
                    }
                    @if self.user.is_some() {
                        div hx-ext="ws" "ws-connect"="/notifications/ws" {
                            div id="toasts"
                                class="toast-container position-fixed bottom-0 end-0 p-3" {}
                        }
                    }
                }
            }
        }.render_to(buffer)
    }
}

impl<R1: Renderable, R2: Renderable, const TX: bool> Default
    for Page<R1, R2, TX>
{
    fn default() -> Self {
        Self {
            body: Default::default(),
            user: Default::default(),
            extra_head: Default::default(),
            title: Default::default(),
        }
    }
}
