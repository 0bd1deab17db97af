//! End-to-end tests which drive the whole application over HTTP.

mod workflows;
