//! End-to-end scenarios driving [`icaldav::client::CalDavClient`] against a
//! scripted [`HttpTransport`] fake, covering the concrete scenarios named
//! in the crate's testable-properties list.

mod fake_transport;
mod scenarios;
