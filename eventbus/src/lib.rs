//! Inbound cluster-lifecycle event queue abstraction. `lapin` is already
//! declared in the teacher's `principal/Cargo.toml` for exactly this class
//! of inbound message consumption; this crate is where it actually gets
//! wired up, via `basic_get` + manual ack rather than a long-lived consumer
//! task, so one scheduler tick drains at most one batch.

pub mod fake;
pub mod lapin_client;

pub use fake::FakeEventQueueClient;
pub use lapin_client::LapinEventQueueClient;
