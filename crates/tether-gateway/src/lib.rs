pub mod connection;
pub mod dispatcher;
pub mod hub;

pub use dispatcher::{Dispatcher, Outbox, Presence};
pub use hub::Hub;
