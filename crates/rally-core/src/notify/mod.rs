//! Web push fan-out.

pub mod dispatcher;
pub mod transport;

pub use dispatcher::{DispatchError, Dispatcher, PUSH_TTL_SECS};
pub use transport::{DeliveryError, PushTransport, WebPushTransport};
