//! Route orchestration: the track entrypoint (spec.md §4.8), the callback
//! handler (spec.md §4.7), and the debounced-dispatch path
//! (SPEC_FULL.md §4.10), wired over `adrelay-core`'s router and
//! `adrelay-forwarder`'s upstream adapter.

pub mod callback;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod response;
pub mod track;

pub use callback::CallbackParams;
pub use dispatch::GatewayDispatcher;
pub use error::GatewayError;
pub use gateway::{Gateway, GatewayBuilder};
pub use response::GatewayResponse;
pub use track::TrackParams;
