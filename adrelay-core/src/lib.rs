pub mod config;
pub mod error;
pub mod event_log;
pub mod request_log;
pub mod router;
pub mod udm;

pub use config::{Adapter, AppConfig, Route, RouteRule, Settings, Upstream};
pub use error::CoreError;
pub use event_log::EventLog;
pub use request_log::{CallbackSentStatus, RequestLog, TrackStatus};
pub use router::{choose_route, should_throttle, throttle_score, RouteDecision};
pub use udm::{Ad, Click, Device, Event, Meta, Net, Time, Udm, User};
