//! `rd-service`: the request/response surface.
//!
//! Every call answers with a [`Reply`]: an explicit success flag, a
//! human-readable message, the payload on success, and on failure a stable
//! error kind plus whether retrying may help.  Transport framing is left to
//! whatever hosts these services.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                 |
//! |--------------|----------------------------------------------------------|
//! | [`reply`]    | `Reply<T>`, `ReplyError`                                 |
//! | [`caller`]   | `Caller`: the authenticated identity a gateway supplies |
//! | [`views`]    | Wire shapes: `PositionView`, `CreateTripView`, …         |
//! | [`presence`] | `PresenceService`: position writes, lookups and proximity queries |
//! | [`dispatch`] | `DispatchService`: trip creation and the dispatch protocol |
//! | [`events`]   | `ChannelEventSink`, `EventMessage`                       |

pub mod caller;
pub mod dispatch;
pub mod events;
pub mod presence;
pub mod reply;
pub mod views;


pub use caller::Caller;
pub use dispatch::{CreateTripRequest, DispatchService};
pub use events::{ChannelEventSink, EventMessage};
pub use presence::{PresenceService, SetPositionRequest};
pub use reply::{Reply, ReplyError};
pub use views::{CreateTripView, ListAllView, PositionView, RejectView};
