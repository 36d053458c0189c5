//! Livecheck session runtime: runs a liveness tracker on tokio, owns the
//! blink confirmation timer, and connects detection feeds to presenters.

pub mod config;
pub mod engine;
pub mod feed;
pub mod presenter;

pub use config::{Config, ConfigLoadError};
pub use engine::{spawn_session, EngineError, SessionHandle};
pub use feed::{run_feed, FeedError, FeedReader, FeedSummary, FrameRecord, ReplayModel};
pub use presenter::{spawn_presenter, JsonLinesPresenter, Presenter, TablePresenter};
