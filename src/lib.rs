// src/lib.rs

pub mod component;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod mock_delivery;
pub mod model;
pub mod session;
pub mod utilities;
pub mod viewability;

pub use component::{AdEvent, BannerAd, BannerHandle, LayoutSnapshot};
pub use error::{AdgeistError, Result};
pub use gateway::AnalyticsGateway;
pub use session::AdgeistSession;
