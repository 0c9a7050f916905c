pub mod banner;

pub use banner::{AdEvent, BannerAd, BannerHandle, LayoutSnapshot};
