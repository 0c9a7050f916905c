pub mod measurer;
pub mod state;
pub mod tracker;

pub use measurer::{visibility_ratio, BoundingBox, VisibilitySample};
pub use state::{Quartile, TrackerPhase, TrackingState};
pub use tracker::{ImpressionTracker, TickOutcome};
