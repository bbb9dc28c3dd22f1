mod tracker;

pub use tracker::SessionTracker;
