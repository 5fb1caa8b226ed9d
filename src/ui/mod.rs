//! Terminal rendering for the dashboard.

pub mod common;
pub mod history;
pub mod live;
pub mod theme;

pub use theme::Theme;
