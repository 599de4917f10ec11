//! Terminal User Interface for the inspection view

mod app;
mod ui;

pub use app::{Action, InspectorApp, NoticeLevel, SessionInfo};
pub use ui::draw;
