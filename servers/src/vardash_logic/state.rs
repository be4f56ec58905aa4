use std::sync::Arc;

use lib_vardash::{HubHandle, Layout, WidgetRegistry};

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub page: Arc<str>,
}

impl AppState {
    /// Renders the dashboard page once; the layout never changes while running.
    pub fn new(hub: HubHandle, layout: &Layout, widgets: &WidgetRegistry) -> Self {
        Self {
            hub,
            page: crate::vardash_logic::page::render(layout, widgets).into(),
        }
    }
}
