//! UI events that ask a list for more data.

/// Scroll position of a list container, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, client_height: f64, scroll_height: f64) -> Self {
        Self {
            scroll_top,
            client_height,
            scroll_height,
        }
    }

    pub fn distance_to_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }

    pub fn near_bottom(&self, threshold_px: f64) -> bool {
        self.distance_to_bottom() <= threshold_px
    }

    /// For lists that grow upwards (chat history).
    pub fn near_top(&self, threshold_px: f64) -> bool {
        self.scroll_top.max(0.0) <= threshold_px
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    /// Container scrolled; loads the next page once within the list's threshold.
    Scroll(ScrollMetrics),
    /// Container scrolled towards the top; loads older entries within the threshold.
    ScrollUp(ScrollMetrics),
    /// Explicit "load more" button.
    LoadMore,
    /// Reload from page 1 in place.
    Refresh,
    /// Tab or category changed: supersede and reload from page 1.
    TabSwitch,
}
