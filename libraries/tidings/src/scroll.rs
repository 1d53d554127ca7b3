//! Scroll bookkeeping for infinite lists. Pure arithmetic; the embedder supplies the measurements.

use std::time::{Duration, Instant};

/// Keeps the viewport steady when older content is prepended above it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollAnchor {
    previous_height: f64,
}

impl ScrollAnchor {
    /// Capture the scroll height before the page is applied.
    pub fn capture(scroll_height: f64) -> Self {
        Self {
            previous_height: scroll_height,
        }
    }

    /// New `scrollTop` once the taller content has been laid out.
    pub fn restore(&self, new_scroll_height: f64, scroll_top: f64) -> f64 {
        scroll_top + (new_scroll_height - self.previous_height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollMetrics {
    pub viewport_height: f64,
    pub scroll_top: f64,
    pub content_height: f64,
}

impl ScrollMetrics {
    pub fn near_bottom(&self, threshold_px: f64) -> bool {
        (self.viewport_height + self.scroll_top).ceil() >= self.content_height - threshold_px
    }

    pub fn near_top(&self, threshold_px: f64) -> bool {
        self.scroll_top.floor() <= threshold_px
    }
}

/// Which end of the list older content is loaded at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
}

/// Debounced "load more" trigger: fires once scrolling has been quiet for `debounce`,
/// the viewport is within `threshold_px` of its edge, and no fetch is running.
#[derive(Clone, Debug)]
pub struct ScrollTrigger {
    edge: Edge,
    threshold_px: f64,
    debounce: Duration,
    last_scroll: Option<Instant>,
}

impl ScrollTrigger {
    /// Trigger for lists that grow downwards (posts, notifications).
    pub fn new(threshold_px: f64, debounce: Duration) -> Self {
        Self::at(Edge::Bottom, threshold_px, debounce)
    }

    /// Trigger for lists that grow upwards (a chat transcript).
    pub fn at_top(threshold_px: f64, debounce: Duration) -> Self {
        Self::at(Edge::Top, threshold_px, debounce)
    }

    pub fn at(edge: Edge, threshold_px: f64, debounce: Duration) -> Self {
        Self {
            edge,
            threshold_px,
            debounce,
            last_scroll: None,
        }
    }

    pub fn edge(&self) -> Edge {
        self.edge
    }

    pub fn on_scroll(&mut self, now: Instant) {
        self.last_scroll = Some(now);
    }

    pub fn poll(&mut self, now: Instant, metrics: ScrollMetrics, fetching: bool) -> bool {
        let Some(last) = self.last_scroll else {
            return false;
        };
        if now.saturating_duration_since(last) < self.debounce {
            return false;
        }
        self.last_scroll = None;
        let near = match self.edge {
            Edge::Top => metrics.near_top(self.threshold_px),
            Edge::Bottom => metrics.near_bottom(self.threshold_px),
        };
        !fetching && near
    }
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self::new(250.0, Duration::from_millis(50))
    }
}
