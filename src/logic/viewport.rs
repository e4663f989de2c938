//! Page layout and auto-scroll decisions for a horizontally scrolling
//! container of pages.

use crate::config::ViewportConfig;
use crate::models::PageFormat;

const MAX_HEIGHT: f64 = 1200.0;
const MAX_ZOOMED_HEIGHT: f64 = 1350.0;
/// Room left for the toolbar and the page chrome.
const WINDOW_MARGIN: f64 = 160.0;
const HEIGHT_RATIO: f64 = 1.3;
const ZOOMED_HEIGHT_RATIO: f64 = 1.45;
/// Page border, top and bottom.
const PAGE_BORDER: f64 = 2.0;

/// Page geometry derived from the container size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_height: f64,
    pub page_width: f64,
    pub page_count: usize,
}

impl PageLayout {
    pub fn compute(
        container_width: f64,
        window_height: f64,
        format: PageFormat,
        page_count: usize,
        zoomed: bool,
    ) -> Self {
        let page_height = if zoomed {
            MAX_ZOOMED_HEIGHT.min(container_width * ZOOMED_HEIGHT_RATIO)
        } else {
            MAX_HEIGHT
                .min(window_height - WINDOW_MARGIN)
                .min(container_width * HEIGHT_RATIO)
        }
        .max(0.0);

        let page_width = if format.height > 0.0 {
            ((page_height - PAGE_BORDER) * format.width / format.height).max(0.0)
        } else {
            0.0
        };

        Self {
            page_height,
            page_width,
            page_count,
        }
    }

    /// Offset of a page inside the scrolled content.
    pub fn page_left(&self, page: usize) -> f64 {
        page as f64 * self.page_width
    }

    pub fn total_width(&self) -> f64 {
        self.page_count as f64 * self.page_width
    }
}

/// Whether a page at `left` (relative to the viewport) counts as visible.
///
/// A page that fits must be entirely visible; a wider page only needs to
/// overlap the viewport.
pub fn page_in_view(left: f64, page_width: f64, viewport_width: f64) -> bool {
    let right = left + page_width;
    if page_width <= viewport_width {
        left >= 0.0 && right <= viewport_width
    } else {
        left <= viewport_width && right >= 0.0
    }
}

/// Scroll offset bringing a page into view: aligned near the left edge with
/// some padding, or centered, whichever scrolls further.
pub fn scroll_target(page_left: f64, page_width: f64, viewport_width: f64, padding_ratio: f64) -> f64 {
    let padded = page_left - page_width * padding_ratio;
    let centered = page_left + page_width / 2.0 - viewport_width / 2.0;
    padded.max(centered)
}

#[derive(Debug, Clone)]
pub struct ScrollController {
    config: ViewportConfig,
    viewport_width: f64,
    window_height: f64,
    scroll_left: f64,
}

impl ScrollController {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            viewport_width: 0.0,
            window_height: 0.0,
            scroll_left: 0.0,
        }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport_width = width.max(0.0);
        self.window_height = height.max(0.0);
    }

    pub fn set_window_height(&mut self, height: f64) {
        self.window_height = height.max(0.0);
    }

    /// Records the container's actual scroll offset (user scrolling).
    pub fn set_scroll_left(&mut self, left: f64) {
        self.scroll_left = left;
    }

    pub fn scroll_left(&self) -> f64 {
        self.scroll_left
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    pub fn auto_scroll(&self) -> bool {
        self.config.auto_scroll
    }

    pub fn is_zoomed(&self) -> bool {
        self.config.zoomed
    }

    pub fn toggle_auto_scroll(&mut self) -> bool {
        self.config.auto_scroll = !self.config.auto_scroll;
        log::info!("VIEWPORT: Auto-scroll {}", if self.config.auto_scroll { "on" } else { "off" });
        self.config.auto_scroll
    }

    pub fn toggle_zoom(&mut self) -> bool {
        self.config.zoomed = !self.config.zoomed;
        self.config.zoomed
    }

    pub fn layout(&self, format: PageFormat, page_count: usize) -> PageLayout {
        PageLayout::compute(
            self.viewport_width,
            self.window_height,
            format,
            page_count,
            self.config.zoomed,
        )
    }

    /// Scroll offset needed to show `page`, or `None` when it is already in
    /// view or auto-scroll is off. The offset is assumed to be applied.
    pub fn follow(&mut self, layout: &PageLayout, page: usize) -> Option<f64> {
        if !self.config.auto_scroll || page >= layout.page_count {
            return None;
        }

        let page_left = layout.page_left(page);
        if page_in_view(page_left - self.scroll_left, layout.page_width, self.viewport_width) {
            return None;
        }

        let max_left = (layout.total_width() - self.viewport_width).max(0.0);
        let target = scroll_target(
            page_left,
            layout.page_width,
            self.viewport_width,
            self.config.left_padding_ratio,
        )
        .clamp(0.0, max_left);

        log::debug!("VIEWPORT: Scrolling to page {} at {:.0}", page + 1, target);
        self.scroll_left = target;
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_heights() {
        let a4 = PageFormat::default();

        let normal = PageLayout::compute(800.0, 1000.0, a4, 3, false);
        assert_eq!(normal.page_height, 840.0);
        assert!((normal.page_width - 838.0 * 210.0 / 297.0).abs() < 1e-9);

        let narrow = PageLayout::compute(500.0, 2000.0, a4, 3, false);
        assert_eq!(narrow.page_height, 650.0);

        let tall = PageLayout::compute(2000.0, 3000.0, a4, 3, false);
        assert_eq!(tall.page_height, 1200.0);

        let zoomed = PageLayout::compute(800.0, 400.0, a4, 3, true);
        assert_eq!(zoomed.page_height, 1160.0);
        let zoomed_wide = PageLayout::compute(2000.0, 400.0, a4, 3, true);
        assert_eq!(zoomed_wide.page_height, 1350.0);
    }

    #[test]
    fn test_narrow_page_must_be_fully_visible() {
        assert!(page_in_view(0.0, 600.0, 800.0));
        assert!(page_in_view(200.0, 600.0, 800.0));
        assert!(!page_in_view(-50.0, 600.0, 800.0));
        assert!(!page_in_view(250.0, 600.0, 800.0));
    }

    #[test]
    fn test_wide_page_needs_any_overlap() {
        // Only the last 20 units are on screen
        assert!(page_in_view(-880.0, 900.0, 800.0));
        assert!(page_in_view(790.0, 900.0, 800.0));
        assert!(!page_in_view(-950.0, 900.0, 800.0));
        assert!(!page_in_view(810.0, 900.0, 800.0));
    }

    #[test]
    fn test_scroll_target() {
        // Wide page: centered
        assert_eq!(scroll_target(1000.0, 600.0, 800.0, 0.2), 900.0);
        // Narrow page: left edge plus padding
        assert_eq!(scroll_target(1000.0, 200.0, 800.0, 0.2), 960.0);
    }

    #[test]
    fn test_follow_scrolls_once_and_respects_toggle() {
        let mut controller = ScrollController::new(ViewportConfig::default());
        controller.resize(800.0, 1000.0);
        let layout = controller.layout(PageFormat::default(), 10);
        assert!(layout.page_width < 800.0);

        assert_eq!(controller.follow(&layout, 0), None);
        let target = controller.follow(&layout, 3).unwrap();
        assert_eq!(
            target,
            scroll_target(layout.page_left(3), layout.page_width, 800.0, 0.2)
        );
        assert_eq!(controller.follow(&layout, 3), None);

        controller.toggle_auto_scroll();
        assert_eq!(controller.follow(&layout, 8), None);
    }

    #[test]
    fn test_follow_clamps_to_content() {
        let mut controller = ScrollController::new(ViewportConfig::default());
        controller.resize(800.0, 1000.0);
        let layout = controller.layout(PageFormat::default(), 2);
        controller.set_scroll_left(layout.total_width());

        assert_eq!(controller.follow(&layout, 0), Some(0.0));
    }
}
