use std::time::{Duration, Instant};

use page::Page;
use scheduler::SettleWindow;

/// Per-frame scroll poller. Runs from construction until the renderer is
/// destroyed; there is no scroll event to subscribe to.
#[derive(Debug)]
pub(crate) struct ScrollMonitor {
    settle: SettleWindow,
    running: bool,
}

impl ScrollMonitor {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle: SettleWindow::new(settle),
            running: true,
        }
    }

    /// Samples the scroll offset; returns true when it moved since last frame.
    pub fn poll(&mut self, page: &Page, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        self.settle.observe(page.scroll_offset(), now)
    }

    pub fn is_scrolling(&self, now: Instant) -> bool {
        self.running && self.settle.is_active(now)
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page::{Rect, Viewport};

    #[test]
    fn scrolling_until_settled() {
        let mut page = Page::new(Viewport::new(100.0, 100.0, 1.0));
        let root = page.root();
        let tall = page.create_element("div");
        page.append_child(root, tall).unwrap();
        page.set_rect(tall, Rect::new(0.0, 0.0, 100.0, 1000.0)).unwrap();

        let start = Instant::now();
        let mut monitor = ScrollMonitor::new(Duration::from_millis(200));
        assert!(!monitor.poll(&page, start));
        page.scroll_to(0.0, 120.0);
        let moved = start + Duration::from_millis(16);
        assert!(monitor.poll(&page, moved));
        assert!(monitor.is_scrolling(moved + Duration::from_millis(150)));
        assert!(!monitor.is_scrolling(moved + Duration::from_millis(200)));

        monitor.stop();
        page.scroll_to(0.0, 300.0);
        assert!(!monitor.poll(&page, moved + Duration::from_millis(300)));
        assert!(!monitor.is_running());
    }
}
