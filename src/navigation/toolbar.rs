//! Toolbar auto-hide driven by scroll position

use crate::config::ToolbarConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolbarVisibility {
    #[default]
    Visible,
    Hidden,
}

/// Scroll-driven visible/hidden state machine
///
/// Near the top of the page the toolbar is always shown; near the end of
/// the content no transition happens. Elsewhere, movement accumulates in one
/// direction until it crosses the threshold, and deltas under the noise
/// floor are ignored.
#[derive(Debug, Clone)]
pub struct ToolbarController {
    config: ToolbarConfig,
    visibility: ToolbarVisibility,
    last_offset: Option<f64>,
    accumulated: f64,
    callbacks_seen: u32,
}

impl ToolbarController {
    pub fn new(config: ToolbarConfig) -> Self {
        Self {
            config,
            visibility: ToolbarVisibility::Visible,
            last_offset: None,
            accumulated: 0.0,
            callbacks_seen: 0,
        }
    }

    pub fn visibility(&self) -> ToolbarVisibility {
        self.visibility
    }

    /// Feed one scroll callback; returns the resulting visibility
    pub fn on_scroll(
        &mut self,
        offset: f64,
        content_height: f64,
        viewport_height: f64,
    ) -> ToolbarVisibility {
        // Layout settles over the first few callbacks after a load
        if self.callbacks_seen < self.config.ignored_callbacks {
            self.callbacks_seen += 1;
            self.last_offset = Some(offset);
            return self.visibility;
        }

        let Some(last) = self.last_offset.replace(offset) else {
            return self.visibility;
        };

        if offset <= 0.0 || offset < self.config.top_zone {
            self.accumulated = 0.0;
            self.visibility = ToolbarVisibility::Visible;
            return self.visibility;
        }

        let max_offset = (content_height - viewport_height).max(0.0);
        if max_offset - offset < self.config.bottom_zone {
            self.accumulated = 0.0;
            return self.visibility;
        }

        let delta = offset - last;
        if delta.abs() < self.config.noise_floor {
            return self.visibility;
        }

        if self.accumulated != 0.0 && self.accumulated.signum() != delta.signum() {
            self.accumulated = 0.0;
        }
        self.accumulated += delta;

        if self.accumulated > self.config.threshold {
            self.visibility = ToolbarVisibility::Hidden;
            self.accumulated = 0.0;
        } else if self.accumulated < -self.config.threshold {
            self.visibility = ToolbarVisibility::Visible;
            self.accumulated = 0.0;
        }
        self.visibility
    }

    /// Show the toolbar and forget scroll history
    pub fn reset(&mut self) {
        self.visibility = ToolbarVisibility::Visible;
        self.last_offset = None;
        self.accumulated = 0.0;
        self.callbacks_seen = 0;
    }
}

impl Default for ToolbarController {
    fn default() -> Self {
        Self::new(ToolbarConfig::default())
    }
}
