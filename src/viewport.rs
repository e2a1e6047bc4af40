//! Maps between sample indices and pixel columns under zoom and scroll.
//!
//! Scroll offsets are measured in zoomed sample units: the first visible sample
//! is `scroll / horizontal_zoom`. At a horizontal zoom of exactly 1.0 the whole
//! file is laid out across the viewport, so there is nothing to scroll.
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomAxis {
    Horizontal,
    Vertical,
}

/// Notifications produced by viewport mutations, in the order they happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEvent {
    ZoomChanged { horizontal: f64, vertical: f64 },
    ScrollChanged(f64),
}

/// One rendered pixel column: the samples it averages and their mean.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveColumn {
    pub x: usize,
    pub range: Range<usize>,
    pub mean: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    waveform_len: usize,
    h_zoom: f64,
    v_zoom: f64,
    scroll: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Viewport {
    pub const MIN_ZOOM: f64 = 1.0;

    pub fn new(waveform_len: usize) -> Self {
        Self {
            waveform_len,
            h_zoom: Self::MIN_ZOOM,
            v_zoom: Self::MIN_ZOOM,
            scroll: 0.0,
        }
    }

    /// Switches to a new waveform and resets zoom and scroll.
    pub fn set_waveform_len(&mut self, waveform_len: usize) -> Vec<ViewportEvent> {
        let mut events = Vec::new();
        self.waveform_len = waveform_len;
        if self.h_zoom != Self::MIN_ZOOM || self.v_zoom != Self::MIN_ZOOM {
            self.h_zoom = Self::MIN_ZOOM;
            self.v_zoom = Self::MIN_ZOOM;
            events.push(self.zoom_event());
        }
        if self.scroll != 0.0 {
            self.scroll = 0.0;
            events.push(ViewportEvent::ScrollChanged(0.0));
        }
        events
    }

    pub fn waveform_len(&self) -> usize {
        self.waveform_len
    }

    pub fn horizontal_zoom(&self) -> f64 {
        self.h_zoom
    }

    pub fn vertical_zoom(&self) -> f64 {
        self.v_zoom
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroll
    }

    /// `max(0, len * horizontal_zoom - width)`, or 0 in the unzoomed overview.
    pub fn max_scroll(&self, width: usize) -> f64 {
        if self.h_zoom <= Self::MIN_ZOOM {
            return 0.0;
        }
        (self.waveform_len as f64 * self.h_zoom - width as f64).max(0.0)
    }

    /// `max(1, floor(len / (width * horizontal_zoom)))`.
    pub fn samples_per_pixel(&self, width: usize) -> usize {
        if width == 0 {
            return 1;
        }
        let spp = (self.waveform_len as f64 / (width as f64 * self.h_zoom)).floor();
        (spp as usize).max(1)
    }

    pub fn visible_sample_range(&self, width: usize) -> Range<usize> {
        let start = self.first_visible_sample();
        let end = self
            .waveform_len
            .min(start.saturating_add(width.saturating_mul(self.samples_per_pixel(width))));
        start..end
    }

    fn first_visible_sample(&self) -> usize {
        ((self.scroll / self.h_zoom).floor() as usize).min(self.waveform_len)
    }

    /// Averages the visible samples into at most `width` columns.
    ///
    /// Columns stop at the first one that would be empty; the tail is never
    /// padded.
    pub fn render_columns(&self, samples: &[f32], width: usize) -> Vec<WaveColumn> {
        let spp = self.samples_per_pixel(width);
        let Range { start, end } = self.visible_sample_range(width);
        let end = end.min(samples.len());

        let mut columns = Vec::with_capacity(width);
        for x in 0..width {
            let lo = start + x * spp;
            let hi = (start + (x + 1) * spp).min(end);
            if lo >= hi {
                break;
            }
            let slice = &samples[lo..hi];
            let mean = slice.iter().map(|&s| s as f64).sum::<f64>() / slice.len() as f64;
            columns.push(WaveColumn {
                x,
                range: lo..hi,
                mean: mean as f32,
            });
        }
        columns
    }

    /// Vertical pixel for a column mean in a viewport `height` pixels tall.
    pub fn column_offset(&self, mean: f32, height: usize) -> f64 {
        let mid = (height / 2) as f64;
        mid + mean as f64 * mid * self.v_zoom
    }

    /// Column that `sample` falls into, relative to the left edge. Negative or
    /// `>= width` when the sample is off screen.
    pub fn pixel_for_sample(&self, sample: usize, width: usize) -> i64 {
        let spp = self.samples_per_pixel(width) as i64;
        (sample as i64 - self.first_visible_sample() as i64).div_euclid(spp)
    }

    /// First sample of column `x`, clamped into the waveform.
    pub fn sample_for_pixel(&self, x: usize, width: usize) -> usize {
        let sample = self
            .first_visible_sample()
            .saturating_add(x.saturating_mul(self.samples_per_pixel(width)));
        sample.min(self.waveform_len.saturating_sub(1))
    }

    pub fn set_horizontal_zoom(&mut self, zoom: f64, width: usize) -> Vec<ViewportEvent> {
        let zoom = clamp_zoom(zoom);
        let mut events = Vec::new();
        if zoom != self.h_zoom {
            self.h_zoom = zoom;
            events.push(self.zoom_event());
        }
        events.extend(self.clamp_scroll(width));
        events
    }

    pub fn set_vertical_zoom(&mut self, zoom: f64, width: usize) -> Vec<ViewportEvent> {
        let zoom = clamp_zoom(zoom);
        let mut events = Vec::new();
        if zoom != self.v_zoom {
            self.v_zoom = zoom;
            events.push(self.zoom_event());
        }
        events.extend(self.clamp_scroll(width));
        events
    }

    /// Multiplies the zoom on `axis` by `factor`.
    pub fn zoom_by(&mut self, factor: f64, axis: ZoomAxis, width: usize) -> Vec<ViewportEvent> {
        match axis {
            ZoomAxis::Horizontal => self.set_horizontal_zoom(self.h_zoom * factor, width),
            ZoomAxis::Vertical => self.set_vertical_zoom(self.v_zoom * factor, width),
        }
    }

    pub fn set_scroll(&mut self, offset: f64, width: usize) -> Option<ViewportEvent> {
        let offset = if offset.is_nan() { 0.0 } else { offset };
        let offset = offset.clamp(0.0, self.max_scroll(width));
        if offset == self.scroll {
            return None;
        }
        self.scroll = offset;
        Some(ViewportEvent::ScrollChanged(offset))
    }

    pub fn scroll_by(&mut self, delta: f64, width: usize) -> Option<ViewportEvent> {
        self.set_scroll(self.scroll + delta, width)
    }

    /// Recentres on `position` if its column is outside the viewport.
    pub fn ensure_visible(&mut self, position: usize, width: usize) -> Option<ViewportEvent> {
        let px = self.pixel_for_sample(position, width);
        if (0..width as i64).contains(&px) {
            return None;
        }
        let half_span = (width / 2) * self.samples_per_pixel(width);
        let start = position.saturating_sub(half_span);
        self.set_scroll(start as f64 * self.h_zoom, width)
    }

    fn clamp_scroll(&mut self, width: usize) -> Option<ViewportEvent> {
        self.set_scroll(self.scroll, width)
    }

    fn zoom_event(&self) -> ViewportEvent {
        ViewportEvent::ZoomChanged {
            horizontal: self.h_zoom,
            vertical: self.v_zoom,
        }
    }
}

fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.max(Viewport::MIN_ZOOM)
    } else {
        Viewport::MIN_ZOOM
    }
}
