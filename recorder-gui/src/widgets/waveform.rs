//! # Waveform Widget
//!
//! Draws the rolling window as amplitude over time. The window is usually
//! far longer than the canvas is wide, so each pixel column shows the
//! min/max envelope of the samples that fall into it.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{mouse, Color, Element, Point, Rectangle, Renderer, Theme};
use recorder_core::AudioSnapshot;

use super::column_ranges;

const TRACE_COLOR: Color = Color::from_rgb(0.2, 0.4, 1.0);
const AXIS_COLOR: Color = Color::from_rgb(0.4, 0.4, 0.4);

pub struct Waveform {
    samples: Option<AudioSnapshot>,
    duration_secs: u32,
}

impl Waveform {
    pub fn new(samples: Option<AudioSnapshot>, duration_secs: u32) -> Self {
        Self {
            samples,
            duration_secs,
        }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fill),
        )
        .into()
    }
}

/// Min and max of a slice, ignoring non-finite samples. `(0, 0)` if none are finite.
fn envelope(samples: &[f32]) -> (f32, f32) {
    samples
        .iter()
        .filter(|s| s.is_finite())
        .fold(None, |acc: Option<(f32, f32)>, &s| match acc {
            Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
            None => Some((s, s)),
        })
        .unwrap_or((0.0, 0.0))
}

impl<Message> canvas::Program<Message> for Waveform {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        if !bounds.width.is_finite() || !bounds.height.is_finite() {
            return vec![frame.into_geometry()];
        }

        let mid = bounds.height / 2.0;
        let label_height = 16.0;
        let half_height = (mid - label_height).max(1.0);

        let axis = Path::line(Point::new(0.0, mid), Point::new(bounds.width, mid));
        frame.stroke(&axis, Stroke::default().with_color(AXIS_COLOR).with_width(1.0));

        for (text, x) in [
            ("0 s".to_string(), 2.0),
            (format!("{} s", self.duration_secs), bounds.width - 40.0),
        ] {
            frame.fill_text(canvas::Text {
                content: text,
                position: Point::new(x, bounds.height - label_height),
                color: AXIS_COLOR,
                size: 12.0.into(),
                ..canvas::Text::default()
            });
        }

        let Some(samples) = &self.samples else {
            return vec![frame.into_geometry()];
        };

        // Fixed ±1.0 scale, like a scope: quiet input looks quiet.
        let columns = bounds.width.max(1.0) as usize;
        let trace = Path::new(|builder| {
            for (x, range) in column_ranges(samples.len(), columns).enumerate() {
                let (lo, hi) = envelope(&samples[range]);
                let x = x as f32 + 0.5;
                let top = mid - hi.clamp(-1.0, 1.0) * half_height;
                let bottom = mid - lo.clamp(-1.0, 1.0) * half_height;
                builder.move_to(Point::new(x, top));
                // Keep silent columns visible as a 1px line.
                builder.line_to(Point::new(x, bottom.max(top + 1.0)));
            }
        });
        frame.stroke(&trace, Stroke::default().with_color(TRACE_COLOR).with_width(1.0));

        vec![frame.into_geometry()]
    }
}
