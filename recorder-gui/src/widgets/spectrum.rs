//! # Spectrum Widget
//!
//! Magnitude spectrum of the latest analysis frame, 0 Hz on the left and the
//! configured maximum frequency on the right. Magnitudes are scaled to the
//! frame's own peak, so the plot shows shape rather than absolute level.

use std::sync::Arc;

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{alignment, mouse, Color, Element, Point, Rectangle, Renderer, Theme};
use recorder_core::AnalysisFrame;

use super::column_ranges;

const BAR_COLOR: Color = Color::from_rgb(1.0, 0.35, 0.35);
const LABEL_COLOR: Color = Color::from_rgb(0.5, 0.5, 0.5);
const LABEL_HEIGHT: f32 = 16.0;

pub struct SpectrumPlot {
    frame: Option<Arc<AnalysisFrame>>,
    max_frequency: f32,
}

impl SpectrumPlot {
    pub fn new(frame: Option<Arc<AnalysisFrame>>, max_frequency: f32) -> Self {
        Self {
            frame,
            max_frequency,
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

/// Largest finite magnitude per pixel column, scaled to 0.0..=1.0.
fn column_levels(magnitudes: &[f32], columns: usize) -> Vec<f32> {
    let levels: Vec<f32> = column_ranges(magnitudes.len(), columns)
        .map(|range| {
            magnitudes[range]
                .iter()
                .copied()
                .filter(|m| m.is_finite())
                .fold(0.0f32, f32::max)
        })
        .collect();

    let peak = levels.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return vec![0.0; levels.len()];
    }
    levels.into_iter().map(|level| level / peak).collect()
}

impl<Message> canvas::Program<Message> for SpectrumPlot {
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

        let spectrum = match &self.frame {
            Some(analysis) if analysis.has_signal() && !analysis.spectrum.is_empty() => {
                &analysis.spectrum
            }
            _ => {
                frame.fill_text(canvas::Text {
                    content: "No data to display".to_string(),
                    position: Point::new(bounds.width / 2.0, bounds.height / 2.0),
                    color: LABEL_COLOR,
                    size: 16.0.into(),
                    horizontal_alignment: alignment::Horizontal::Center,
                    vertical_alignment: alignment::Vertical::Center,
                    ..canvas::Text::default()
                });
                return vec![frame.into_geometry()];
            }
        };

        let plot_height = (bounds.height - LABEL_HEIGHT).max(1.0);
        let columns = bounds.width.max(1.0) as usize;
        let bars = Path::new(|builder| {
            for (x, level) in column_levels(&spectrum.magnitudes, columns).into_iter().enumerate() {
                if level <= 0.0 {
                    continue;
                }
                let x = x as f32 + 0.5;
                builder.move_to(Point::new(x, plot_height));
                builder.line_to(Point::new(x, plot_height * (1.0 - level)));
            }
        });
        frame.stroke(&bars, Stroke::default().with_color(BAR_COLOR).with_width(1.0));

        let ticks = 4;
        for i in 0..=ticks {
            let hz = self.max_frequency * i as f32 / ticks as f32;
            let x = bounds.width * i as f32 / ticks as f32;
            let align = match i {
                0 => alignment::Horizontal::Left,
                i if i == ticks => alignment::Horizontal::Right,
                _ => alignment::Horizontal::Center,
            };
            frame.fill_text(canvas::Text {
                content: format!("{:.0} Hz", hz),
                position: Point::new(x, bounds.height - LABEL_HEIGHT),
                color: LABEL_COLOR,
                size: 12.0.into(),
                horizontal_alignment: align,
                ..canvas::Text::default()
            });
        }

        vec![frame.into_geometry()]
    }
}
