use super::{ChartRenderer, RenderError, RenderedChart};
use crate::models::{Chart, ChartVariant};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const WIDTH: f64 = 600.0;
const PLOT_LEFT: f64 = 50.0;
const PLOT_RIGHT: f64 = 500.0;
const PLOT_TOP: f64 = 60.0;
const PLOT_BOTTOM: f64 = 360.0;
const LEGEND_TOP: f64 = 400.0;
const LEGEND_ROW: f64 = 20.0;
/// Item and variant names are cut to this many characters in the legend
const LABEL_CHARS: usize = 30;

const PALETTE: [&str; 10] = [
    "#636efa", "#ef553b", "#00cc96", "#ab63fa", "#ffa15a", "#19d3f3", "#ff6692", "#b6e880",
    "#ff97ff", "#fecb52",
];

/// Extent of every member's series, mapped onto the plot area
#[derive(Debug, Clone, Copy)]
struct Bounds {
    first: NaiveDate,
    last: NaiveDate,
    low: f64,
    high: f64,
}

impl Bounds {
    fn of(members: &[ChartVariant]) -> Option<Self> {
        let mut bounds: Option<Bounds> = None;
        for member in members {
            let series = &member.series;
            for (date, price) in series.dates.iter().zip(&series.prices) {
                let price = to_f64(*price);
                bounds = Some(match bounds {
                    None => Bounds {
                        first: *date,
                        last: *date,
                        low: price,
                        high: price,
                    },
                    Some(b) => Bounds {
                        first: b.first.min(*date),
                        last: b.last.max(*date),
                        low: b.low.min(price),
                        high: b.high.max(price),
                    },
                });
            }
        }
        bounds
    }

    fn x(&self, date: NaiveDate) -> f64 {
        let span = (self.last - self.first).num_days();
        if span == 0 {
            return (PLOT_LEFT + PLOT_RIGHT) / 2.0;
        }
        let offset = (date - self.first).num_days() as f64 / span as f64;
        PLOT_LEFT + offset * (PLOT_RIGHT - PLOT_LEFT)
    }

    fn y(&self, price: f64) -> f64 {
        if self.high - self.low < f64::EPSILON {
            return (PLOT_TOP + PLOT_BOTTOM) / 2.0;
        }
        PLOT_BOTTOM - (price - self.low) / (self.high - self.low) * (PLOT_BOTTOM - PLOT_TOP)
    }
}

fn to_f64(price: Decimal) -> f64 {
    price.to_f64().unwrap_or(0.0)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= LABEL_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(LABEL_CHARS).collect();
    format!("{}...", cut)
}

/// Legend letter for the `index`th member: A, B, C ...
fn letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

fn legend_label(index: usize, member: &ChartVariant) -> String {
    format!(
        "{}: {} - {}",
        letter(index),
        truncate(&member.item_name),
        truncate(&member.variant_name)
    )
}

/// Draws a chart as an SVG line plot: one line per member over the member's daily
/// series, the latest price at the end of each line and a lettered legend underneath.
#[derive(Debug, Clone, Default)]
pub struct SvgChartRenderer;

impl SvgChartRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn draw(&self, chart: &Chart) -> Result<String, RenderError> {
        let bounds =
            Bounds::of(&chart.variants).ok_or_else(|| RenderError::Empty(chart.key().to_string()))?;
        let height = LEGEND_TOP + LEGEND_ROW * chart.variants.len() as f64;

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}""#,
            WIDTH, height
        );
        svg.push_str(&format!(
            r#" viewBox="0 0 {} {}" font-family="sans-serif">"#,
            WIDTH, height
        ));
        svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
        svg.push_str(&format!(
            r#"<text x="{:.1}" y="30" text-anchor="middle" font-size="18">{}</text>"#,
            WIDTH / 2.0,
            escape(chart.display_name())
        ));

        svg.push_str(&format!(
            r##"<line x1="{l:.1}" y1="{b:.1}" x2="{r:.1}" y2="{b:.1}" stroke="#444"/>"##,
            l = PLOT_LEFT,
            r = PLOT_RIGHT,
            b = PLOT_BOTTOM
        ));
        for (date, x, anchor) in [
            (bounds.first, PLOT_LEFT, "start"),
            (bounds.last, PLOT_RIGHT, "end"),
        ] {
            svg.push_str(&format!(
                r#"<text x="{:.1}" y="{:.1}" text-anchor="{}" font-size="12">{}</text>"#,
                x,
                PLOT_BOTTOM + 20.0,
                anchor,
                date.format("%d %b %Y")
            ));
        }

        for (i, member) in chart.variants.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            let series = &member.series;
            let points: Vec<(f64, f64)> = series
                .dates
                .iter()
                .zip(&series.prices)
                .map(|(date, price)| (bounds.x(*date), bounds.y(to_f64(*price))))
                .collect();

            if let Some((x, y)) = points.last() {
                let path: Vec<String> = points
                    .iter()
                    .map(|(x, y)| format!("{:.1},{:.1}", x, y))
                    .collect();
                svg.push_str(&format!(
                    r#"<polyline fill="none" stroke="{}" stroke-width="2" points="{}"/>"#,
                    color,
                    path.join(" ")
                ));
                svg.push_str(&format!(
                    r#"<circle cx="{:.1}" cy="{:.1}" r="3" fill="{}"/>"#,
                    x,
                    y,
                    color
                ));
                svg.push_str(&format!(
                    r#"<text x="{:.1}" y="{:.1}" font-size="11" fill="{}">{}: {}</text>"#,
                    x + 6.0,
                    y + 4.0,
                    color,
                    letter(i),
                    member.current_price
                ));
            }

            let row = LEGEND_TOP + LEGEND_ROW * i as f64;
            svg.push_str(&format!(
                r#"<rect x="{:.1}" y="{:.1}" width="12" height="12" fill="{}"/>"#,
                PLOT_LEFT,
                row - 10.0,
                color
            ));
            svg.push_str(&format!(
                r#"<text x="{:.1}" y="{:.1}" font-size="12">{}</text>"#,
                PLOT_LEFT + 18.0,
                row,
                escape(&legend_label(i, member))
            ));
        }

        svg.push_str("</svg>");
        Ok(svg)
    }
}

#[async_trait]
impl ChartRenderer for SvgChartRenderer {
    async fn render(&self, chart: &Chart) -> Result<RenderedChart, RenderError> {
        let svg = self.draw(chart)?;
        Ok(RenderedChart {
            file_name: format!("{}.svg", chart.chart_id),
            content_type: "image/svg+xml".to_string(),
            bytes: svg.into_bytes(),
        })
    }
}
