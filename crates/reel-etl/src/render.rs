//! Top-N bar chart rendering.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use crate::analysis::RatingGroup;
use crate::error::StageError;

/// Renders the best-effort visual summary of an analysis.
///
/// `groups` arrive already cut to the top N and sorted ascending by mean.
pub trait ChartRenderer: Send + Sync {
    /// # Errors
    ///
    /// Any error is reported as a skipped visualization; it never fails the
    /// analysis.
    fn render(&self, groups: &[RatingGroup], path: &Path) -> Result<(), StageError>;
}

/// Horizontal bar chart written as standalone SVG.
#[derive(Debug, Clone)]
pub struct SvgBarChart {
    pub width: u32,
    pub bar_height: u32,
    pub label_width: u32,
}

impl Default for SvgBarChart {
    fn default() -> Self {
        Self {
            width: 800,
            bar_height: 28,
            label_width: 240,
        }
    }
}

const MARGIN: u32 = 16;
const TITLE_HEIGHT: u32 = 40;
const AXIS_HEIGHT: u32 = 40;
const BAR_GAP: u32 = 6;
const BAR_COLOR: &str = "skyblue";

impl SvgBarChart {
    /// Build the SVG document for `groups`.
    #[must_use]
    pub fn document(&self, groups: &[RatingGroup]) -> String {
        let count = u32::try_from(groups.len()).unwrap_or(u32::MAX);
        let plot_left = MARGIN + self.label_width;
        let plot_width = self.width.saturating_sub(plot_left + MARGIN).max(1);
        let rows_height = count.saturating_mul(self.bar_height + BAR_GAP);
        let height = TITLE_HEIGHT + rows_height + AXIS_HEIGHT + MARGIN;
        let max = groups
            .iter()
            .map(|g| g.avg_rating)
            .fold(0.0_f64, f64::max)
            .max(f64::EPSILON);

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{height}" viewBox="0 0 {} {height}" font-family="sans-serif" font-size="13">"#,
            self.width, self.width
        );
        let _ = writeln!(
            svg,
            r#"  <text x="{}" y="{}" text-anchor="middle" font-size="16">Top {count} Movies by Average Rating</text>"#,
            self.width / 2,
            TITLE_HEIGHT / 2 + 6
        );

        // Highest mean on top: the last (largest) group is drawn in the first row.
        for (row, group) in groups.iter().rev().enumerate() {
            let row = u32::try_from(row).unwrap_or(u32::MAX);
            let y = TITLE_HEIGHT + row * (self.bar_height + BAR_GAP);
            let bar = bar_length(group.avg_rating, max, plot_width);
            let text_y = y + self.bar_height / 2 + 4;
            let _ = writeln!(
                svg,
                r#"  <text x="{}" y="{text_y}" text-anchor="end">{}</text>"#,
                plot_left - 8,
                escape(&group.title)
            );
            let _ = writeln!(
                svg,
                r#"  <rect x="{plot_left}" y="{y}" width="{bar}" height="{}" fill="{BAR_COLOR}"><title>{} ({} ratings)</title></rect>"#,
                self.bar_height,
                group.avg_rating,
                group.n
            );
            let _ = writeln!(
                svg,
                r#"  <text x="{}" y="{text_y}">{:.2}</text>"#,
                plot_left + bar + 4,
                group.avg_rating
            );
        }

        let axis_y = TITLE_HEIGHT + rows_height + 4;
        let _ = writeln!(
            svg,
            r#"  <line x1="{plot_left}" y1="{axis_y}" x2="{}" y2="{axis_y}" stroke="black"/>"#,
            plot_left + plot_width
        );
        let _ = writeln!(
            svg,
            r#"  <text x="{}" y="{}" text-anchor="middle">Average Rating</text>"#,
            plot_left + plot_width / 2,
            axis_y + AXIS_HEIGHT / 2 + 4
        );
        svg.push_str("</svg>\n");
        svg
    }
}

impl ChartRenderer for SvgBarChart {
    fn render(&self, groups: &[RatingGroup], path: &Path) -> Result<(), StageError> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| StageError::artifact(path, e))?;
        file.write_all(self.document(groups).as_bytes())
            .map_err(|e| StageError::artifact(path, e))?;
        file.persist(path)
            .map_err(|e| StageError::artifact(path, e.error))?;
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bar_length(value: f64, max: f64, plot_width: u32) -> u32 {
    let scaled = (value.max(0.0) / max) * f64::from(plot_width);
    scaled.round().clamp(0.0, f64::from(plot_width)) as u32
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
