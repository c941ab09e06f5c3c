//! Heatmap rendering.
//!
//! The heatmap is laid out as an SVG document and rasterized to PNG with
//! resvg. Text uses whatever system fonts are installed; without any fonts
//! the labels are simply not drawn and the image is still produced.

use crate::matrix::{intensity_to_count, Cell, HeatmapMatrix, DAYS_PER_COLUMN};
use crate::palette::{Palette, Rgb, MISSING_DAY_COLOR};
use crate::{HeatmapError, Result};
use resvg::tiny_skia;
use resvg::usvg::{fontdb, Options, Tree};
use std::fmt::Write as _;
use std::sync::Arc;

const FONT_FAMILY: &str = "DejaVu Sans, Arial, Helvetica, sans-serif";
const MISSING_DAY_LABEL: &str = "Day does not exist";
const NO_DATA_LABEL: &str = "No listening data";
const COLORBAR_LABEL: &str = "Number of Songs Played";

/// A rendered PNG heatmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatmapImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Edge length of one day cell in pixels
    pub cell_size: u32,
    /// Fill for days that do not exist in a month
    pub missing_color: Rgb,
    /// Columns reserved for the plot area even when there are fewer months
    pub min_columns: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            cell_size: 22,
            missing_color: MISSING_DAY_COLOR,
            min_columns: 12,
        }
    }
}

struct Layout {
    cell: f64,
    left: f64,
    top: f64,
    grid_width: f64,
    grid_height: f64,
    colorbar_x: f64,
    width: f64,
    height: f64,
}

impl Layout {
    const LEFT: f64 = 70.0;
    const TOP: f64 = 64.0;
    const BOTTOM: f64 = 96.0;
    const COLORBAR_GAP: f64 = 28.0;
    const COLORBAR_WIDTH: f64 = 18.0;
    const RIGHT: f64 = 190.0;

    fn new(options: &RenderOptions, columns: usize) -> Self {
        let cell = f64::from(options.cell_size.max(4));
        let grid_width = cell * columns.max(options.min_columns).max(1) as f64;
        let grid_height = cell * DAYS_PER_COLUMN as f64;
        let colorbar_x = Self::LEFT + grid_width + Self::COLORBAR_GAP;
        Self {
            cell,
            left: Self::LEFT,
            top: Self::TOP,
            grid_width,
            grid_height,
            colorbar_x,
            width: colorbar_x + Self::COLORBAR_WIDTH + Self::RIGHT,
            height: Self::TOP + grid_height + Self::BOTTOM,
        }
    }
}

/// Renders [`HeatmapMatrix`] values as a calendar heatmap.
pub struct HeatmapRenderer {
    options: RenderOptions,
    fontdb: Arc<fontdb::Database>,
}

impl Default for HeatmapRenderer {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

impl HeatmapRenderer {
    /// Create a renderer, loading the system fonts once.
    pub fn new(options: RenderOptions) -> Self {
        let mut fontdb = fontdb::Database::new();
        fontdb.load_system_fonts();
        log::debug!("Loaded {} font faces", fontdb.len());
        Self {
            options,
            fontdb: Arc::new(fontdb),
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render a log-intensity matrix to PNG.
    pub fn render(
        &self,
        matrix: &HeatmapMatrix,
        title: &str,
        palette: Palette,
    ) -> Result<HeatmapImage> {
        let svg = self.render_svg(matrix, title, palette);
        let image = self.rasterize(&svg)?;
        log::info!(
            "Rendered {}x{} heatmap with {} months",
            image.width,
            image.height,
            matrix.num_columns()
        );
        Ok(image)
    }

    /// Lay out the heatmap as an SVG document.
    pub fn render_svg(&self, matrix: &HeatmapMatrix, title: &str, palette: Palette) -> String {
        let layout = Layout::new(&self.options, matrix.num_columns());
        let max = matrix.max_value().filter(|max| max.is_finite());

        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.0} {h:.0}" font-family="{FONT_FAMILY}">"#,
            w = layout.width,
            h = layout.height,
        );
        let _ = write!(
            svg,
            r##"<rect x="0" y="0" width="{:.0}" height="{:.0}" fill="#FFFFFF"/>"##,
            layout.width, layout.height
        );
        let _ = write!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="20" font-weight="bold">{}</text>"#,
            layout.left + layout.grid_width / 2.0,
            layout.top / 2.0 + 6.0,
            escape_xml(title)
        );

        self.push_day_axis(&mut svg, &layout);

        match max {
            Some(max) if !matrix.is_empty() => {
                self.push_cells(&mut svg, &layout, matrix, palette, max);
                self.push_colorbar(&mut svg, &layout, palette, max);
            }
            _ => push_no_data(&mut svg, &layout),
        }

        self.push_missing_legend(&mut svg, &layout);

        let _ = write!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="14">Month (Year-Month)</text>"#,
            layout.left + layout.grid_width / 2.0,
            layout.height - 14.0
        );
        svg.push_str("</svg>");
        svg
    }

    fn push_day_axis(&self, svg: &mut String, layout: &Layout) {
        let label_x = layout.left - 8.0;
        for day in 1..=DAYS_PER_COLUMN {
            let y = layout.top + (day as f64 - 0.5) * layout.cell + 4.0;
            let _ = write!(
                svg,
                r#"<text x="{label_x:.1}" y="{y:.1}" text-anchor="end" font-size="11">{day}</text>"#
            );
        }
        let center_y = layout.top + layout.grid_height / 2.0;
        let _ = write!(
            svg,
            r#"<text x="20" y="{center_y:.1}" text-anchor="middle" font-size="14" transform="rotate(-90 20 {center_y:.1})">Day of Month</text>"#
        );
    }

    fn push_cells(
        &self,
        svg: &mut String,
        layout: &Layout,
        matrix: &HeatmapMatrix,
        palette: Palette,
        max: f64,
    ) {
        let size = layout.cell - 1.0;
        for (index, (month, column)) in matrix.columns().enumerate() {
            let x = layout.left + index as f64 * layout.cell;
            for (row, cell) in column.iter().enumerate() {
                let y = layout.top + row as f64 * layout.cell;
                let fill = match cell {
                    Cell::Missing => self.options.missing_color,
                    Cell::Value(v) => palette.color_at(normalize(*v, max)),
                };
                let _ = write!(
                    svg,
                    r#"<rect x="{x:.1}" y="{y:.1}" width="{size:.1}" height="{size:.1}" fill="{}"/>"#,
                    fill.hex()
                );
            }

            let label_x = x + layout.cell / 2.0;
            let label_y = layout.top + layout.grid_height + 12.0;
            let _ = write!(
                svg,
                r#"<text x="{label_x:.1}" y="{label_y:.1}" text-anchor="end" font-size="11" transform="rotate(-45 {label_x:.1} {label_y:.1})">{}</text>"#,
                month.label()
            );
        }
    }

    fn push_colorbar(&self, svg: &mut String, layout: &Layout, palette: Palette, max: f64) {
        let bar_height = layout.grid_height * 0.75;
        let bar_top = layout.top + (layout.grid_height - bar_height) / 2.0;
        let bar_bottom = bar_top + bar_height;
        let x = layout.colorbar_x;

        svg.push_str(r#"<defs><linearGradient id="colorbar" x1="0" y1="1" x2="0" y2="0">"#);
        for (offset, color) in palette.gradient(16) {
            let _ = write!(
                svg,
                r#"<stop offset="{offset:.4}" stop-color="{}"/>"#,
                color.hex()
            );
        }
        svg.push_str("</linearGradient></defs>");
        let _ = write!(
            svg,
            r##"<rect x="{x:.1}" y="{bar_top:.1}" width="{:.1}" height="{bar_height:.1}" fill="url(#colorbar)" stroke="#000000" stroke-width="0.5"/>"##,
            Layout::COLORBAR_WIDTH
        );

        let tick_x = x + Layout::COLORBAR_WIDTH;
        let mut ticks = vec![(bar_bottom, songs_label(1))];
        if max > 0.0 {
            ticks.push((bar_top, songs_label(intensity_to_count(max).round() as u64)));
        }
        for (y, label) in ticks {
            let _ = write!(
                svg,
                r##"<line x1="{tick_x:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#000000"/><text x="{:.1}" y="{:.1}" font-size="12">{label}</text>"##,
                tick_x + 4.0,
                tick_x + 7.0,
                y + 4.0
            );
        }

        let label_x = tick_x + 90.0;
        let center_y = bar_top + bar_height / 2.0;
        let _ = write!(
            svg,
            r#"<text x="{label_x:.1}" y="{center_y:.1}" text-anchor="middle" font-size="13" transform="rotate(-90 {label_x:.1} {center_y:.1})">{COLORBAR_LABEL}</text>"#
        );
    }

    fn push_missing_legend(&self, svg: &mut String, layout: &Layout) {
        let x = layout.colorbar_x;
        let y = layout.top + layout.grid_height + 24.0;
        let _ = write!(
            svg,
            r##"<rect x="{x:.1}" y="{y:.1}" width="14" height="14" fill="{}" stroke="#000000" stroke-width="0.5"/><text x="{:.1}" y="{:.1}" font-size="12">{MISSING_DAY_LABEL}</text>"##,
            self.options.missing_color.hex(),
            x + 20.0,
            y + 11.0
        );
    }

    fn rasterize(&self, svg: &str) -> Result<HeatmapImage> {
        let mut options = Options::default();
        options.fontdb = Arc::clone(&self.fontdb);

        let tree = Tree::from_str(svg, &options)
            .map_err(|e| HeatmapError::Render(format!("Failed to parse SVG: {e}")))?;

        let size = tree.size().to_int_size();
        let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
            .ok_or_else(|| HeatmapError::Render("Failed to create pixmap".to_string()))?;
        pixmap.fill(tiny_skia::Color::WHITE);

        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        let png = pixmap
            .encode_png()
            .map_err(|e| HeatmapError::Render(format!("Failed to encode PNG: {e}")))?;

        Ok(HeatmapImage {
            png,
            width: size.width(),
            height: size.height(),
        })
    }
}

fn push_no_data(svg: &mut String, layout: &Layout) {
    let _ = write!(
        svg,
        r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="#F4F4F4" stroke="#CCCCCC"/><text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="18" fill="#666666">{NO_DATA_LABEL}</text>"##,
        layout.left,
        layout.top,
        layout.grid_width,
        layout.grid_height,
        layout.left + layout.grid_width / 2.0,
        layout.top + layout.grid_height / 2.0
    );
}

fn normalize(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        value / max
    } else {
        0.0
    }
}

fn songs_label(count: u64) -> String {
    if count == 1 {
        "1 song".to_string()
    } else {
        format!("{count} songs")
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
