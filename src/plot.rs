//! SVG charts of resampled counts and of the user distribution.

use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate};
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

use crate::resample::BucketSeries;
use crate::users::UsersTable;

pub const CLASSIFICATIONS_COLOUR: &str = "#dc2d4c";
pub const USERS_COLOUR: &str = "#9ab51e";
pub const DISTRIBUTION_COLOUR: &str = "#9ab51e";

/// Parses a `#rrggbb` colour.
pub fn parse_colour(hex: &str) -> Result<RGBColor> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        bail!("Invalid colour {:?}, expected #rrggbb", hex);
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

fn ensure_svg(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("svg") => Ok(()),
        _ => bail!("Unsupported chart format for {}, use .svg", path.display()),
    }
}

fn day_number(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce())
}

fn month_label(x: &f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(x.round() as i32)
        .map(|d| d.format("%b %y").to_string())
        .unwrap_or_default()
}

/// First-of-month dates within `[start, end]`, thinned to about a dozen.
fn month_ticks(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    let interval = (months.max(0) / 12 + 1) as u32;

    let mut ticks = Vec::new();
    let mut tick = NaiveDate::from_ymd_opt(start.year(), start.month(), 1);
    while let Some(date) = tick {
        if date > end {
            break;
        }
        if date >= start {
            ticks.push(date);
        }
        tick = date.checked_add_months(chrono::Months::new(interval));
    }

    if ticks.is_empty() {
        ticks.push(start);
    }
    ticks
}

/// Formats a count with thousands separators, e.g. `12,345`.
fn thousands(y: &f64) -> String {
    let digits = format!("{:.0}", y.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if *y < 0.0 && digits != "0" {
        out.insert(0, '-');
    }
    out
}

/// Bar chart of `series`, with an optional running total on a second axis.
///
/// `measure` names what is counted, e.g. `"Classifications"`.
#[tracing::instrument(
    skip_all,
    fields(measure = %measure, sampling = %series.sampling, path = %path.display())
)]
pub fn plot_time_bar(
    series: &BucketSeries,
    measure: &str,
    colour: RGBColor,
    path: &Path,
    add_cumulative: bool,
) -> Result<()> {
    ensure_svg(path)?;
    let (Some(first), Some(last)) = (series.buckets.first(), series.buckets.last()) else {
        bail!("No {} to plot", measure.to_lowercase());
    };

    let width = series.sampling.bar_width_days();
    let x_range = (day_number(first.label) - width)..(day_number(last.label) + width);
    let y_max = (series.max_number() as f64 * 1.05).max(1.0);
    let ticks: Vec<f64> = month_ticks(
        first.label - chrono::Days::new(width.floor() as u64),
        last.label + chrono::Days::new(width.floor() as u64),
    )
    .into_iter()
    .map(day_number)
    .collect();
    let tick_count = ticks.len();

    let root = SVGBackend::new(path, (900, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .right_y_label_area_size(if add_cumulative { 80 } else { 0 })
        .build_cartesian_2d(x_range.clone().with_key_points(ticks), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(tick_count)
        .x_label_formatter(&month_label)
        .y_label_formatter(&thousands)
        .y_desc(format!("{} per {}", measure, series.sampling))
        .axis_desc_style(("sans-serif", 15).into_font().color(&colour))
        .draw()?;

    chart.draw_series(series.buckets.iter().map(|b| {
        let x = day_number(b.label);
        Rectangle::new(
            [(x - width / 2.0, 0.0), (x + width / 2.0, b.number as f64)],
            colour.filled(),
        )
    }))?;

    if add_cumulative {
        let total_max = (series.total() as f64 * 1.05).max(1.0);
        let mut chart = chart.set_secondary_coord(x_range, 0f64..total_max);
        chart
            .configure_secondary_axes()
            .y_label_formatter(&thousands)
            .draw()?;
        chart.draw_secondary_series(LineSeries::new(
            series
                .buckets
                .iter()
                .map(|b| (day_number(b.label), b.total as f64)),
            BLACK.stroke_width(2),
        ))?;
    }

    root.present()?;
    info!(buckets = series.buckets.len(), "Chart written");
    Ok(())
}

/// Lorenz curve of classifications across users, annotated with the Gini
/// coefficient.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn plot_user_distribution(users: &UsersTable, colour: RGBColor, path: &Path) -> Result<()> {
    ensure_svg(path)?;

    let root = SVGBackend::new(path, (500, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..1f64, 0f64..1f64)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("cumulative contributors")
        .y_desc("cumulative classifications")
        .draw()?;

    let curve = std::iter::once((0.0, 0.0)).chain(
        users
            .ascending()
            .iter()
            .map(|r| (r.proportion_user_base, r.proportion_total_classifications)),
    );
    chart.draw_series(LineSeries::new(curve, colour.stroke_width(2)))?;
    chart.draw_series(LineSeries::new(
        vec![(0.0, 0.0), (1.0, 1.0)],
        colour.mix(0.5).stroke_width(2),
    ))?;
    chart.draw_series(std::iter::once(Text::new(
        format!("Gini-coefficient = {:.2}", users.gini_coefficient),
        (0.15, 0.65),
        ("sans-serif", 15).into_font().color(&colour),
    )))?;

    root.present()?;
    info!(users = users.total_users, "Distribution chart written");
    Ok(())
}
