//! Turns the current [`Dashboard`] into page markup.

use crate::aggregate::{
    DayBucket, DayMeasure, HourlyPoint, OverallStatus, SeriesKind, ServiceStatusSnapshot, Severity,
};
use crate::db::Status;
use crate::session::Dashboard;

const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");
const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");

const CHART_WIDTH: f64 = 240.0;
const CHART_HEIGHT: f64 = 60.0;

/// Card view model for one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCard {
    pub name: String,
    pub icon: String,
    pub status_class: &'static str,
    pub status_label: &'static str,
    pub uptime: String,
    pub response_time: String,
    pub average: String,
    pub days: Vec<DayCell>,
    pub chart: ChartSeries,
}

/// One cell of the uptime bar.
#[derive(Debug, Clone, PartialEq)]
pub struct DayCell {
    pub class: &'static str,
    pub title: String,
}

/// Response time line for the trailing 24 hours.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub hours: Vec<u32>,
    pub values: Vec<Option<u64>>,
    pub synthetic: bool,
}

impl ServiceCard {
    pub fn from_snapshot(snapshot: &ServiceStatusSnapshot) -> Self {
        let (status_class, status_label) = match snapshot.status {
            Some(Status::Up) => ("up", "Up"),
            Some(Status::Down) => ("down", "Down"),
            None => ("unknown", "No data"),
        };

        Self {
            name: snapshot.display_name.clone(),
            icon: snapshot.icon.clone().unwrap_or_default(),
            status_class,
            status_label,
            uptime: format_uptime(snapshot.uptime_percent),
            response_time: format_ms(snapshot.current_response_time_ms),
            average: format_ms(snapshot.avg_response_time_ms),
            days: snapshot.day_buckets.iter().map(DayCell::from_bucket).collect(),
            chart: ChartSeries::from_points(&snapshot.hourly_points, snapshot.series),
        }
    }
}

impl DayCell {
    fn from_bucket(bucket: &DayBucket) -> Self {
        let detail = match bucket.measure {
            DayMeasure::MinutesDown(m) if m > 0.0 => format!(" ({:.0} min down)", m),
            DayMeasure::UpRatio(r) => format!(" ({:.2}% up)", r * 100.0),
            _ => String::new(),
        };
        Self {
            class: severity_class(bucket.severity),
            title: format!("{}: {}{}", bucket.day.format("%Y-%m-%d"), bucket.severity.label(), detail),
        }
    }
}

impl ChartSeries {
    pub fn from_points(points: &[HourlyPoint], kind: SeriesKind) -> Self {
        Self {
            hours: points.iter().map(|p| p.hour_of_day).collect(),
            values: points.iter().map(|p| p.response_time_ms).collect(),
            synthetic: kind == SeriesKind::Synthetic,
        }
    }

    /// SVG path data. A gap starts a new subpath instead of dropping to zero.
    pub fn svg_path(&self) -> String {
        let max = self.values.iter().flatten().copied().max().unwrap_or(0).max(1) as f64 * 1.1;
        let step = if self.values.len() > 1 {
            CHART_WIDTH / (self.values.len() - 1) as f64
        } else {
            0.0
        };

        let mut path = Vec::new();
        let mut pen_down = false;
        for (i, value) in self.values.iter().enumerate() {
            match value {
                Some(v) => {
                    let x = i as f64 * step;
                    let y = CHART_HEIGHT - (*v as f64 / max) * CHART_HEIGHT;
                    let cmd = if pen_down { "L" } else { "M" };
                    path.push(format!("{}{:.1},{:.1}", cmd, x, y));
                    pen_down = true;
                }
                None => pen_down = false,
            }
        }
        path.join(" ")
    }
}

fn severity_class(severity: Severity) -> &'static str {
    match severity {
        Severity::Operational => "operational",
        Severity::Degraded => "degraded",
        Severity::Outage => "outage",
        Severity::NoData => "nodata",
    }
}

pub fn format_uptime(percent: f64) -> String {
    format!("{:.2}%", percent)
}

pub fn format_ms(ms: Option<u64>) -> String {
    match ms {
        Some(ms) => format!("{}ms", ms),
        None => "n/a".to_string(),
    }
}

/// Minimal escaping for text and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_card(card: &ServiceCard) -> String {
    let cells: String = card
        .days
        .iter()
        .map(|d| format!(r#"<span class="day {}" title="{}"></span>"#, d.class, escape_html(&d.title)))
        .collect();

    let (chart_class, chart_caption) = if card.chart.synthetic {
        ("chart synthetic", "Response time, last 24h (estimated, no measurements yet)")
    } else {
        ("chart", "Response time, last 24h")
    };
    let first_hour = card.chart.hours.first().copied().unwrap_or(0);
    let last_hour = card.chart.hours.last().copied().unwrap_or(0);

    format!(
        r#"<article class="card">
  <header>
    <span class="icon">{icon}</span>
    <h2>{name}</h2>
    <span class="pill {status_class}">{status_label}</span>
  </header>
  <dl>
    <div><dt>Uptime</dt><dd>{uptime}</dd></div>
    <div><dt>Response</dt><dd>{response}</dd></div>
    <div><dt>24h avg</dt><dd>{average}</dd></div>
  </dl>
  <div class="bar">{cells}</div>
  <figure class="{chart_class}">
    <svg viewBox="0 0 {w} {h}" preserveAspectRatio="none"><path d="{path}"/></svg>
    <figcaption>{chart_caption} <span class="hours">{first_hour:02}:00 to {last_hour:02}:00 UTC</span></figcaption>
  </figure>
</article>"#,
        icon = escape_html(&card.icon),
        name = escape_html(&card.name),
        status_class = card.status_class,
        status_label = card.status_label,
        uptime = card.uptime,
        response = card.response_time,
        average = card.average,
        cells = cells,
        chart_class = chart_class,
        w = CHART_WIDTH,
        h = CHART_HEIGHT,
        path = card.chart.svg_path(),
        chart_caption = chart_caption,
        first_hour = first_hour,
        last_hour = last_hour,
    )
}

fn overall_class(overall: OverallStatus) -> &'static str {
    match overall {
        OverallStatus::Operational => "operational",
        OverallStatus::Degraded => "degraded",
        OverallStatus::Outage => "outage",
    }
}

/// Render the full page for the given dashboard state.
pub fn render_page(title: &str, dashboard: &Dashboard) -> String {
    let (banner, cards) = match dashboard {
        Dashboard::Pending => (
            r#"<section class="banner pending"><h1>Waiting for first update</h1></section>"#.to_string(),
            String::new(),
        ),
        Dashboard::Ready {
            overall,
            services,
            updated_at,
            ..
        } => {
            let banner = format!(
                r#"<section class="banner {}"><h1>{}</h1><p>Updated {}</p></section>"#,
                overall_class(*overall),
                overall.headline(),
                updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            );
            let cards = services
                .iter()
                .map(|s| render_card(&ServiceCard::from_snapshot(s)))
                .collect::<Vec<_>>()
                .join("\n");
            (banner, cards)
        }
        Dashboard::Unavailable { reason, at } => (
            format!(
                r#"<section class="banner error">
  <h1>Status data is currently unavailable</h1>
  <p>{} at {}</p>
  <form method="post" action="/api/refresh"><button type="submit">Retry</button></form>
</section>"#,
                escape_html(reason),
                at.format("%Y-%m-%d %H:%M:%S UTC"),
            ),
            String::new(),
        ),
    };

    let content = DASHBOARD_TEMPLATE
        .replace("{{banner}}", &banner)
        .replace("{{cards}}", &cards);

    LAYOUT_TEMPLATE
        .replace("{{title}}", &escape_html(title))
        .replace("{{content}}", &content)
}
