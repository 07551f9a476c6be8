//! Static HTML view of the dispatch table.

use chrono::NaiveDateTime;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::DispatchError;
use crate::output::{read_dispatch, replace_atomically};
use crate::records::DispatchRow;

const STYLE: &str = r#" body{font-family:Segoe UI,Roboto,Arial,sans-serif;margin:24px;background:#fafafa;color:#222}
 .sub{color:#666;margin-bottom:18px}
 .card{background:#fff;border:1px solid #eee;border-radius:10px;margin:16px 0;padding:16px;box-shadow:0 1px 3px rgba(0,0,0,.05)}
 .hdr{font-weight:600;margin-bottom:8px}
 .tag{display:inline-block;background:#eef;color:#224;border-radius:6px;padding:2px 6px;margin-right:6px}
 .grid{display:grid;grid-template-columns:1fr 1fr;gap:16px;align-items:center}
 .mini{border-collapse:collapse;width:100%}
 .mini th,.mini td{border-bottom:1px solid #eee;padding:6px 8px;text-align:left}
 .mini th{background:#f7f7fb}
 .reason{background:#f9f9f9;border-left:4px solid #6aa84f;padding:8px;border-radius:6px}
 .meta{color:#666;font-size:12px}
 .plot{width:100%;border:1px solid #eee;border-radius:8px}
 .plot-missing{background:#f3f3f3;height:220px;display:flex;align-items:center;justify-content:center;color:#888;border-radius:8px}
 @media (max-width:900px){.grid{grid-template-columns:1fr}}"#;

/// File name of the history plot for one series.
pub fn plot_file_name(stop_id: &str, route_id: &str) -> String {
    format!("history_{stop_id}_{route_id}.png")
}

/// Finds history plots and turns them into `src` values relative to the page.
pub struct PlotLookup {
    plots_dir: PathBuf,
    page_dir: PathBuf,
}

impl PlotLookup {
    pub fn new(plots_dir: &Path, page: &Path) -> Self {
        Self {
            plots_dir: plots_dir.to_path_buf(),
            page_dir: page.parent().map(Path::to_path_buf).unwrap_or_default(),
        }
    }

    /// `src` for the series' plot, if the image exists.
    pub fn src(&self, stop_id: &str, route_id: &str) -> Option<String> {
        let path = self.plots_dir.join(plot_file_name(stop_id, route_id));
        if !path.is_file() {
            return None;
        }
        let shown = path.strip_prefix(&self.page_dir).unwrap_or(&path);
        Some(shown.to_string_lossy().replace('\\', "/"))
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

fn render_card(out: &mut String, row: &DispatchRow, plots: &PlotLookup) {
    let plot = match plots.src(&row.stop_id, &row.route_id) {
        Some(src) => format!("<img class='plot' src='{}'/>", escape_html(&src)),
        None => "<div class='plot-missing'>No plot</div>".to_string(),
    };

    let _ = write!(
        out,
        r#"
    <div class="card">
      <div class="hdr"><span class="tag">Route</span> {route} &nbsp; <span class="tag">Stop</span> {stop}</div>
      <div class="grid">
        <div>
          <h4>Next 3 hours</h4>
          <table class="mini">
            <tr><th>Timestamp</th><th>Pred</th><th>Buses</th></tr>"#,
        route = escape_html(&row.route_id),
        stop = escape_html(&row.stop_id),
    );
    for (ts, pred, buses) in row.horizons() {
        let _ = write!(
            out,
            "\n            <tr><td>{}</td><td>{:.1}</td><td>{}</td></tr>",
            ts.format("%Y-%m-%d %H:%M:%S"),
            pred,
            buses
        );
    }
    let _ = write!(
        out,
        r#"
          </table>
          <p class="reason">{reason}</p>
          <p class="meta">Capacity {capacity}, Load factor {load_factor:.2}</p>
        </div>
        <div>{plot}</div>
      </div>
    </div>
    "#,
        reason = escape_html(&row.reason),
        capacity = row.bus_capacity.trunc() as i64,
        load_factor = row.load_factor,
    );
}

/// Renders the full page. Rows are shown in (route, stop, T+1) order.
pub fn render(rows: &[DispatchRow], plots: &PlotLookup, generated_at: NaiveDateTime) -> String {
    let mut ordered: Vec<&DispatchRow> = rows.iter().collect();
    ordered.sort_by(|a, b| {
        (&a.route_id, &a.stop_id, a.t1_timestamp).cmp(&(&b.route_id, &b.stop_id, b.t1_timestamp))
    });

    let mut cards = String::new();
    for row in &ordered {
        render_card(&mut cards, row, plots);
    }
    if ordered.is_empty() {
        cards.push_str("<p>No rows. Run the dispatch script first.</p>");
    }

    format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"/>
<meta http-equiv="refresh" content="300">
<title>Peak Dispatch Dashboard</title>
<style>
{STYLE}
</style></head>
<body>
  <h1>Peak Dispatch Dashboard</h1>
  <div class="sub">Generated at {generated}</div>
  {cards}
</body></html>"#,
        generated = generated_at.format("%Y-%m-%d %H:%M"),
    )
}

/// Reads the dispatch table and atomically writes the dashboard page.
#[tracing::instrument(fields(input = %input.display(), output = %output.display()))]
pub fn build_dashboard(
    input: &Path,
    plots_dir: &Path,
    output: &Path,
    generated_at: NaiveDateTime,
) -> Result<usize, DispatchError> {
    let rows = read_dispatch(input)?;
    let plots = PlotLookup::new(plots_dir, output);
    let html = render(&rows, &plots, generated_at);

    replace_atomically(output, "dashboard_", |file| {
        file.write_all(html.as_bytes())?;
        Ok(())
    })?;

    info!(cards = rows.len(), "Wrote dashboard");
    Ok(rows.len())
}
