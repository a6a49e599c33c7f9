use std::fmt::Write;
use std::str::FromStr;
use std::time::Duration;

use serde_derive::Serialize;

use crate::error::{Error, Result};
use crate::stats::Summary;

const NO_DATA: &str = "no data";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Format> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            _ => Err(Error::invalid_value("format", s)),
        }
    }
}

pub fn render(format: Format, target: &str, summary: &Summary) -> Result<String> {
    match format {
        Format::Text => Ok(render_text(target, summary)),
        Format::Json => render_json(target, summary),
    }
}

pub fn render_text(target: &str, summary: &Summary) -> String {
    let mut out = String::new();

    // writing into a String can't fail
    let _ = write_text(&mut out, target, summary);

    out
}

fn write_text(out: &mut String, target: &str, summary: &Summary) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "Target:                  {}", target)?;
    writeln!(out, "Total Tests:             {}", summary.total)?;
    writeln!(out, "Successful Tests:        {}", summary.succeeded)?;
    writeln!(out, "Failed Tests:            {}", summary.failed)?;
    if summary.cancelled > 0 {
        writeln!(out, "  (cancelled:            {})", summary.cancelled)?;
    }
    writeln!(out, "Success Rate:            {:.2}%", summary.success_rate * 100.0)?;

    match &summary.latency {
        Some(latency) => {
            writeln!(out, "Average Latency:         {}", ms(latency.mean))?;
            writeln!(out, "Min Latency:             {}", ms(latency.min))?;
            writeln!(out, "Max Latency:             {}", ms(latency.max))?;
            writeln!(out, "Latency Std Deviation:   {}", ms(latency.stddev))?;
            writeln!(
                out,
                "Percentiles:             p50 {} / p95 {} / p99 {}",
                ms(latency.p50),
                ms(latency.p95),
                ms(latency.p99)
            )?;
        }
        None => {
            writeln!(out, "Average Latency:         {}", NO_DATA)?;
            writeln!(out, "Min Latency:             {}", NO_DATA)?;
            writeln!(out, "Max Latency:             {}", NO_DATA)?;
            writeln!(out, "Latency Std Deviation:   {}", NO_DATA)?;
        }
    }

    writeln!(out, "Total Test Duration:     {:.2} seconds", summary.wall.as_secs_f64())?;
    writeln!(out, "Throughput:              {:.2} requests/second", summary.throughput)?;
    writeln!(
        out,
        "Successful Throughput:   {:.2} requests/second",
        summary.success_throughput
    )?;

    if !summary.statuses.is_empty() {
        let statuses = summary
            .statuses
            .iter()
            .map(|(code, count)| format!("{} x{}", code, count))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "Status Codes:            {}", statuses)?;
    }

    if summary.latency.is_none() {
        writeln!(out)?;
        writeln!(out, "All requests failed. Unable to calculate latency statistics.")?;
    }

    Ok(())
}

fn ms(d: Duration) -> String {
    format!("{:.2} ms", d.as_secs_f64() * 1e3)
}

#[derive(Serialize)]
struct JsonReport<'a> {
    target: &'a str,
    #[serde(flatten)]
    summary: &'a Summary,
}

pub fn render_json(target: &str, summary: &Summary) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonReport { target, summary })?)
}
