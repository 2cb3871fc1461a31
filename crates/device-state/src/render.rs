//! HTML device overview.

use std::fmt::Write;

use crate::snapshot::DeviceStateSnapshot;

const HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>HmIP devices</title>
<style>
body { font-family: Arial, sans-serif; margin: 40px; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ccc; padding: 8px; text-align: left; }
th { background-color: #f2f2f2; }
</style>
</head>
<body>
<h1>HmIP device overview</h1>
"#;

const TAIL: &str = "</body>\n</html>\n";

/// Renders the device table for `snapshot`, or a placeholder page when the
/// hub has not sent its state yet.
pub fn device_table(snapshot: Option<&DeviceStateSnapshot>) -> String {
    let mut html = String::from(HEAD);
    match snapshot {
        None => html.push_str("<p>No device state received from the hub yet.</p>\n"),
        Some(snap) => {
            let _ = writeln!(
                html,
                "<p>{} devices, received {}</p>",
                snap.device_count(),
                snap.received_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            html.push_str(
                "<table>\n<thead>\n<tr><th>Device ID</th><th>Label</th><th>Type</th></tr>\n</thead>\n<tbody>\n",
            );
            for dev in snap.summaries() {
                let _ = writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(&dev.id),
                    escape(&dev.label),
                    escape(&dev.device_type)
                );
            }
            html.push_str("</tbody>\n</table>\n");
        }
    }
    html.push_str(TAIL);
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
