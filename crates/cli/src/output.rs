use anyhow::{Context, Result};
use consensus_ilp::{ConsensusEntry, ConsensusMode, ConsensusOutput, Slot};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;

/// Render a unit's output in the format its mode calls for.
///
/// `limit` only applies to single-layer output; multi-layer output is always
/// complete.
pub fn render(output: &ConsensusOutput, box_size: u32, limit: Option<usize>) -> String {
    match output.mode {
        ConsensusMode::MultiLayer => render_tsv(output),
        ConsensusMode::SingleLayer => render_box(output, box_size, limit),
    }
}

/// Header of layer labels, then one row per entry: `x<TAB>y` per layer
/// (`N/A<TAB>N/A` when absent) followed by the weight.
pub fn render_tsv(output: &ConsensusOutput) -> String {
    let mut out = output.labels.join("\t");
    out.push('\n');
    for entry in &output.entries {
        for slot in &entry.members {
            match slot {
                Slot::Present(member) => {
                    let _ = write!(out, "{}\t{}\t", pixel(member.point.x), pixel(member.point.y));
                }
                Slot::Absent => out.push_str("N/A\tN/A\t"),
            }
        }
        let _ = writeln!(out, "{}", weight(entry));
    }
    out
}

/// Ranked `x<TAB>y<TAB>box<TAB>box<TAB>weight` rows for single-layer output.
pub fn render_box(output: &ConsensusOutput, box_size: u32, limit: Option<usize>) -> String {
    let mut out = String::new();
    for entry in output.ranked(limit).iter() {
        let Some(member) = entry.members.iter().find_map(Slot::as_present) else {
            continue;
        };
        let _ = writeln!(
            out,
            "{}\t{}\t{box_size}\t{box_size}\t{}",
            pixel(member.point.x),
            pixel(member.point.y),
            weight(entry)
        );
    }
    out
}

fn pixel(value: f64) -> i64 {
    value.round_ties_even() as i64
}

fn weight(entry: &ConsensusEntry) -> String {
    format_weight(entry.weight)
}

/// Shortest round-trip form with a signed, two-digit exponent (`1e-05`,
/// `2.5e+20`); plain values keep a decimal point (`5.0`).
fn format_weight(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let repr = format!("{value:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

/// Write via a temporary sibling and rename, so readers never see a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().context("output path has no parent")?;
    let tmp = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("consensus"),
        std::process::id()
    ));

    let written = write_tmp(&tmp, bytes).and_then(|()| {
        std::fs::rename(&tmp, path)
            .with_context(|| format!("rename tmp {} -> {}", tmp.display(), path.display()))
    });
    if written.is_err() && tmp.exists() {
        if let Err(err) = std::fs::remove_file(&tmp) {
            log::warn!("failed to remove {}: {err}", tmp.display());
        }
    }
    written
}

fn write_tmp(tmp: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(tmp).with_context(|| format!("create tmp {}", tmp.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("write tmp {}", tmp.display()))?;
    file.sync_all()
        .with_context(|| format!("sync tmp {}", tmp.display()))?;
    Ok(())
}

/// Append the unit's wall-clock seconds as one line.
pub fn append_runtime(path: &Path, elapsed_secs: f64) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    writeln!(file, "{elapsed_secs}").with_context(|| format!("append {}", path.display()))?;
    Ok(())
}
