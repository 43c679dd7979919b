use std::{
    collections::BTreeMap,
    io::{self, IsTerminal, Write},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use gh_fleet::{BatchReport, ForgeError, ScanItem, Selection};

const TABLE_HEADERS: &[&str] = &["URL", "AUTHOR", "CREATED", "LABELS", "TITLE"];
const TITLE_COLUMN_INDEX: usize = TABLE_HEADERS.len() - 1;
const COLUMN_SEPARATOR: &str = "  ";
const TITLE_TRUNCATION_SUFFIX: &str = "...";
const MIN_TITLE_WIDTH_FOR_TRUNCATION: usize = 3;

fn format_relative_time(time: DateTime<Utc>) -> String {
    use chrono_humanize::HumanTime;
    HumanTime::from(time).to_string()
}

fn get_terminal_width(width_override: Option<usize>) -> usize {
    if let Some(width) = width_override {
        width
    } else if io::stdout().is_terminal() {
        terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(usize::MAX)
    } else {
        usize::MAX
    }
}

fn item_to_table_row(scanned: &ScanItem) -> Vec<String> {
    let item = &scanned.item;
    vec![
        item.url().to_string(),
        item.author().to_string(),
        format_relative_time(item.created_at()),
        item.labels().join(","),
        item.title().to_string(),
    ]
}

fn width_of(cell: &str) -> usize {
    cell.chars().count()
}

fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| width_of(h)).collect();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(width_of(cell));
            }
        }
    }

    widths
}

fn apply_title_truncation(rows: &mut [Vec<String>], widths: &mut [usize], terminal_width: usize) {
    if terminal_width == usize::MAX {
        return;
    }

    let separator_width = COLUMN_SEPARATOR.len() * (widths.len() - 1);
    let non_title_width: usize =
        widths[..TITLE_COLUMN_INDEX].iter().sum::<usize>() + separator_width;

    if non_title_width >= terminal_width {
        return;
    }

    let available = terminal_width - non_title_width;
    if widths[TITLE_COLUMN_INDEX] <= available || available <= MIN_TITLE_WIDTH_FOR_TRUNCATION {
        return;
    }

    widths[TITLE_COLUMN_INDEX] = available;
    let keep = available - TITLE_TRUNCATION_SUFFIX.len();
    for row in rows {
        if let Some(title) = row.get_mut(TITLE_COLUMN_INDEX)
            && width_of(title) > available
        {
            let truncated: String = title.chars().take(keep).collect();
            *title = format!("{truncated}{TITLE_TRUNCATION_SUFFIX}");
        }
    }
}

fn render_row<W: Write, S: AsRef<str>>(
    cells: &[S],
    widths: &[usize],
    writer: &mut W,
) -> Result<()> {
    let last = cells.len().saturating_sub(1);
    for (i, cell) in cells.iter().enumerate() {
        if i == last {
            // No padding after the final column.
            write!(writer, "{}", cell.as_ref())?;
        } else {
            write!(writer, "{:<width$}{COLUMN_SEPARATOR}", cell.as_ref(), width = widths[i])?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

fn display_items_table_with_width<W: Write>(
    items: &[ScanItem],
    writer: &mut W,
    width_override: Option<usize>,
) -> Result<()> {
    let terminal_width = get_terminal_width(width_override);
    let mut rows: Vec<Vec<String>> = items.iter().map(item_to_table_row).collect();
    let mut widths = calculate_column_widths(TABLE_HEADERS, &rows);

    apply_title_truncation(&mut rows, &mut widths, terminal_width);

    render_row(TABLE_HEADERS, &widths, writer)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    render_row(&rule, &widths, writer)?;
    for row in &rows {
        render_row(row, &widths, writer)?;
    }

    Ok(())
}

fn display_scan_errors<W: Write>(
    errors: &BTreeMap<String, ForgeError>,
    writer: &mut W,
) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    writeln!(writer)?;
    writeln!(
        writer,
        "{}",
        format!("Failed to scan {} repositories:", errors.len()).red()
    )?;
    for (repo, error) in errors {
        writeln!(writer, "  {repo}: {error}")?;
    }
    Ok(())
}

/// Prints a listing: the table, then any repositories that could not be
/// scanned.
pub fn display_selection<W: Write>(selection: &Selection, writer: &mut W) -> Result<()> {
    if selection.items.is_empty() {
        writeln!(writer, "No matching items.")?;
    } else {
        display_items_table_with_width(&selection.items, writer, None)?;
    }
    display_scan_errors(&selection.scan_errors, writer)
}

/// Prints what a mutating command would act on.
pub fn display_dry_run<W: Write>(
    action: &str,
    selection: &Selection,
    writer: &mut W,
) -> Result<()> {
    writeln!(
        writer,
        "Would {action} {} items (dry run):",
        selection.items.len()
    )?;
    display_selection(selection, writer)
}

pub fn display_report<W: Write>(report: &BatchReport, writer: &mut W) -> Result<()> {
    let text = report.to_string();
    let mut lines = text.lines();
    if let Some(summary) = lines.next() {
        if report.failed.is_empty() {
            writeln!(writer, "{}", summary.green())?;
        } else {
            writeln!(writer, "{}", summary.red())?;
        }
    }
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    Ok(())
}
