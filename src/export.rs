use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::{Map, Value};

const SEP: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Csv,
    Jsonl,
}

/// Write a header plus `rows` to `path`, creating parent directories.
pub fn write_table(
    path: &Path,
    columns: &[&str],
    rows: &[Vec<String>],
    format: Format,
) -> Result<usize> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }
    let file = File::create(path).with_context(|| format!("cannot write {}", path.display()))?;
    let mut w = BufWriter::new(file);
    match format {
        Format::Csv => write_csv(&mut w, columns, rows)?,
        Format::Jsonl => write_jsonl(&mut w, columns, rows)?,
    }
    w.flush()?;
    Ok(rows.len())
}

pub fn write_csv<W: Write>(mut w: W, columns: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
    let header: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    write_row(&mut w, &header, SEP)?;
    for row in rows {
        write_row(&mut w, row, SEP)?;
    }
    Ok(())
}

/// One JSON object per line, keys in column order, every value a string.
pub fn write_jsonl<W: Write>(mut w: W, columns: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
    for row in rows {
        let object: Map<String, Value> = columns
            .iter()
            .zip(row)
            .map(|(c, v)| (c.to_string(), Value::String(v.clone())))
            .collect();
        serde_json::to_writer(&mut w, &Value::Object(object))?;
        writeln!(w)?;
    }
    Ok(())
}

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(mut w: W, row: &[String], sep: char) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, "{}", sep)?;
        } else {
            first = false;
        }
        if needs_quotes(cell, sep) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}
