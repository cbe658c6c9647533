use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::columnar::{Column, write_table};
use crate::features::{PLAYER_STAT_COLUMNS, PlayerStatsRow, STAT_COUNT};

pub const DEFAULT_STATS_PATH: &str = "player_stats.parquet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFormat {
    Parquet,
    Xlsx,
}

impl StatsFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "parquet" => Ok(StatsFormat::Parquet),
            "xlsx" => Ok(StatsFormat::Xlsx),
            _ => Err(anyhow!(
                "unsupported stats output {}: use .parquet or .xlsx",
                path.display()
            )),
        }
    }
}

pub fn export_player_stats(path: &Path, rows: &[PlayerStatsRow]) -> Result<StatsFormat> {
    let format = StatsFormat::from_path(path)?;
    match format {
        StatsFormat::Parquet => write_parquet(path, rows)?,
        StatsFormat::Xlsx => write_xlsx(path, rows)?,
    }
    Ok(format)
}

fn stats_schema() -> String {
    let mut schema = String::from(
        "message player_stats {\n  REQUIRED INT64 player_id;\n  REQUIRED BYTE_ARRAY player_name (UTF8);\n",
    );
    for column in PLAYER_STAT_COLUMNS {
        schema.push_str(&format!("  REQUIRED DOUBLE {};\n", column.key));
    }
    schema.push('}');
    schema
}

fn write_parquet(path: &Path, rows: &[PlayerStatsRow]) -> Result<()> {
    let mut stat_values: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); STAT_COUNT];
    for row in rows {
        for (slot, value) in stat_values.iter_mut().zip(row.values()) {
            slot.push(value);
        }
    }

    let mut columns = Vec::with_capacity(STAT_COUNT + 2);
    columns.push(Column::Int64(rows.iter().map(|r| r.player_id as i64).collect()));
    columns.push(Column::Text(rows.iter().map(|r| r.player_name.clone()).collect()));
    columns.extend(stat_values.into_iter().map(Column::Double));

    write_table(path, &stats_schema(), columns)
        .with_context(|| format!("write player stats {}", path.display()))
}

fn write_xlsx(path: &Path, rows: &[PlayerStatsRow]) -> Result<()> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("PlayerStats")?;
        write_header(sheet)?;
        write_stat_rows(sheet, rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("save {}", path.display()))?;
    Ok(())
}

fn write_header(worksheet: &mut Worksheet) -> Result<()> {
    let labels = ["Player Id", "Player Name"]
        .into_iter()
        .chain(PLAYER_STAT_COLUMNS.iter().map(|c| c.label));
    for (col_idx, label) in labels.enumerate() {
        worksheet
            .write_string(0, col_idx as u16, label)
            .with_context(|| format!("write header ({col_idx})"))?;
    }
    Ok(())
}

fn write_stat_rows(worksheet: &mut Worksheet, rows: &[PlayerStatsRow]) -> Result<()> {
    for (idx, row) in rows.iter().enumerate() {
        let row_idx = idx as u32 + 1;
        worksheet
            .write_number(row_idx, 0, row.player_id as f64)
            .with_context(|| format!("write cell ({row_idx},0)"))?;
        worksheet
            .write_string(row_idx, 1, &row.player_name)
            .with_context(|| format!("write cell ({row_idx},1)"))?;
        for (offset, value) in row.values().into_iter().enumerate() {
            let col_idx = offset as u16 + 2;
            worksheet
                .write_number(row_idx, col_idx, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
