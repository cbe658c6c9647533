use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

/// One column's worth of values, in schema order. `Opt*` columns must be
/// declared OPTIONAL in the schema, the rest REQUIRED.
#[derive(Debug, Clone)]
pub enum Column {
    Int64(Vec<i64>),
    Int32(Vec<i32>),
    Double(Vec<f64>),
    Text(Vec<String>),
    OptInt64(Vec<Option<i64>>),
    OptText(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Double(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::OptInt64(v) => v.len(),
            Column::OptText(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writes `columns` as a single row group. An empty table produces a valid file
/// with no row groups.
pub fn write_table(path: &Path, schema: &str, columns: Vec<Column>) -> Result<()> {
    let rows = columns.first().map_or(0, Column::len);
    if let Some(bad) = columns.iter().position(|c| c.len() != rows) {
        return Err(anyhow!(
            "column {bad} has {} values, expected {rows}",
            columns[bad].len()
        ));
    }

    let schema = Arc::new(parse_message_type(schema).context("parse parquet schema")?);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let props = Arc::new(WriterProperties::builder().build());
    let mut writer =
        SerializedFileWriter::new(file, schema, props).context("open parquet writer")?;

    if rows > 0 {
        let mut row_group = writer.next_row_group().context("start row group")?;
        let mut values = columns.into_iter();
        let mut idx = 0usize;
        while let Some(mut col_writer) = row_group.next_column().context("next column")? {
            let column = values
                .next()
                .ok_or_else(|| anyhow!("schema has more columns than data ({idx})"))?;
            write_column(col_writer.untyped(), column)
                .with_context(|| format!("write column {idx}"))?;
            col_writer.close().context("close column")?;
            idx += 1;
        }
        if values.next().is_some() {
            return Err(anyhow!("data has more columns than schema ({idx})"));
        }
        row_group.close().context("close row group")?;
    }

    writer.close().context("finish parquet file")?;
    Ok(())
}

fn write_column(writer: &mut ColumnWriter<'_>, column: Column) -> Result<()> {
    match (writer, column) {
        (ColumnWriter::Int64ColumnWriter(w), Column::Int64(values)) => {
            w.write_batch(&values, None, None)?;
        }
        (ColumnWriter::Int32ColumnWriter(w), Column::Int32(values)) => {
            w.write_batch(&values, None, None)?;
        }
        (ColumnWriter::DoubleColumnWriter(w), Column::Double(values)) => {
            w.write_batch(&values, None, None)?;
        }
        (ColumnWriter::ByteArrayColumnWriter(w), Column::Text(values)) => {
            let bytes: Vec<ByteArray> = values.iter().map(|s| ByteArray::from(s.as_str())).collect();
            w.write_batch(&bytes, None, None)?;
        }
        (ColumnWriter::Int64ColumnWriter(w), Column::OptInt64(values)) => {
            let defs = definition_levels(&values);
            let present: Vec<i64> = values.into_iter().flatten().collect();
            w.write_batch(&present, Some(&defs), None)?;
        }
        (ColumnWriter::ByteArrayColumnWriter(w), Column::OptText(values)) => {
            let defs = definition_levels(&values);
            let present: Vec<ByteArray> = values
                .iter()
                .flatten()
                .map(|s| ByteArray::from(s.as_str()))
                .collect();
            w.write_batch(&present, Some(&defs), None)?;
        }
        (_, column) => {
            return Err(anyhow!(
                "column data {} does not match the schema type",
                column_kind(&column)
            ));
        }
    }
    Ok(())
}

fn definition_levels<T>(values: &[Option<T>]) -> Vec<i16> {
    values.iter().map(|v| i16::from(v.is_some())).collect()
}

fn column_kind(column: &Column) -> &'static str {
    match column {
        Column::Int64(_) => "int64",
        Column::Int32(_) => "int32",
        Column::Double(_) => "double",
        Column::Text(_) => "text",
        Column::OptInt64(_) => "optional int64",
        Column::OptText(_) => "optional text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use parquet::record::RowAccessor;

    const SCHEMA: &str = "
        message t {
            REQUIRED INT64 id;
            OPTIONAL BYTE_ARRAY name (UTF8);
        }
    ";

    #[test]
    fn optional_values_read_back_as_nulls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.parquet");
        write_table(
            &path,
            SCHEMA,
            vec![
                Column::Int64(vec![1, 2]),
                Column::OptText(vec![Some("a".to_string()), None]),
            ],
        )
        .expect("write");

        let reader = SerializedFileReader::new(fs::File::open(&path).expect("open")).expect("reader");
        let rows: Vec<_> = reader
            .get_row_iter(None)
            .expect("rows")
            .map(|r| r.expect("row"))
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_long(0).expect("id"), 1);
        assert_eq!(rows[0].get_string(1).expect("name"), "a");
        assert!(rows[1].get_string(1).is_err());
    }

    #[test]
    fn mismatched_column_lengths_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = write_table(
            &dir.path().join("bad.parquet"),
            SCHEMA,
            vec![Column::Int64(vec![1, 2]), Column::OptText(vec![None])],
        )
        .expect_err("lengths differ");
        assert!(err.to_string().contains("expected 2"));
    }
}
