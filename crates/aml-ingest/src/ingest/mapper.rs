//! CSV sheet to staged-row mapping.
//!
//! A sheet is checked against the template sheet of the same name (column
//! count, then column names by position) before any row is mapped.

use tracing::debug;

use crate::error::{IngestError, Result};
use crate::models::{
    BusinessKey, CellValue, EntryKind, ErrorStatus, Fields, NewStagedRow, QuestionBody,
};

pub const LIST_SEPARATOR: char = '#';

const LIST_COLUMNS: &[&str] = &["L2_skill", "L3_skill"];
const SUB_SKILL_PREFIX: &str = "sub_skill";
const NUMERIC_COLUMNS: &[&str] = &["sequence", "benchmark_time"];
const L1_SKILL_COLUMN: &str = "L1_skill";
const QUESTION_TYPE_COLUMN: &str = "question_type";

const QUESTION_ID_COLUMNS: &[&str] = &["QID", "question_id"];
const QUESTION_SET_ID_COLUMNS: &[&str] = &["question_set_id", "QSID"];
const CONTENT_ID_COLUMNS: &[&str] = &["content_id", "CID"];

/// A parsed CSV sheet: header plus non-empty data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTable {
    pub header: Vec<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    /// 1-based position among the non-blank data rows of the file.
    pub index: i32,
    pub cells: Vec<String>,
}

/// Cells of one row after the column transforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRow {
    pub row_index: i32,
    pub fields: Fields,
    pub body: Fields,
    pub media_names: Vec<String>,
}

pub fn clean_column(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_list_column(column: &str) -> bool {
    LIST_COLUMNS.contains(&column) || column.starts_with(SUB_SKILL_PREFIX)
}

fn is_media_column(column: &str) -> bool {
    column.to_lowercase().contains("media")
}

fn is_body_column(column: &str) -> bool {
    let lower = column.to_lowercase();
    column.starts_with('n') || lower.contains("grid") || lower.contains("fib") || lower.contains("mcq")
}

pub fn parse_table(text: &str) -> Result<SheetTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?.iter().map(clean_column).collect(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(TableRow {
            index: rows.len() as i32 + 1,
            cells: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(SheetTable { header, rows })
}

pub fn check_header(sheet_name: &str, header: &[String], template: &[String]) -> Result<()> {
    if header.len() != template.len() {
        return Err(IngestError::rejected(
            ErrorStatus::InvalidHeaderLength,
            format!(
                "Header length mismatch in {}: expected {} columns, found {}",
                sheet_name,
                template.len(),
                header.len()
            ),
        ));
    }

    for (position, (column, expected)) in header.iter().zip(template).enumerate() {
        if clean_column(column) != clean_column(expected) {
            return Err(IngestError::rejected(
                ErrorStatus::InvalidColumnName,
                format!(
                    "Column {} of {} is '{}', expected '{}'",
                    position + 1,
                    sheet_name,
                    column,
                    expected
                ),
            ));
        }
    }

    Ok(())
}

/// Apply the column transforms to one row.
///
/// Body columns are split out only for question sheets.
pub fn map_row(kind: EntryKind, header: &[String], row: &TableRow) -> Result<MappedRow> {
    let mut mapped = MappedRow {
        row_index: row.index,
        ..MappedRow::default()
    };

    for (position, column) in header.iter().enumerate() {
        let raw = row.cells.get(position).map(|cell| cell.trim()).unwrap_or("");

        if NUMERIC_COLUMNS.contains(&column.as_str())
            && !raw.is_empty()
            && raw.parse::<i32>().is_err()
        {
            return Err(IngestError::rejected(
                ErrorStatus::InvalidData,
                format!(
                    "Row {}: {} must be a whole number, found '{}'",
                    row.index, column, raw
                ),
            ));
        }

        let value = if is_list_column(column) || raw.contains(LIST_SEPARATOR) {
            CellValue::List(split_list(raw))
        } else {
            CellValue::text(raw)
        };

        if is_media_column(column) {
            mapped.media_names.extend(value.to_list());
            continue;
        }

        if kind == EntryKind::Question && is_body_column(column) {
            mapped.body.insert(column.clone(), value);
        } else {
            mapped.fields.insert(column.clone(), value);
        }
    }

    Ok(mapped)
}

fn take_text(fields: &mut Fields, aliases: &[&str]) -> Option<String> {
    let mut found = None;
    for alias in aliases {
        if let Some(value) = fields.remove(*alias) {
            let text = value.to_list().join(&LIST_SEPARATOR.to_string());
            if found.is_none() && !text.is_empty() {
                found = Some(text);
            }
        }
    }
    found
}

/// Turn a mapped row into a staging row of `kind`.
pub fn into_staged(kind: EntryKind, process_id: &str, mut row: MappedRow) -> NewStagedRow {
    let key = match kind {
        EntryKind::Question => BusinessKey::Question {
            question_id: take_text(&mut row.fields, QUESTION_ID_COLUMNS).unwrap_or_default(),
            question_set_id: take_text(&mut row.fields, QUESTION_SET_ID_COLUMNS),
        },
        EntryKind::QuestionSet => BusinessKey::QuestionSet {
            question_set_id: take_text(&mut row.fields, QUESTION_SET_ID_COLUMNS).unwrap_or_default(),
        },
        EntryKind::Content => BusinessKey::Content {
            content_id: take_text(&mut row.fields, CONTENT_ID_COLUMNS).unwrap_or_default(),
        },
    };

    let l1_skill = take_text(&mut row.fields, &[L1_SKILL_COLUMN]);
    let question_type = row
        .fields
        .get(QUESTION_TYPE_COLUMN)
        .and_then(CellValue::as_text)
        .map(str::to_string);

    let body = match kind {
        EntryKind::Question => QuestionBody::new(question_type.as_deref(), l1_skill.as_deref(), row.body),
        EntryKind::QuestionSet | EntryKind::Content => QuestionBody::Untyped {
            question_type: None,
            fields: row.body,
        },
    };

    NewStagedRow {
        process_id: process_id.to_string(),
        row_index: row.row_index,
        key,
        l1_skill,
        fields: row.fields,
        body,
        media_names: row.media_names,
    }
}

/// Map a whole sheet after checking it against its template.
pub fn map_sheet(
    kind: EntryKind,
    process_id: &str,
    sheet_name: &str,
    data: &str,
    template: &str,
) -> Result<Vec<NewStagedRow>> {
    let table = parse_table(data)?;
    let template = parse_table(template)?;
    check_header(sheet_name, &table.header, &template.header)?;

    let rows = table
        .rows
        .iter()
        .map(|row| map_row(kind, &table.header, row).map(|mapped| into_staged(kind, process_id, mapped)))
        .collect::<Result<Vec<_>>>()?;

    debug!(sheet = %sheet_name, kind = %kind, rows = rows.len(), "Mapped sheet rows");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArithmeticSkill, Requirement};

    const QUESTION_HEADER: &str =
        "QID,question_set_id,question_type,L1_skill,L2_skill,sub_skill_carry,n1,n2,grid1_pre_fills_top,media_file_1,sequence";

    fn sheet(rows: &[&str]) -> String {
        let mut text = QUESTION_HEADER.to_string();
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text.push('\n');
        text
    }

    #[test]
    fn test_header_length_mismatch() {
        let err = map_sheet(EntryKind::Question, "p1", "questions.csv", "QID,n1\nq1,2\n", QUESTION_HEADER)
            .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::InvalidHeaderLength);
    }

    #[test]
    fn test_column_name_mismatch() {
        let err = check_header(
            "questions.csv",
            &["QID".into(), "n_1".into()],
            &["QID".into(), "n1".into()],
        )
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::InvalidColumnName);
        assert!(err.to_string().contains("Column 2"));
    }

    #[test]
    fn test_header_cells_are_trimmed() {
        let table = parse_table("\u{feff} QID , n1\nq1,2\n").unwrap();
        assert_eq!(table.header, vec!["QID", "n1"]);
    }

    #[test]
    fn test_blank_rows_are_dropped() {
        let table = parse_table("QID,n1\n,\nq1,3\n,\nq2,4\n").unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].index, 1, "rows are numbered after blank rows are dropped");
        assert_eq!(table.rows[1].index, 2);
    }

    #[test]
    fn test_question_row_mapping() {
        let data = sheet(&["q1,s1,Grid-1,Addition,L2a#L2b,carry,12,34,1#0,q1.png#q1_hint.png,3"]);
        let rows = map_sheet(EntryKind::Question, "p1", "questions.csv", &data, QUESTION_HEADER).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.row_index, 1);
        assert_eq!(
            row.key,
            BusinessKey::Question {
                question_id: "q1".into(),
                question_set_id: Some("s1".into()),
            }
        );
        assert_eq!(row.l1_skill.as_deref(), Some("Addition"));
        assert_eq!(row.fields["L2_skill"], CellValue::List(vec!["L2a".into(), "L2b".into()]));
        assert_eq!(row.fields["sub_skill_carry"], CellValue::List(vec!["carry".into()]));
        assert_eq!(row.media_names, vec!["q1.png", "q1_hint.png"]);
        assert!(!row.fields.contains_key("media_file_1"));

        assert_eq!(row.body.requirement(), Some(Requirement::Grid1(ArithmeticSkill::Add)));
        assert_eq!(row.body.fields()["n1"], CellValue::text("12"));
        assert_eq!(
            row.body.fields()["grid1_pre_fills_top"],
            CellValue::List(vec!["1".into(), "0".into()])
        );
        assert!(!row.fields.contains_key("n1"));
    }

    #[test]
    fn test_short_rows_fill_missing_cells_with_blanks() {
        let data = sheet(&["q2,s1,mcq"]);
        let rows = map_sheet(EntryKind::Question, "p1", "questions.csv", &data, QUESTION_HEADER).unwrap();
        assert_eq!(rows[0].body.fields()["n1"], CellValue::text(""));
        assert!(rows[0].media_names.is_empty());
    }

    #[test]
    fn test_non_numeric_sequence_is_invalid_data() {
        let data = sheet(&["q1,s1,Grid-2,Addition,,,1,2,,,first"]);
        let err = map_sheet(EntryKind::Question, "p1", "questions.csv", &data, QUESTION_HEADER).unwrap_err();
        assert_eq!(err.status(), ErrorStatus::InvalidData);
        assert!(err.to_string().contains("Row 1"));
    }

    #[test]
    fn test_content_rows_keep_flat_fields() {
        let header = "content_id,L1_skill,name,media";
        let rows = map_sheet(
            EntryKind::Content,
            "p1",
            "contents.csv",
            "content_id,L1_skill,name,media\nc1,Division,Intro,intro.mp4\n",
            header,
        )
        .unwrap();

        let row = &rows[0];
        assert_eq!(row.key, BusinessKey::Content { content_id: "c1".into() });
        assert_eq!(row.fields["name"], CellValue::text("Intro"));
        assert!(row.body.fields().is_empty());
        assert_eq!(row.media_names, vec!["intro.mp4"]);
    }
}
