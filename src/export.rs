use crate::models::Record;

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// CSV with a `date,value,delta,note` header, every field quoted, rows in the
/// order given (callers pass records newest first).
pub fn records_to_csv<'a>(records: impl IntoIterator<Item = &'a Record>) -> String {
    let mut out = String::from("\"date\",\"value\",\"delta\",\"note\"\n");
    for record in records {
        let row = [
            quote(&record.date.to_string()),
            quote(&record.value.to_string()),
            quote(&record.delta.to_string()),
            quote(&record.note),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}
