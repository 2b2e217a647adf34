// Turn command-line references into entities.
//
// Documents and columns are named by id or (case-insensitive) name; rows by
// id or by their 1-based position in store order.

use griddoc_common::{Column, Document, Row};
use griddoc_editor::admin::list_documents;
use griddoc_editor::EditorError;
use griddoc_store::Store;
use uuid::Uuid;

use crate::exit_code::{LookupError, UsageError};

pub async fn document<S: Store>(store: &S, key: &str) -> anyhow::Result<Document> {
    if let Ok(id) = Uuid::parse_str(key.trim()) {
        return store
            .fetch_document(id)
            .await
            .map_err(EditorError::Read)?
            .ok_or_else(|| EditorError::DocumentNotFound(id).into());
    }
    let documents = list_documents(store).await?;
    in_list(&documents, key).cloned()
}

/// Find a document in an already-loaded list.
pub fn in_list<'a>(documents: &'a [Document], key: &str) -> anyhow::Result<&'a Document> {
    let key = key.trim();
    if let Ok(id) = Uuid::parse_str(key) {
        return documents
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| EditorError::DocumentNotFound(id).into());
    }
    let mut matches = documents.iter().filter(|d| d.name.eq_ignore_ascii_case(key));
    match (matches.next(), matches.next()) {
        (Some(document), None) => Ok(document),
        (Some(_), Some(_)) => Err(UsageError(format!(
            "more than one document is named `{key}`; use its id instead"
        ))
        .into()),
        (None, _) => Err(LookupError(format!("no document named `{key}`")).into()),
    }
}

pub fn column<'a, I>(columns: I, key: &str) -> anyhow::Result<&'a Column>
where
    I: IntoIterator<Item = &'a Column>,
{
    let key = key.trim();
    let id = Uuid::parse_str(key).ok();
    let mut matches = columns
        .into_iter()
        .filter(|c| Some(c.id) == id || c.label.eq_ignore_ascii_case(key));
    match (matches.next(), matches.next()) {
        (Some(column), None) => Ok(column),
        (Some(_), Some(_)) => Err(UsageError(format!(
            "more than one column is labelled `{key}`; use its id instead"
        ))
        .into()),
        (None, _) => Err(LookupError(format!("no column named `{key}`")).into()),
    }
}

pub fn row<'a>(rows: &'a [Row], key: &str) -> anyhow::Result<&'a Row> {
    let key = key.trim();
    if let Ok(id) = Uuid::parse_str(key) {
        return rows
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| LookupError(format!("no row with id {id}")).into());
    }
    let position: usize = key
        .trim_start_matches('#')
        .parse()
        .map_err(|_| UsageError(format!("`{key}` is neither a row id nor a row number")))?;
    position.checked_sub(1).and_then(|i| rows.get(i)).ok_or_else(|| {
        LookupError(format!("no row {position} (document has {})", rows.len())).into()
    })
}

#[cfg(test)]
mod tests {
    use griddoc_common::DataType;

    use super::*;
    use crate::exit_code::ExitCode;

    #[test]
    fn documents_resolve_by_name_or_id() {
        let a = Document::new("Stock", None);
        let b = Document::new("Orders", None);
        let documents = vec![a.clone(), b.clone()];

        assert_eq!(in_list(&documents, "stock").unwrap().id, a.id);
        assert_eq!(in_list(&documents, &b.id.to_string()).unwrap().id, b.id);

        let err = in_list(&documents, "Invoices").unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let documents = vec![Document::new("Stock", None), Document::new("stock", None)];
        let err = in_list(&documents, "Stock").unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[test]
    fn columns_resolve_by_label() {
        let doc = Uuid::new_v4();
        let columns = vec![
            Column::new(doc, "Name", DataType::Text, 0),
            Column::new(doc, "Qty", DataType::Number, 1),
        ];
        assert_eq!(column(&columns, "qty").unwrap().id, columns[1].id);
        assert_eq!(column(&columns, &columns[0].id.to_string()).unwrap().label, "Name");
        assert!(column(&columns, "Price").is_err());
    }

    #[test]
    fn rows_resolve_by_position() {
        let doc = Uuid::new_v4();
        let rows = vec![Row::new(doc, 0, None), Row::new(doc, 1, None)];
        assert_eq!(row(&rows, "1").unwrap().id, rows[0].id);
        assert_eq!(row(&rows, "#2").unwrap().id, rows[1].id);
        assert_eq!(row(&rows, &rows[1].id.to_string()).unwrap().id, rows[1].id);

        let err = row(&rows, "3").unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
        let err = row(&rows, "0").unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
        let err = row(&rows, "first").unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }
}
