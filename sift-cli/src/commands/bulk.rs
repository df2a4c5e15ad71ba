//! Bulk-index JSONL documents.

use anyhow::{Context, Result};
use serde_json::Value;
use sift::{BulkIndexRequest, BulkService, Client};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

/// Source for documents to index
pub enum DocumentSource {
    FromFile(PathBuf),
    FromStdin,
}

impl DocumentSource {
    pub fn reader(&self) -> io::Result<Box<dyn BufRead + Send>> {
        match self {
            DocumentSource::FromFile(path) => {
                let file = File::open(path)?;
                Ok(Box::new(BufReader::new(file)))
            }
            DocumentSource::FromStdin => Ok(Box::new(BufReader::new(io::stdin()))),
        }
    }
}

#[derive(Default)]
struct Totals {
    submitted: usize,
    failed: usize,
    batches: usize,
}

/// Run bulk command
pub async fn run_bulk(
    client: &Client,
    index: &str,
    doc_type: &str,
    source: DocumentSource,
    id_field: Option<&str>,
    batch_size: usize,
    refresh: bool,
) -> Result<()> {
    let batch_size = batch_size.max(1);
    let started = Instant::now();
    let reader = source.reader()?;

    let mut bulk = client.bulk().index(index).doc_type(doc_type);
    if refresh {
        bulk = bulk.refresh(true);
    }

    let mut totals = Totals::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Value = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON on line {}", line_no + 1))?;

        let mut request = BulkIndexRequest::new();
        if let Some(id) = id_field.and_then(|field| document_id(&doc, field)) {
            request = request.id(id);
        }
        bulk.add(request.doc(doc));

        if bulk.number_of_actions() >= batch_size {
            flush(&mut bulk, &mut totals).await?;
        }
    }
    if bulk.number_of_actions() > 0 {
        flush(&mut bulk, &mut totals).await?;
    }

    eprintln!(
        "Indexed {} documents in {} batches ({} failed) in {:.2}s",
        totals.submitted - totals.failed,
        totals.batches,
        totals.failed,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn flush(bulk: &mut BulkService, totals: &mut Totals) -> Result<()> {
    let actions = bulk.number_of_actions();
    let response = bulk.submit().await.context("Bulk request failed")?;

    for item in response.failed() {
        tracing::warn!(
            "Document {} failed with status {}: {}",
            item.id,
            item.status,
            item.error_reason().unwrap_or_default()
        );
    }
    totals.submitted += actions;
    totals.failed += response.failed().len();
    totals.batches += 1;
    Ok(())
}

/// String form of the id field; numbers are accepted too
fn document_id(doc: &Value, field: &str) -> Option<String> {
    match doc.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id() {
        let doc = json!({"id": "a1", "n": 7, "obj": {}});
        assert_eq!(document_id(&doc, "id").as_deref(), Some("a1"));
        assert_eq!(document_id(&doc, "n").as_deref(), Some("7"));
        assert_eq!(document_id(&doc, "obj"), None);
        assert_eq!(document_id(&doc, "missing"), None);
    }
}
