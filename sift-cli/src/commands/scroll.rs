use anyhow::Result;
use serde_json::Value;
use sift::{Client, Error};
use std::io::{self, Write};

/// Stream matching documents to stdout as JSON lines
pub async fn run_scroll(
    client: &Client,
    index: &str,
    doc_type: Option<&str>,
    query: Option<Value>,
    size: usize,
    keep_alive: &str,
    whole_hits: bool,
) -> Result<()> {
    let mut service = client
        .scroll(index.split(',').filter(|s| !s.is_empty()))
        .size(size)
        .keep_alive(keep_alive)
        .release_on_drop(true);
    if let Some(doc_type) = doc_type {
        service = service.types(doc_type.split(',').filter(|s| !s.is_empty()));
    }
    if let Some(query) = query {
        service = service.query(query);
    }

    let mut cursor = service.open().await?;
    tracing::info!("Scrolling over {} hits", cursor.total_hits());

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut written = 0usize;

    loop {
        let page = match cursor.next().await {
            Ok(page) => page,
            Err(Error::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        };
        for hit in page.page() {
            if whole_hits {
                serde_json::to_writer(&mut out, hit)?;
            } else {
                serde_json::to_writer(&mut out, hit.source.as_ref().unwrap_or(&Value::Null))?;
            }
            out.write_all(b"\n")?;
            written += 1;
        }
    }
    out.flush()?;
    cursor.clear().await?;

    tracing::info!("Wrote {} documents", written);
    Ok(())
}
