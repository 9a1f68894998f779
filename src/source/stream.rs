use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split, Stdin};

use super::QuoteSource;

/// Newline-delimited JSON quotes read from any async reader. Lines are handed
/// on as raw bytes, so a line that is not valid UTF-8 is rejected by the
/// decoder like any other malformed quote instead of ending the stream.
pub struct JsonLinesSource<R> {
    name: String,
    lines: Split<R>,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            lines: reader.split(b'\n'),
        }
    }
}

impl JsonLinesSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> QuoteSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_payload(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let segment = self
                .lines
                .next_segment()
                .await
                .map_err(|e| anyhow!("Failed to read from {}: {}", self.name, e))?;

            match segment {
                Some(mut line) => {
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Ok(Some(line));
                }
                None => return Ok(None),
            }
        }
    }
}
