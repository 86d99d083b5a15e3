use anyhow::Context;
use grader_apis::Submission;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

/// Single-pass reader of `name,sourceUrl` lines.
pub struct Roster<R> {
    lines: Lines<BufReader<R>>,
    line_no: usize,
}

impl Roster<tokio::fs::File> {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open roster {}", path.display()))?;
        Ok(Roster::from_reader(file))
    }
}

impl<R: AsyncRead + Unpin> Roster<R> {
    pub fn from_reader(reader: R) -> Self {
        Roster {
            lines: BufReader::new(reader).lines(),
            line_no: 0,
        }
    }

    /// Next valid submission. Malformed lines are logged and skipped.
    pub async fn next(&mut self) -> anyhow::Result<Option<Submission>> {
        loop {
            let line = match self
                .lines
                .next_line()
                .await
                .context("failed to read roster")?
            {
                Some(l) => l,
                None => return Ok(None),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(sub) => return Ok(Some(sub)),
                None => {
                    tracing::warn!(line = self.line_no, "skipping malformed roster line");
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<Submission> {
    let comma = line.find(',')?;
    let name = line[..comma].trim();
    let url = line[comma + 1..].trim();
    if name.is_empty() || url.is_empty() {
        return None;
    }
    Some(Submission::new(name, url))
}
