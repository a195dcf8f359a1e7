use std::path::{Path, PathBuf};

use tracing::debug;

/// How many matching lines a search reports at most.
const MAX_MATCHES: usize = 10;

/// Line-oriented scan over the workspace memory document.
///
/// The document has no schema beyond "UTF-8 lines"; an absent file is a
/// normal outcome, not an error.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace_dir: &Path) -> Self {
        Self {
            path: workspace_dir.join("memory.md"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn search(&self, query: &str) -> anyhow::Result<String> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "memory file absent");
                return Ok(format!(
                    "Memory file not found at {}",
                    self.path.display()
                ));
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read {}: {e}",
                    self.path.display()
                ));
            }
        };

        Ok(Self::scan(&text, query))
    }

    /// Case-insensitive substring match, original file order preserved.
    fn scan(text: &str, query: &str) -> String {
        let needle = query.to_lowercase();
        let matches: Vec<&str> = text
            .lines()
            .filter(|line| line.to_lowercase().contains(&needle))
            .collect();

        if matches.is_empty() {
            return format!("No matches for \"{query}\" in memory");
        }

        let shown = matches
            .iter()
            .take(MAX_MATCHES)
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        format!("{} match(es) for \"{query}\":\n{shown}", matches.len())
    }
}
