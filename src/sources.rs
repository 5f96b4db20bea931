use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{Span, debug, error, warn};

static CHANNEL_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?(?:t|telegram)\.me/(?:(?:joinchat/|\+)(?P<invite>[A-Za-z0-9_-]+)|(?P<name>[A-Za-z0-9_]+))/?$")
        .expect("channel link pattern is valid")
});

/// One line of the source list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEntry {
    /// Public channel addressed by its handle.
    Username(String),
    /// Private channel reachable only through an invite hash.
    Invite(String),
}

impl SourceEntry {
    /// Classifies a trimmed, non-comment line.
    pub fn parse(line: &str) -> Self {
        if let Some(caps) = CHANNEL_LINK.captures(line) {
            if let Some(invite) = caps.name("invite") {
                return Self::Invite(invite.as_str().to_string());
            }
            if let Some(name) = caps.name("name") {
                return Self::Username(name.as_str().to_string());
            }
        }
        Self::Username(line.trim_start_matches('@').to_string())
    }
}

/// Reads the list of source channels. The file is re-read on every call so
/// edits take effect on the next cycle.
pub struct SourceRegistry {
    path: PathBuf,
    span: Span,
}

impl SourceRegistry {
    pub fn new(path: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            path: path.into(),
            span,
        }
    }

    pub async fn list(&self) -> Vec<SourceEntry> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                error!(
                    parent: &self.span,
                    "source list {} not found, create it or check the path",
                    self.path.display()
                );
                String::new()
            }
            Err(err) => {
                warn!(
                    parent: &self.span,
                    "failed to read source list {}: {}",
                    self.path.display(),
                    err
                );
                String::new()
            }
        };

        let entries: Vec<SourceEntry> = parse_lines(&content).collect();
        debug!(
            parent: &self.span,
            "source list {} yielded {} channel(s)",
            self.path.display(),
            entries.len()
        );
        entries
    }
}

fn parse_lines(content: &str) -> impl Iterator<Item = SourceEntry> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(SourceEntry::parse)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;
    use test_case::test_case;
    use tracing::Span;

    use super::{SourceEntry, SourceRegistry};

    #[test_case("memes", SourceEntry::Username("memes".into()) ; "bare name")]
    #[test_case("@memes", SourceEntry::Username("memes".into()) ; "at name")]
    #[test_case("https://t.me/memes", SourceEntry::Username("memes".into()) ; "public link")]
    #[test_case("t.me/memes/", SourceEntry::Username("memes".into()) ; "link without scheme")]
    #[test_case("https://t.me/joinchat/AbC-123", SourceEntry::Invite("AbC-123".into()) ; "joinchat link")]
    #[test_case("https://t.me/+AbC_123", SourceEntry::Invite("AbC_123".into()) ; "plus link")]
    fn classifies_lines(line: &str, expected: SourceEntry) {
        assert_eq!(SourceEntry::parse(line), expected);
    }

    #[tokio::test]
    async fn skips_blank_and_comment_lines() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "chanA\n\n   \n# disabled\n  chanB  \n#chanC").expect("write");

        let registry = SourceRegistry::new(file.path(), Span::none());
        let entries = registry.list().await;

        assert_eq!(
            entries,
            vec![
                SourceEntry::Username("chanA".into()),
                SourceEntry::Username("chanB".into()),
            ]
        );
    }

    #[tokio::test]
    async fn rereads_file_on_every_call() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "chanA").expect("write");
        let registry = SourceRegistry::new(file.path(), Span::none());
        assert_eq!(registry.list().await.len(), 1);

        writeln!(file, "chanB").expect("write");
        assert_eq!(registry.list().await.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_yields_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let registry = SourceRegistry::new(dir.path().join("channels.txt"), Span::none());
        assert_eq!(registry.list().await.len(), 0);
    }
}
