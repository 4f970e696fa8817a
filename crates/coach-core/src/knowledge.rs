use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::types::ProjectPhase;

/// One curated coaching answer the model can match questions against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub theme: Option<String>,
    pub question: String,
    /// Phases the advice is meant for. Empty means every phase.
    #[serde(default)]
    pub phases: Vec<ProjectPhase>,
    pub recommendation: String,
    #[serde(default)]
    pub punchline: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
}

impl KnowledgeEntry {
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((i, _)) => &self.id[..i],
            None => &self.id,
        }
    }

    pub fn applies_to(&self, phase: ProjectPhase) -> bool {
        self.phases.is_empty() || self.phases.contains(&phase)
    }

    /// Full markdown rendering, used when an entry is quoted to the user.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("### {}\n\n**Question**: {}\n\n{}\n", self.title, self.question, self.recommendation);
        if let Some(punchline) = &self.punchline {
            out.push_str(&format!("\n**Punchline**: {punchline}\n"));
        }
        if let Some(challenge) = &self.challenge {
            out.push_str(&format!("\n**Challenge**: {challenge}\n"));
        }
        out
    }
}

/// Read a YAML list of entries.
pub fn load(path: &Path) -> Result<Vec<KnowledgeEntry>> {
    let data = std::fs::read_to_string(path)?;
    let entries: Vec<KnowledgeEntry> = serde_yaml::from_str(&data)?;
    Ok(entries)
}

/// Entry whose id equals `id` or starts with it (the prompt shows 8-char ids).
pub fn find<'a>(entries: &'a [KnowledgeEntry], id: &str) -> Option<&'a KnowledgeEntry> {
    if id.is_empty() {
        return None;
    }
    entries
        .iter()
        .find(|e| e.id == id)
        .or_else(|| entries.iter().find(|e| e.id.starts_with(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KB: &str = r#"
- id: 3f2a9c1e-funding-too-early
  title: Raising before traction
  theme: Funding
  question: Should I raise money now?
  phases: [growth]
  recommendation: Investors fund traction. Find ten paying users first.
  punchline: Customers before cheques.
- id: 77b0d4aa-first-interviews
  title: Running first interviews
  question: How do I validate my idea?
  recommendation: Talk to twenty people who have the problem.
"#;

    #[test]
    fn loads_yaml_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kb.yaml");
        std::fs::write(&path, KB).unwrap();

        let entries = load(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phases, vec![ProjectPhase::Growth]);
        assert!(entries[1].theme.is_none());
        assert!(entries[1].applies_to(ProjectPhase::Vision));
        assert!(!entries[0].applies_to(ProjectPhase::Vision));
    }

    #[test]
    fn find_by_prefix() {
        let entries: Vec<KnowledgeEntry> = serde_yaml::from_str(KB).unwrap();
        assert_eq!(entries[0].short_id(), "3f2a9c1e");
        assert_eq!(find(&entries, "77b0d4aa").map(|e| e.title.as_str()), Some("Running first interviews"));
        assert!(find(&entries, "zzz").is_none());
        assert!(find(&entries, "").is_none());
    }

    #[test]
    fn markdown_includes_punchline() {
        let entries: Vec<KnowledgeEntry> = serde_yaml::from_str(KB).unwrap();
        let md = entries[0].to_markdown();
        assert!(md.starts_with("### Raising before traction"));
        assert!(md.contains("**Punchline**: Customers before cheques."));
        assert!(!md.contains("**Challenge**"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load(Path::new("/nonexistent/kb.yaml")).unwrap_err();
        assert!(matches!(err, crate::error::CoachError::Io(_)));
    }
}
